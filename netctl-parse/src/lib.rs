#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Typed network-state records and parsers for `iproute2` output.
//!
//! Every parser accepts the raw stdout of one command. Text parsers accept the line-oriented
//! output of `ip`, JSON parsers the output of `ip -j`. Both produce the same records.

mod error;
pub use error::{Error, Result};

mod json;

mod family;
pub use family::{broadcast, parse_cidr, IpVersion};

mod scope;
pub use scope::Scope;

mod table;
pub use table::Table;

/// Device addresses.
pub mod address;
pub use address::{parse_addresses, parse_addresses_json, Address, Readiness};

/// Devices and their kinds.
pub mod device;
pub use device::{
    parse_device_names, parse_devices_json, Device, DeviceKind, OperState, TuntapMode, VxlanInfo,
};

/// Routes and default gateways.
pub mod route;
pub use route::{parse_gateway, parse_routes, parse_routes_json, Gateway, Route};

/// Policy routing rules.
pub mod rule;
pub use rule::{
    parse_rule_line, parse_rules, parse_rules_json, FwMark, IntoFwMark, Rule, RuleAction,
    RuleFields, RuleSpec,
};

mod neigh;
pub use neigh::{parse_neighbors_json, NeighState, NeighborEntry};

mod namespace;
pub use namespace::parse_namespaces;

pub use ipnet::IpNet;
