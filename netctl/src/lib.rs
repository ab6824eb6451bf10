#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Namespace-aware network configuration.
//!
//! [`NetCtl`] is the entry point. It hands out controllers for namespaces, links, addresses,
//! routes, policy rules and neighbors. Every change to kernel state is expressed as a
//! [`netctl_exec::Command`] and runs through the configured [`netctl_exec::Executor`]. Nothing in
//! this crate needs elevated privileges itself.
//!
//! ```no_run
//! use netctl::{Config, NetCtl, Scope};
//!
//! # async fn example() -> netctl::Result<()> {
//! let ctl = NetCtl::with_runner(Config::default());
//! ctl.namespaces().create("ns1").await?;
//!
//! let (veth, _peer) = ctl.links(Some("ns1")).add_veth("veth0", "veth1", None).await?;
//! veth.addr().add("192.168.45.100/24", Scope::Global, true).await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::{Error, Result};

mod config;
pub use config::Config;

mod backoff;

mod controller;
pub use controller::NetCtl;

mod namespace;
pub use namespace::NamespaceManager;

mod link;
pub use link::{LinkController, LinkSpec, VxlanSpec, FALLBACK_TUNNELS};

mod device;
pub use device::IpDevice;

mod addr;
pub use addr::{AddrFilter, AddressController};

mod route;
pub use route::RouteController;

mod rule;
pub use rule::RuleController;

mod neigh;
pub use neigh::NeighborController;

mod announce;
pub use announce::AnnouncementHandle;

/// Per-namespace sysctl parameters.
pub mod sysctl;

pub use netctl_parse::{
    Address, Device, DeviceKind, Gateway, IpVersion, NeighState, NeighborEntry, Route, Rule,
    RuleSpec, Scope, Table, TuntapMode,
};
