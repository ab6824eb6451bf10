use std::net::IpAddr;

use ipnet::IpNet;
use serde::Deserialize;

use crate::{
    error::parse_u32,
    family::{parse_addr, parse_cidr},
    json::NumOrStr,
    Error, IpVersion, Result, Scope, Table,
};

/// Route types iproute2 prints in front of the destination.
const ROUTE_TYPES: &[&str] = &[
    "unicast",
    "local",
    "broadcast",
    "multicast",
    "throw",
    "unreachable",
    "prohibit",
    "blackhole",
    "nat",
    "anycast",
];

/// Keywords that stand alone, without a value.
const ROUTE_FLAGS: &[&str] = &["onlink", "linkdown", "dead", "pervasive", "offload", "notify"];

/// A routing table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Destination. The default route is the zero network of its family.
    pub cidr: IpNet,
    /// Next hop.
    pub via: Option<IpAddr>,
    /// Outgoing device.
    pub dev: Option<String>,
    /// Route scope, when printed.
    pub scope: Option<Scope>,
    /// Table the route was listed from.
    pub table: Table,
    /// Route metric.
    pub metric: Option<u32>,
    /// Origin of the route, e.g. `kernel` or `static`.
    pub proto: Option<String>,
    /// Preferred source address.
    pub src: Option<IpAddr>,
}

impl Route {
    /// A route to `cidr` with nothing else set.
    pub fn new(cidr: IpNet, table: Table) -> Self {
        Self {
            cidr,
            via: None,
            dev: None,
            scope: None,
            table,
            metric: None,
            proto: None,
            src: None,
        }
    }

    /// Whether this is a default route.
    pub fn is_default(&self) -> bool {
        self.cidr.prefix_len() == 0
    }

    /// A directly connected route that the kernel did not generate for an address.
    pub fn is_onlink(&self) -> bool {
        self.via.is_none()
            && self.src.is_none()
            && self.proto.as_deref() != Some("kernel")
            && self.scope.map_or(true, |scope| scope == Scope::Link)
    }
}

/// Next hop and metric of a default route. Either may be missing, e.g. `default dev X metric 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gateway {
    /// Next hop.
    pub gateway: Option<IpAddr>,
    /// Route metric.
    pub metric: Option<u32>,
}

fn destination(version: IpVersion, token: &str) -> Result<IpNet> {
    match token {
        "default" | "any" | "all" => Ok(version.any()),
        cidr => parse_cidr(cidr),
    }
}

/// Parses a single `ip route list` line. Multipath `nexthop` continuation lines yield `None`.
pub fn parse_route_line(
    version: IpVersion,
    table: &Table,
    device: Option<&str>,
    line: &str,
) -> Result<Option<Route>> {
    let mut tokens = line.split_whitespace().peekable();

    if tokens.next_if(|t| ROUTE_TYPES.contains(t)).is_some() && tokens.peek().is_none() {
        return Err(Error::Line { what: "route", line: line.to_string() });
    }

    let Some(dst) = tokens.next() else { return Ok(None) };
    if dst == "nexthop" {
        return Ok(None);
    }

    let mut route = Route::new(destination(version, dst)?, table.clone());
    while let Some(key) = tokens.next() {
        if ROUTE_FLAGS.contains(&key) {
            continue;
        }

        let Some(value) = tokens.next() else {
            tracing::trace!(key, line, "ignoring trailing route keyword");
            break;
        };

        match key {
            "via" => route.via = Some(parse_addr(value)?),
            "dev" => route.dev = Some(value.to_string()),
            "scope" => route.scope = value.parse().ok(),
            "metric" => route.metric = Some(parse_u32(value)?),
            "proto" => route.proto = Some(value.to_string()),
            "src" => route.src = Some(parse_addr(value)?),
            "table" => route.table = value.into(),
            _ => {}
        }
    }

    if route.dev.is_none() {
        route.dev = device.map(str::to_string);
    }

    Ok(Some(route))
}

/// Parses `ip route list` output. Every route is tagged with `table` unless the line names its
/// own, and inherits `device` when the line has no `dev`.
pub fn parse_routes(
    version: IpVersion,
    table: &Table,
    device: Option<&str>,
    output: &str,
) -> Result<Vec<Route>> {
    let mut routes = Vec::new();
    for line in output.lines() {
        if let Some(route) = parse_route_line(version, table, device, line)? {
            routes.push(route);
        }
    }
    Ok(routes)
}

/// Extracts the first default route from `ip route list` output.
pub fn parse_gateway(version: IpVersion, output: &str) -> Result<Option<Gateway>> {
    let Some(line) = output.lines().find(|l| l.trim_start().starts_with("default")) else {
        return Ok(None);
    };

    Ok(parse_route_line(version, &Table::Main, None, line)?
        .map(|route| Gateway { gateway: route.via, metric: route.metric }))
}

#[derive(Debug, Deserialize)]
struct RouteRecord {
    dst: String,
    gateway: Option<IpAddr>,
    dev: Option<String>,
    scope: Option<String>,
    protocol: Option<NumOrStr>,
    prefsrc: Option<IpAddr>,
    metric: Option<u32>,
    table: Option<NumOrStr>,
}

/// Parses `ip -j route list` output.
pub fn parse_routes_json(version: IpVersion, table: &Table, output: &str) -> Result<Vec<Route>> {
    let records: Vec<RouteRecord> = crate::json::records(output)?;

    records
        .into_iter()
        .map(|r| {
            Ok(Route {
                cidr: destination(version, &r.dst)?,
                via: r.gateway,
                dev: r.dev,
                scope: r.scope.and_then(|s| s.parse().ok()),
                table: r.table.map_or_else(|| table.clone(), |t| t.into_string().as_str().into()),
                metric: r.metric,
                proto: r.protocol.map(NumOrStr::into_string),
                src: r.prefsrc,
            })
        })
        .collect()
}
