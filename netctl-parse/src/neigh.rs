use std::{convert::Infallible, fmt, net::IpAddr, str::FromStr};

use serde::Deserialize;

use crate::{IpVersion, Result};

/// Neighbor Unreachability Detection state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NeighState {
    #[default]
    Permanent,
    Reachable,
    Stale,
    Delay,
    Probe,
    Failed,
    Incomplete,
    Noarp,
    None,
    Other(String),
}

impl NeighState {
    /// The `nud` keyword for this state.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Permanent => "permanent",
            Self::Reachable => "reachable",
            Self::Stale => "stale",
            Self::Delay => "delay",
            Self::Probe => "probe",
            Self::Failed => "failed",
            Self::Incomplete => "incomplete",
            Self::Noarp => "noarp",
            Self::None => "none",
            Self::Other(s) => s,
        }
    }
}

impl FromStr for NeighState {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "permanent" => Self::Permanent,
            "reachable" => Self::Reachable,
            "stale" => Self::Stale,
            "delay" => Self::Delay,
            "probe" => Self::Probe,
            "failed" => Self::Failed,
            "incomplete" => Self::Incomplete,
            "noarp" => Self::Noarp,
            "none" => Self::None,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for NeighState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ARP or NDP cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    /// Neighbor address.
    pub dst: IpAddr,
    /// Missing while resolution is incomplete or failed.
    pub lladdr: Option<String>,
    /// Device the entry belongs to.
    pub dev: Option<String>,
    /// Reachability state.
    pub state: NeighState,
}

impl NeighborEntry {
    /// Address family of the entry.
    pub fn version(&self) -> IpVersion {
        IpVersion::of(&self.dst)
    }
}

#[derive(Debug, Deserialize)]
struct NeighRecord {
    dst: IpAddr,
    lladdr: Option<String>,
    dev: Option<String>,
    #[serde(default)]
    state: Vec<String>,
}

/// Parses `ip -j neigh show` output. When the listing was filtered by device, iproute2 leaves
/// `dev` out of the records and `device` is used instead.
pub fn parse_neighbors_json(output: &str, device: Option<&str>) -> Result<Vec<NeighborEntry>> {
    let records: Vec<NeighRecord> = crate::json::records(output)?;

    Ok(records
        .into_iter()
        .map(|r| NeighborEntry {
            dst: r.dst,
            lladdr: r.lladdr,
            dev: r.dev.or_else(|| device.map(str::to_string)),
            // The first state wins when the kernel reports several, e.g. ["STALE", "PROBE"].
            state: r.state.first().map_or(NeighState::None, |s| {
                s.parse().unwrap_or(NeighState::None)
            }),
        })
        .collect())
}
