use std::{fmt, net::IpAddr, str::FromStr};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use crate::{Error, Result};

/// IP protocol version of an address, route, rule or neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IpVersion {
    #[default]
    V4,
    V6,
}

impl IpVersion {
    /// Family of `addr`.
    pub const fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    /// Version of an address or CIDR string.
    pub fn of_cidr(cidr: &str) -> Result<Self> {
        parse_cidr(cidr).map(|net| Self::of(&net.addr()))
    }

    /// The iproute2 family switch, `-4` or `-6`.
    pub const fn flag(self) -> &'static str {
        match self {
            Self::V4 => "-4",
            Self::V6 => "-6",
        }
    }

    /// The zero network standing for "any" in this family.
    pub fn any(self) -> IpNet {
        match self {
            Self::V4 => IpNet::V4(Ipv4Net::default()),
            Self::V6 => IpNet::V6(Ipv6Net::default()),
        }
    }

    /// Prefix length of a single host.
    pub const fn host_prefix_len(self) -> u8 {
        match self {
            Self::V4 => 32,
            Self::V6 => 128,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("4"),
            Self::V6 => f.write_str("6"),
        }
    }
}

/// Parses `addr/len` or a bare address, which is taken as a host prefix.
pub fn parse_cidr(s: &str) -> Result<IpNet> {
    if s.contains('/') {
        return IpNet::from_str(s).map_err(|_| Error::Cidr(s.to_string()));
    }

    let addr = parse_addr(s)?;
    IpNet::new(addr, IpVersion::of(&addr).host_prefix_len())
        .map_err(|_| Error::Cidr(s.to_string()))
}

pub(crate) fn parse_addr(s: &str) -> Result<IpAddr> {
    IpAddr::from_str(s).map_err(|_| Error::Address(s.to_string()))
}

/// Broadcast address of an IPv4 network.
///
/// IPv6 has no broadcast. Neither do /31 point-to-point links or /32 host prefixes.
pub fn broadcast(net: &IpNet) -> Option<IpAddr> {
    match net {
        IpNet::V4(v4) if v4.prefix_len() < 31 => Some(IpAddr::V4(v4.broadcast())),
        _ => None,
    }
}
