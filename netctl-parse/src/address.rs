use std::net::IpAddr;

use ipnet::IpNet;
use serde::Deserialize;

use crate::{
    device::{header_name, is_header},
    family::{parse_addr, parse_cidr},
    json::NumOrStr,
    Error, IpVersion, Result, Scope,
};

/// `IFA_F_*` bits from `linux/if_addr.h` that carry readiness.
pub mod flags {
    /// Duplicate address detection failed.
    pub const IFA_F_DADFAILED: u32 = 0x08;
    /// Duplicate address detection has not finished.
    pub const IFA_F_TENTATIVE: u32 = 0x40;
    /// Configured statically rather than learned.
    pub const IFA_F_PERMANENT: u32 = 0x80;
}

/// Duplicate address detection state of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Readiness {
    /// Duplicate address detection has not finished.
    pub tentative: bool,
    /// Duplicate address detection found a duplicate.
    pub dadfailed: bool,
    /// Learned, e.g. through SLAAC, rather than configured.
    pub dynamic: bool,
}

impl Readiness {
    /// Decodes raw `IFA_F_*` bits. Anything that is not permanent is dynamic.
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            tentative: bits & flags::IFA_F_TENTATIVE != 0,
            dadfailed: bits & flags::IFA_F_DADFAILED != 0,
            dynamic: bits & flags::IFA_F_PERMANENT == 0,
        }
    }

    /// Decodes the keywords iproute2 prints after the scope.
    pub fn from_keywords<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        words.into_iter().fold(Self::default(), |mut acc, word| {
            match word {
                "tentative" => acc.tentative = true,
                "dadfailed" => acc.dadfailed = true,
                "dynamic" => acc.dynamic = true,
                _ => {}
            }
            acc
        })
    }
}

/// An address assigned to a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Owning device.
    pub name: String,
    /// Address and prefix length, host bits included.
    pub cidr: IpNet,
    /// Reachability of the address.
    pub scope: Scope,
    /// IPv4 only.
    pub broadcast: Option<IpAddr>,
    /// Duplicate address detection has not finished.
    pub tentative: bool,
    /// Duplicate address detection found a duplicate.
    pub dadfailed: bool,
    /// Learned rather than configured.
    pub dynamic: bool,
}

impl Address {
    /// An address without broadcast.
    pub fn new(name: impl Into<String>, cidr: IpNet, scope: Scope, readiness: Readiness) -> Self {
        Self {
            name: name.into(),
            cidr,
            scope,
            broadcast: None,
            tentative: readiness.tentative,
            dadfailed: readiness.dadfailed,
            dynamic: readiness.dynamic,
        }
    }

    /// The address without prefix length.
    pub fn ip(&self) -> IpAddr {
        self.cidr.addr()
    }

    /// Address family.
    pub fn version(&self) -> IpVersion {
        IpVersion::of(&self.ip())
    }

    /// Usable for provisioning: duplicate address detection is done and did not fail.
    pub const fn is_ready(&self) -> bool {
        !self.tentative && !self.dadfailed
    }
}

/// Parses one `inet`/`inet6` record, starting at the family keyword.
fn parse_inet(name: &str, tokens: &[&str], line: &str) -> Result<Address> {
    let malformed = || Error::Line { what: "address", line: line.to_string() };

    let cidr = parse_cidr(tokens.get(1).ok_or_else(malformed)?)?;
    let mut rest = &tokens[2..];

    let mut broadcast = None;
    if let ["brd", brd, tail @ ..] = rest {
        if cidr.addr().is_ipv4() {
            broadcast = Some(parse_addr(brd)?);
        }
        rest = tail;
    }

    let scope = rest
        .iter()
        .position(|t| *t == "scope")
        .and_then(|pos| rest.get(pos + 1))
        .map_or(Scope::Global, |s| s.parse().unwrap_or_default());

    let mut addr = Address::new(name, cidr, scope, Readiness::from_keywords(rest.iter().copied()));
    addr.broadcast = broadcast;
    Ok(addr)
}

/// Parses `ip addr show` output, in block or one-line (`-o`) form.
pub fn parse_addresses(output: &str) -> Result<Vec<Address>> {
    let mut device: Option<&str> = None;
    let mut addresses = Vec::new();

    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = tokens.first() else { continue };

        if is_header(first) {
            device = tokens.get(1).copied().map(header_name);
        }

        let Some(pos) = tokens.iter().position(|t| *t == "inet" || *t == "inet6") else {
            continue;
        };

        let name = device.ok_or_else(|| Error::Line { what: "address", line: line.to_string() })?;
        addresses.push(parse_inet(name, &tokens[pos..], line)?);
    }

    Ok(addresses)
}

#[derive(Debug, Deserialize)]
struct AddrRecord {
    // Links that match no address show up as empty objects.
    ifname: Option<String>,
    #[serde(default)]
    addr_info: Vec<AddrInfo>,
}

#[derive(Debug, Deserialize)]
struct AddrInfo {
    local: IpAddr,
    prefixlen: u8,
    broadcast: Option<IpAddr>,
    scope: Option<NumOrStr>,
    #[serde(default)]
    tentative: bool,
    #[serde(default)]
    dadfailed: bool,
    #[serde(default)]
    dynamic: bool,
    /// Raw `IFA_F_*` bits, when the producer exposes them.
    ifa_flags: Option<u32>,
}

/// Parses `ip -j addr show` output.
pub fn parse_addresses_json(output: &str) -> Result<Vec<Address>> {
    let records: Vec<AddrRecord> = crate::json::records(output)?;
    let mut addresses = Vec::new();

    for record in records {
        let Some(name) = record.ifname else { continue };

        for info in record.addr_info {
            let cidr = IpNet::new(info.local, info.prefixlen)
                .map_err(|_| Error::Cidr(format!("{}/{}", info.local, info.prefixlen)))?;

            let scope = match info.scope {
                Some(NumOrStr::Str(s)) => s.parse().unwrap_or_default(),
                Some(NumOrStr::Num(n)) => Scope::from_code(u8::try_from(n).unwrap_or(0)),
                None => Scope::Global,
            };

            let keywords = Readiness {
                tentative: info.tentative,
                dadfailed: info.dadfailed,
                dynamic: info.dynamic,
            };
            let readiness = info.ifa_flags.map_or(keywords, Readiness::from_bits);

            let mut addr = Address::new(name.as_str(), cidr, scope, readiness);
            addr.broadcast = info.broadcast.filter(IpAddr::is_ipv4);
            addresses.push(addr);
        }
    }

    Ok(addresses)
}
