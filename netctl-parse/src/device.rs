use std::{
    fmt,
    hash::{Hash, Hasher},
    net::IpAddr,
    str::FromStr,
};

use serde::Deserialize;

use crate::{json::NumOrStr, Result};

/// Mode of a tun/tap device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TuntapMode {
    Tun,
    #[default]
    Tap,
}

impl fmt::Display for TuntapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tun => f.write_str("tun"),
            Self::Tap => f.write_str("tap"),
        }
    }
}

/// Kind-specific parameters of a VXLAN device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VxlanInfo {
    /// VXLAN network identifier.
    pub id: u32,
    /// Multicast group. iproute2 reports a unicast peer as `remote` instead.
    pub group: Option<IpAddr>,
    /// Unicast peer.
    pub remote: Option<IpAddr>,
    /// Source address of outer packets.
    pub local: Option<IpAddr>,
    /// Underlying device.
    pub dev: Option<String>,
    /// TTL of outer packets.
    pub ttl: Option<u8>,
    /// TOS of outer packets.
    pub tos: Option<u8>,
    /// UDP destination port.
    pub dstport: Option<u16>,
    /// UDP source port range.
    pub port_range: Option<(u16, u16)>,
}

/// What a device is, with kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    Veth,
    Vlan { id: u16 },
    Vxlan(VxlanInfo),
    Dummy,
    Tuntap(TuntapMode),
    Macvtap { mode: Option<String> },
    /// A device without link info and an Ethernet link type.
    Physical,
    /// Anything else, labelled with the kernel's kind or link type.
    Unknown(String),
}

impl DeviceKind {
    /// The kernel's name for this kind.
    pub fn name(&self) -> &str {
        match self {
            Self::Veth => "veth",
            Self::Vlan { .. } => "vlan",
            Self::Vxlan(_) => "vxlan",
            Self::Dummy => "dummy",
            Self::Tuntap(_) => "tun",
            Self::Macvtap { .. } => "macvtap",
            Self::Physical => "physical",
            Self::Unknown(kind) => kind,
        }
    }
}

/// RFC 2863 operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperState {
    Up,
    Down,
    LowerLayerDown,
    Dormant,
    NotPresent,
    Testing,
    #[default]
    Unknown,
}

impl FromStr for OperState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "UP" => Self::Up,
            "DOWN" => Self::Down,
            "LOWERLAYERDOWN" => Self::LowerLayerDown,
            "DORMANT" => Self::Dormant,
            "NOTPRESENT" => Self::NotPresent,
            "TESTING" => Self::Testing,
            _ => Self::Unknown,
        })
    }
}

/// A network interface as reported by a full attribute dump.
///
/// Two records are equal when they name the same device in the same namespace. Kernel indices
/// change when a device moves between namespaces and take no part in identity.
#[derive(Debug, Clone)]
pub struct Device {
    /// Interface name.
    pub name: String,
    /// `None` for the root namespace.
    pub namespace: Option<String>,
    /// Kernel interface index.
    pub index: Option<u32>,
    /// Device kind with its parameters.
    pub kind: DeviceKind,
    /// Operational state.
    pub operstate: OperState,
    /// Link mode, e.g. `DEFAULT` or `DORMANT`.
    pub linkmode: Option<String>,
    /// MTU.
    pub mtu: Option<u32>,
    /// Link-layer address.
    pub mac: Option<String>,
    /// Link-layer broadcast address.
    pub broadcast: Option<String>,
    /// Promiscuous mode reference count.
    pub promiscuity: u32,
    /// Receives all multicast traffic.
    pub allmulticast: bool,
    /// Lower device of a vlan or macvtap.
    pub parent: Option<String>,
    /// Interface alias.
    pub alias: Option<String>,
}

impl Device {
    /// The identity of this device.
    pub fn key(&self) -> (&str, Option<&str>) {
        (&self.name, self.namespace.as_deref())
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Device name from an `ip link`/`ip addr` header token such as `eth0@NONE:`.
pub(crate) fn header_name(token: &str) -> &str {
    let name = token.trim_end_matches(':');
    name.split('@').next().unwrap_or(name)
}

/// Whether a line starts a device block, e.g. `2: eth0: <BROADCAST,...>`.
pub(crate) fn is_header(first_token: &str) -> bool {
    first_token
        .strip_suffix(':')
        .is_some_and(|idx| !idx.is_empty() && idx.bytes().all(|b| b.is_ascii_digit()))
}

/// Device names from a whitespace separated directory listing.
pub fn parse_device_names(output: &str) -> Vec<String> {
    output.split_whitespace().map(ToOwned::to_owned).collect()
}

#[derive(Debug, Deserialize)]
struct LinkRecord {
    ifindex: Option<u32>,
    ifname: String,
    #[serde(default)]
    flags: Vec<String>,
    mtu: Option<u32>,
    operstate: Option<String>,
    linkmode: Option<String>,
    link_type: Option<String>,
    address: Option<String>,
    broadcast: Option<String>,
    #[serde(default)]
    promiscuity: u32,
    link: Option<String>,
    ifalias: Option<String>,
    linkinfo: Option<LinkInfo>,
}

#[derive(Debug, Deserialize)]
struct LinkInfo {
    info_kind: Option<String>,
    info_data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct VlanData {
    id: u16,
}

#[derive(Debug, Deserialize)]
struct PortRange {
    low: u16,
    high: u16,
}

#[derive(Debug, Deserialize)]
struct VxlanData {
    id: u32,
    group: Option<IpAddr>,
    remote: Option<IpAddr>,
    local: Option<IpAddr>,
    link: Option<String>,
    ttl: Option<NumOrStr>,
    tos: Option<NumOrStr>,
    port: Option<u16>,
    port_range: Option<PortRange>,
}

#[derive(Debug, Deserialize)]
struct TunData {
    #[serde(rename = "type")]
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MacvtapData {
    mode: Option<String>,
}

fn data<T: serde::de::DeserializeOwned>(info: Option<serde_json::Value>) -> Result<Option<T>> {
    Ok(info.map(serde_json::from_value).transpose()?)
}

/// `ttl auto` and `tos inherit` are printed as words and decode to `None`.
fn small(value: Option<NumOrStr>) -> Option<u8> {
    value.and_then(|v| v.to_u32().ok()).and_then(|v| u8::try_from(v).ok())
}

fn kind_of(record: &mut LinkRecord) -> Result<DeviceKind> {
    let Some(info) = record.linkinfo.take() else {
        return Ok(match record.link_type.as_deref() {
            Some("ether") => DeviceKind::Physical,
            Some(other) => DeviceKind::Unknown(other.to_string()),
            None => DeviceKind::Unknown("unknown".to_string()),
        });
    };

    let kind = match info.info_kind.as_deref() {
        Some("veth") => DeviceKind::Veth,
        Some("dummy") => DeviceKind::Dummy,
        Some("vlan") => match data::<VlanData>(info.info_data)? {
            Some(vlan) => DeviceKind::Vlan { id: vlan.id },
            None => DeviceKind::Unknown("vlan".to_string()),
        },
        Some("vxlan") => match data::<VxlanData>(info.info_data)? {
            Some(vx) => DeviceKind::Vxlan(VxlanInfo {
                id: vx.id,
                group: vx.group,
                remote: vx.remote,
                local: vx.local,
                dev: vx.link,
                ttl: small(vx.ttl),
                tos: small(vx.tos),
                dstport: vx.port,
                port_range: vx.port_range.map(|r| (r.low, r.high)),
            }),
            None => DeviceKind::Unknown("vxlan".to_string()),
        },
        Some("tun") => {
            let mode = data::<TunData>(info.info_data)?.and_then(|d| d.mode);
            DeviceKind::Tuntap(match mode.as_deref() {
                Some("tun") => TuntapMode::Tun,
                _ => TuntapMode::Tap,
            })
        }
        Some("macvtap") => DeviceKind::Macvtap {
            mode: data::<MacvtapData>(info.info_data)?.and_then(|d| d.mode),
        },
        Some(other) => DeviceKind::Unknown(other.to_string()),
        None => DeviceKind::Unknown("unknown".to_string()),
    };

    Ok(kind)
}

/// Parses `ip -d -j link show` output.
pub fn parse_devices_json(output: &str, namespace: Option<&str>) -> Result<Vec<Device>> {
    let records: Vec<LinkRecord> = crate::json::records(output)?;

    records
        .into_iter()
        .map(|mut record| {
            let kind = kind_of(&mut record)?;
            let operstate =
                record.operstate.as_deref().and_then(|s| s.parse().ok()).unwrap_or_default();

            Ok(Device {
                name: record.ifname,
                namespace: namespace.map(ToOwned::to_owned),
                index: record.ifindex,
                kind,
                operstate,
                linkmode: record.linkmode,
                mtu: record.mtu,
                mac: record.address,
                broadcast: record.broadcast,
                promiscuity: record.promiscuity,
                allmulticast: record.flags.iter().any(|f| f == "ALLMULTI"),
                parent: record.link,
                alias: record.ifalias,
            })
        })
        .collect()
}
