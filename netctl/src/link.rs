use std::{io, net::IpAddr};

use netctl_exec::Command;
use netctl_parse::{
    parse_addresses_json, parse_device_names, parse_devices_json, Address, Device, TuntapMode,
};

use crate::{controller::Context, Error, IpDevice, NamespaceManager, Result};

const LOOPBACK: &str = "lo";

/// Devices the kernel creates in every namespace once a tunnel module is loaded.
pub const FALLBACK_TUNNELS: &[&str] =
    &["gre0", "gretap0", "erspan0", "ip_vti0", "ip6_vti0", "ip6tnl0", "ip6gre0", "sit0", "tunl0"];

/// Parameters of a VXLAN device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VxlanSpec {
    /// VXLAN network identifier.
    pub id: u32,
    /// Multicast group.
    pub group: Option<IpAddr>,
    /// Underlay device.
    pub dev: Option<String>,
    /// TTL of outer packets.
    pub ttl: Option<u8>,
    /// TOS of outer packets.
    pub tos: Option<u8>,
    /// Source address of outer packets.
    pub local: Option<IpAddr>,
    /// Unicast peer.
    pub remote: Option<IpAddr>,
    /// Answer ARP requests from the forwarding database.
    pub proxy: bool,
    /// UDP source port range, `[low, high]`.
    pub srcport: Option<Vec<u16>>,
    /// UDP destination port.
    pub dstport: Option<u16>,
}

impl VxlanSpec {
    /// A spec with only the network identifier set.
    pub fn new(id: u32) -> Self {
        Self { id, ..Default::default() }
    }

    /// Rejects anything but two ascending ports.
    fn validate(&self) -> Result<()> {
        match self.srcport.as_deref() {
            None => Ok(()),
            Some([low, high]) if low <= high => Ok(()),
            Some(ports) => Err(Error::InvalidPortRange(ports.to_vec())),
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec!["type".to_string(), "vxlan".to_string(), "id".to_string()];
        args.push(self.id.to_string());

        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                args.extend([key.to_string(), value]);
            }
        };
        push("group", self.group.map(|g| g.to_string()));
        push("dev", self.dev.clone());
        push("ttl", self.ttl.map(|t| t.to_string()));
        push("tos", self.tos.map(|t| t.to_string()));
        push("local", self.local.map(|l| l.to_string()));
        push("remote", self.remote.map(|r| r.to_string()));

        if self.proxy {
            args.push("proxy".to_string());
        }
        if let Some([low, high]) = self.srcport.as_deref() {
            args.extend(["srcport".to_string(), low.to_string(), high.to_string()]);
        }
        if let Some(port) = self.dstport {
            args.extend(["dstport".to_string(), port.to_string()]);
        }

        args
    }
}

/// What kind of device to create, with its kind-specific parameters.
///
/// Physical devices are never created and unknown kinds cannot be, so neither has a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSpec {
    /// A veth pair. The peer lands in `peer_namespace`, or next to the device when `None`.
    Veth { peer: String, peer_namespace: Option<String> },
    Vlan { parent: String, id: u16 },
    Vxlan(VxlanSpec),
    Dummy,
    Tuntap(TuntapMode),
    Macvtap { parent: String, mode: String },
}

/// Creates, enumerates and inspects devices of one namespace.
#[derive(Debug, Clone)]
pub struct LinkController {
    ctx: Context,
    namespace: Option<String>,
}

impl LinkController {
    pub(crate) fn new(ctx: Context, namespace: Option<&str>) -> Self {
        Self { ctx, namespace: namespace.map(str::to_string) }
    }

    /// The namespace this controller manages, `None` for the root.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// A handle on device `name` in this namespace.
    pub fn device(&self, name: &str) -> IpDevice {
        IpDevice::new(self.ctx.clone(), name, self.namespace.as_deref())
    }

    fn classify(&self, err: netctl_exec::Error, device: Option<&str>) -> Error {
        Error::classify(err, device, self.namespace.as_deref())
    }

    /// Creates device `name`.
    ///
    /// Parameters are validated before anything is executed. Creating a device that already
    /// exists fails.
    pub async fn create(&self, name: &str, spec: LinkSpec) -> Result<IpDevice> {
        tracing::debug!(namespace = ?self.namespace, device = name, ?spec, "creating link");

        let (object, args, parent) = match spec {
            LinkSpec::Veth { peer, peer_namespace } => {
                if let Some(ref ns) = peer_namespace {
                    NamespaceManager::new(self.ctx.clone()).ensure(ns).await?;
                }

                let mut args = vec!["add", name, "type", "veth", "peer", "name", peer.as_str()]
                    .into_iter()
                    .map(String::from)
                    .collect::<Vec<_>>();
                if let Some(ns) = peer_namespace {
                    args.extend(["netns".to_string(), ns]);
                }
                ("link", args, None)
            }
            LinkSpec::Vlan { parent, id } => {
                let args: Vec<String> = ["add", "link", parent.as_str(), "name", name, "type"]
                    .into_iter()
                    .map(String::from)
                    .chain(["vlan".to_string(), "id".to_string(), id.to_string()])
                    .collect();
                ("link", args, Some(parent))
            }
            LinkSpec::Vxlan(vxlan) => {
                vxlan.validate()?;
                let args: Vec<String> =
                    ["add".to_string(), name.to_string()].into_iter().chain(vxlan.args()).collect();
                ("link", args, vxlan.dev)
            }
            LinkSpec::Dummy => {
                let args = ["add", name, "type", "dummy"].map(String::from).to_vec();
                ("link", args, None)
            }
            LinkSpec::Tuntap(mode) => {
                let mode = match mode {
                    TuntapMode::Tun => "tun",
                    TuntapMode::Tap => "tap",
                };
                let args = ["add", name, "mode", mode].map(String::from).to_vec();
                ("tuntap", args, None)
            }
            LinkSpec::Macvtap { parent, mode } => {
                let args: Vec<String> = ["add", "link", parent.as_str(), "name", name, "type"]
                    .into_iter()
                    .map(String::from)
                    .chain(["macvtap".to_string(), "mode".to_string(), mode])
                    .collect();
                ("link", args, Some(parent))
            }
        };

        let command = Command::ip([], object)
            .args(args)
            .netns(self.namespace.as_deref())
            .privileged();

        // A missing parent is the only device that can be missing here.
        self.ctx
            .execute(command)
            .await
            .map_err(|err| self.classify(err, parent.as_deref()))?;

        Ok(self.device(name))
    }

    /// Creates a veth pair and returns both ends.
    pub async fn add_veth(
        &self,
        name: &str,
        peer: &str,
        peer_namespace: Option<&str>,
    ) -> Result<(IpDevice, IpDevice)> {
        let spec = LinkSpec::Veth {
            peer: peer.to_string(),
            peer_namespace: peer_namespace.map(str::to_string),
        };
        let device = self.create(name, spec).await?;

        let peer_namespace = peer_namespace.or(self.namespace.as_deref());
        Ok((device, IpDevice::new(self.ctx.clone(), peer, peer_namespace)))
    }

    /// Deletes device `name`. A missing device is reported as [`Error::DeviceNotFound`].
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.device(name).delete().await
    }

    /// Names the devices of the namespace by listing the sysfs device directory.
    ///
    /// A namespace that does not exist has no devices, unless it exists after all, in which
    /// case the listing failed for another reason and the error is returned.
    pub async fn list_devices(
        &self,
        exclude_loopback: bool,
        exclude_fallback_tunnels: bool,
    ) -> Result<Vec<IpDevice>> {
        let names = match self.namespace {
            None => self.read_sysfs().await?,
            Some(ref ns) => match self.find_in_namespace().await {
                Ok(names) => names,
                Err(err) => {
                    if NamespaceManager::new(self.ctx.clone()).exists(ns).await? {
                        return Err(err);
                    }
                    tracing::debug!(namespace = %ns, "namespace does not exist, no devices");
                    Vec::new()
                }
            },
        };

        Ok(names
            .into_iter()
            .filter(|name| !(exclude_loopback && name == LOOPBACK))
            .filter(|name| {
                !(exclude_fallback_tunnels && FALLBACK_TUNNELS.contains(&name.as_str()))
            })
            .map(|name| self.device(&name))
            .collect())
    }

    async fn read_sysfs(&self) -> io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.ctx.config().sysfs_net_dir).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_symlink() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        names.sort();
        Ok(names)
    }

    async fn find_in_namespace(&self) -> Result<Vec<String>> {
        let dir = self.ctx.config().sysfs_net_dir.to_string_lossy().into_owned();
        let command = Command::new("find")
            .args([dir.as_str(), "-maxdepth", "1", "-type", "l", "-printf", "%f "])
            .netns(self.namespace.as_deref());

        let stdout = self.ctx.stdout(command).await.map_err(|err| self.classify(err, None))?;
        Ok(parse_device_names(&stdout))
    }

    /// Full attributes of every device in the namespace.
    pub async fn get_devices_info(&self) -> Result<Vec<Device>> {
        let command = Command::ip(["-d", "-j"], "link")
            .arg("show")
            .netns(self.namespace.as_deref());

        let stdout = self.ctx.stdout(command).await.map_err(|err| self.classify(err, None))?;
        Ok(parse_devices_json(&stdout, self.namespace.as_deref())?)
    }

    /// Addresses of every device in the namespace, optionally only those matching `to`.
    pub async fn get_devices_with_ip(&self, to: Option<&str>) -> Result<Vec<Address>> {
        let mut command = Command::ip(["-j"], "addr").arg("show");
        if let Some(to) = to {
            command = command.args(["to", to]);
        }

        let command = command.netns(self.namespace.as_deref());
        let stdout = self.ctx.stdout(command).await.map_err(|err| self.classify(err, None))?;
        Ok(parse_addresses_json(&stdout)?)
    }

    /// See [`IpDevice::ensure_ready`].
    pub async fn ensure_ready(&self, name: &str) -> bool {
        self.device(name).ensure_ready().await
    }

    /// See [`IpDevice::disable_ipv6`].
    pub async fn disable_ipv6(&self, name: &str) -> Result<()> {
        self.device(name).disable_ipv6().await
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use netctl_exec::{FakeExecutor, Reply};

    use crate::{Config, NetCtl};

    use super::*;

    #[tokio::test]
    async fn creates_each_kind() {
        let _ = tracing_subscriber::fmt::try_init();
        let fake = FakeExecutor::new();
        let links = NetCtl::new(fake.clone(), Config::default()).links(Some("ns1"));

        links.create("d0", LinkSpec::Dummy).await.unwrap();
        links.create("v10", LinkSpec::Vlan { parent: "eth0".into(), id: 10 }).await.unwrap();
        links.create("tap0", LinkSpec::Tuntap(TuntapMode::Tap)).await.unwrap();
        links
            .create("mvt0", LinkSpec::Macvtap { parent: "eth0".into(), mode: "bridge".into() })
            .await
            .unwrap();

        assert_eq!(
            fake.commands(),
            [
                "ip netns exec ns1 ip link add d0 type dummy",
                "ip netns exec ns1 ip link add link eth0 name v10 type vlan id 10",
                "ip netns exec ns1 ip tuntap add tap0 mode tap",
                "ip netns exec ns1 ip link add link eth0 name mvt0 type macvtap mode bridge",
            ]
        );
    }

    #[tokio::test]
    async fn vxlan_arguments() {
        let fake = FakeExecutor::new();
        let links = NetCtl::new(fake.clone(), Config::default()).links(None);

        let spec = VxlanSpec {
            group: Some("239.1.1.1".parse().unwrap()),
            dev: Some("eth0".into()),
            ttl: Some(64),
            proxy: true,
            srcport: Some(vec![40000, 50000]),
            dstport: Some(4789),
            ..VxlanSpec::new(100)
        };
        let device = links.create("vx0", LinkSpec::Vxlan(spec)).await.unwrap();

        assert_eq!(device.name(), "vx0");
        assert_eq!(
            fake.commands(),
            ["ip link add vx0 type vxlan id 100 group 239.1.1.1 dev eth0 ttl 64 proxy \
              srcport 40000 50000 dstport 4789"]
        );
    }

    #[tokio::test]
    async fn rejects_bad_port_ranges_before_executing() {
        let fake = FakeExecutor::new();
        let links = NetCtl::new(fake.clone(), Config::default()).links(None);

        for ports in [vec![1, 2, 3], vec![50000, 40000], vec![1]] {
            let spec = VxlanSpec { srcport: Some(ports.clone()), ..VxlanSpec::new(1) };
            let err = links.create("vx0", LinkSpec::Vxlan(spec)).await.unwrap_err();
            assert!(matches!(err, Error::InvalidPortRange(ref p) if *p == ports), "{err}");
        }

        assert!(fake.commands().is_empty());
    }

    #[tokio::test]
    async fn veth_peer_namespace_is_ensured() {
        let fake = FakeExecutor::new();
        fake.on("netns list", Reply::stdout("other (id: 3)\n"));
        let links = NetCtl::new(fake.clone(), Config::default()).links(None);

        let (a, b) = links.add_veth("veth0", "veth1", Some("ns2")).await.unwrap();
        assert_eq!(a.namespace(), None);
        assert_eq!(b.namespace(), Some("ns2"));
        assert_eq!(fake.count("ip netns add ns2"), 1);
        assert_eq!(fake.count("ip link add veth0 type veth peer name veth1 netns ns2"), 1);
    }

    #[tokio::test]
    async fn missing_parent_is_device_not_found() {
        let fake = FakeExecutor::new();
        fake.on("type vlan", Reply::fail(1, "Cannot find device \"eth7\""));
        let links = NetCtl::new(fake, Config::default()).links(None);

        let spec = LinkSpec::Vlan { parent: "eth7".into(), id: 7 };
        let err = links.create("v7", spec).await.unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound { ref device, .. } if device == "eth7"));
    }

    #[tokio::test]
    async fn lists_root_devices_from_sysfs() {
        let sysfs = tempfile::tempdir().unwrap();
        let target = sysfs.path().join("target");
        std::fs::create_dir(&target).unwrap();
        for name in ["lo", "eth0", "gre0", "veth0"] {
            symlink(&target, sysfs.path().join(name)).unwrap();
        }
        std::fs::write(sysfs.path().join("bonding_masters"), "").unwrap();

        let config = Config::default().with_sysfs_net_dir(sysfs.path());
        let links = NetCtl::new(FakeExecutor::new(), config).links(None);

        let names = |devices: Vec<IpDevice>| -> Vec<String> {
            devices.iter().map(ToString::to_string).collect()
        };

        let all = links.list_devices(false, false).await.unwrap();
        assert_eq!(names(all), ["eth0", "gre0", "lo", "veth0"]);

        let filtered = links.list_devices(true, true).await.unwrap();
        assert_eq!(names(filtered), ["eth0", "veth0"]);
    }

    #[tokio::test]
    async fn lists_namespace_devices() {
        let fake = FakeExecutor::new();
        fake.on("find /sys/class/net", Reply::stdout("lo veth0 tunl0 "));
        let links = NetCtl::new(fake.clone(), Config::default()).links(Some("ns1"));

        let devices = links.list_devices(true, true).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name(), "veth0");
        assert_eq!(devices[0].namespace(), Some("ns1"));
    }

    #[tokio::test]
    async fn finds_devices_holding_an_address() {
        let fake = FakeExecutor::new();
        fake.on(
            "ip -j addr show",
            Reply::stdout(
                r#"[{"ifindex":2,"ifname":"qr-1","addr_info":[
                      {"family":"inet","local":"10.0.0.1","prefixlen":24,"scope":"global"}]},
                    {"ifindex":3,"ifname":"qg-1","addr_info":[
                      {"family":"inet","local":"10.0.0.1","prefixlen":24,"scope":"global"}]}]"#,
            ),
        );
        let links = NetCtl::new(fake.clone(), Config::default()).links(Some("ns1"));

        let found = links.get_devices_with_ip(Some("10.0.0.1/24")).await.unwrap();
        let names: Vec<_> = found.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["qr-1", "qg-1"]);
        assert!(found.iter().all(|a| a.cidr.to_string() == "10.0.0.1/24"));
        assert_eq!(fake.commands(), ["ip netns exec ns1 ip -j addr show to 10.0.0.1/24"]);

        links.get_devices_with_ip(None).await.unwrap();
        assert_eq!(fake.commands()[1], "ip netns exec ns1 ip -j addr show");
    }

    #[tokio::test]
    async fn missing_namespace_has_no_devices() {
        let fake = FakeExecutor::new();
        fake.on("ip netns exec gone", Reply::fail(1, "Cannot open network namespace \"gone\""));
        fake.on("netns list", Reply::stdout("ns1\n"));
        let links = NetCtl::new(fake, Config::default()).links(Some("gone"));

        assert!(links.list_devices(true, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_error_in_existing_namespace_is_returned() {
        let fake = FakeExecutor::new();
        fake.on("find", Reply::fail(1, "find: permission denied"));
        fake.on("netns list", Reply::stdout("ns1 (id: 0)\n"));
        let links = NetCtl::new(fake, Config::default()).links(Some("ns1"));

        assert!(links.list_devices(true, false).await.is_err());
    }

    #[tokio::test]
    async fn decodes_device_info() {
        let fake = FakeExecutor::new();
        fake.on(
            "ip -d -j link show",
            Reply::stdout(
                r#"[{"ifname":"vx0","link_type":"ether","address":"aa:bb:cc:dd:ee:01",
                    "linkinfo":{"info_kind":"vxlan","info_data":{"id":42,"group":"239.0.0.1"}}}]"#,
            ),
        );
        let links = NetCtl::new(fake, Config::default()).links(Some("ns1"));

        let devices = links.get_devices_info().await.unwrap();
        assert_eq!(devices[0].name, "vx0");
        assert_eq!(devices[0].namespace.as_deref(), Some("ns1"));
        match devices[0].kind {
            netctl_parse::DeviceKind::Vxlan(ref info) => {
                assert_eq!(info.id, 42);
                assert_eq!(info.group, Some("239.0.0.1".parse().unwrap()));
            }
            ref other => panic!("unexpected kind {other:?}"),
        }
    }
}
