use std::{
    fmt,
    hash::{Hash, Hasher},
};

use netctl_exec::Command;
use netctl_parse::{parse_devices_json, Device, IpVersion};

use crate::{
    controller::Context,
    sysctl::{self, Sysctl},
    AddressController, Error, NeighborController, Result, RouteController,
};

/// A handle on a network device in a namespace.
///
/// The handle caches the device's name and namespace and is equal to any other handle with the
/// same pair. Kernel indices are not used, since they change when a device moves between
/// namespaces.
#[derive(Debug, Clone)]
pub struct IpDevice {
    ctx: Context,
    name: String,
    namespace: Option<String>,
}

impl IpDevice {
    pub(crate) fn new(ctx: Context, name: &str, namespace: Option<&str>) -> Self {
        Self { ctx, name: name.to_string(), namespace: namespace.map(str::to_string) }
    }

    /// Current device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning namespace, `None` for the root.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub(crate) fn ctx(&self) -> &Context {
        &self.ctx
    }

    pub(crate) fn classify(&self, err: netctl_exec::Error) -> Error {
        Error::classify(err, Some(&self.name), self.namespace.as_deref())
    }

    /// Runs `command` in the device's namespace and returns its stdout.
    pub(crate) async fn run(&self, command: Command) -> Result<String> {
        let command = command.netns(self.namespace.as_deref());
        self.ctx.stdout(command).await.map_err(|err| self.classify(err))
    }

    async fn link_set<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = Command::ip([], "link").args(["set", self.name.as_str()]).args(args);
        self.run(command.privileged()).await.map(drop)
    }

    /// Brings the device up.
    pub async fn set_up(&self) -> Result<()> {
        tracing::debug!(device = %self.name, namespace = ?self.namespace, "setting link up");
        self.link_set(["up"]).await
    }

    /// Brings the device down.
    pub async fn set_down(&self) -> Result<()> {
        tracing::debug!(device = %self.name, namespace = ?self.namespace, "setting link down");
        self.link_set(["down"]).await
    }

    /// Sets the MTU.
    pub async fn set_mtu(&self, mtu: u32) -> Result<()> {
        self.link_set(["mtu".to_string(), mtu.to_string()]).await
    }

    /// Sets the link-layer address.
    pub async fn set_address(&self, mac: &str) -> Result<()> {
        self.link_set(["address", mac]).await
    }

    /// Sets the interface alias.
    pub async fn set_alias(&self, alias: &str) -> Result<()> {
        self.link_set(["alias", alias]).await
    }

    /// Toggles reception of all multicast traffic.
    pub async fn set_allmulticast(&self, on: bool) -> Result<()> {
        self.link_set(["allmulticast", if on { "on" } else { "off" }]).await
    }

    /// Renames the device and updates this handle.
    pub async fn set_name(&mut self, name: &str) -> Result<()> {
        tracing::debug!(device = %self.name, namespace = ?self.namespace, name, "renaming link");
        self.link_set(["name", name]).await?;
        self.name = name.to_string();
        Ok(())
    }

    /// Moves the device to `namespace` and updates this handle.
    pub async fn set_netns(&mut self, namespace: &str) -> Result<()> {
        tracing::debug!(device = %self.name, from = ?self.namespace, to = namespace, "moving link");
        self.link_set(["netns", namespace]).await?;
        self.namespace = Some(namespace.to_string());
        Ok(())
    }

    /// Deletes the device. A missing device is an error.
    pub async fn delete(&self) -> Result<()> {
        tracing::debug!(device = %self.name, namespace = ?self.namespace, "deleting link");
        let command = Command::ip([], "link").args(["del", self.name.as_str()]);
        self.run(command.privileged()).await.map(drop)
    }

    /// Whether the device exists. A missing namespace counts as a missing device.
    pub async fn exists(&self) -> Result<bool> {
        let command = Command::ip(["-o"], "link").args(["show", "dev", self.name.as_str()]);
        match self.run(command).await {
            Ok(_) => Ok(true),
            Err(Error::DeviceNotFound { .. } | Error::NamespaceNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Full attributes of the device.
    pub async fn attributes(&self) -> Result<Device> {
        let command = Command::ip(["-d", "-j"], "link").args(["show", "dev", self.name.as_str()]);
        let stdout = self.run(command).await?;

        parse_devices_json(&stdout, self.namespace.as_deref())?.into_iter().next().ok_or_else(
            || Error::DeviceNotFound {
                device: self.name.clone(),
                namespace: self.namespace.clone(),
            },
        )
    }

    /// Brings the device up if it exists and has a link-layer address.
    ///
    /// Never fails: a missing device, a device without attributes or without a MAC, and a
    /// failed `set_up` all yield `false`.
    pub async fn ensure_ready(&self) -> bool {
        match self.attributes().await {
            Ok(device) if device.mac.is_some() => {}
            Ok(_) => {
                tracing::debug!(device = %self.name, "device has no link-layer address");
                return false;
            }
            Err(err) => {
                tracing::debug!(device = %self.name, ?err, "device not ready");
                return false;
            }
        }

        match self.set_up().await {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(device = %self.name, ?err, "failed to set device up");
                false
            }
        }
    }

    /// Disables IPv6 on the device. Does nothing when IPv6 is disabled on the host.
    pub async fn disable_ipv6(&self) -> Result<()> {
        if !sysctl::ipv6_enabled(&self.ctx.config().procfs_dir).await {
            tracing::debug!(device = %self.name, "ipv6 disabled on host, skipping");
            return Ok(());
        }

        Sysctl::new(self.ctx.clone(), self.namespace.as_deref())
            .write(sysctl::Device::DisableIpv6(&self.name), IpVersion::V6, 1)
            .await
    }

    /// Addresses of this device.
    pub fn addr(&self) -> AddressController {
        AddressController::new(self.clone())
    }

    /// Routes through this device.
    pub fn route(&self) -> RouteController {
        RouteController::new(self.ctx.clone(), self.namespace.as_deref(), Some(&self.name))
    }

    /// Neighbor entries of this device.
    pub fn neigh(&self) -> NeighborController {
        NeighborController::new(self.clone())
    }
}

impl PartialEq for IpDevice {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.namespace == other.namespace
    }
}

impl Eq for IpDevice {}

impl Hash for IpDevice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.namespace.hash(state);
    }
}

impl fmt::Display for IpDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
