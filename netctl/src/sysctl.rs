//! Network sysctl parameters.
//!
//! Parameters are **per-namespace**: a write issued for a namespace runs `sysctl -w` inside it
//! and leaves every other namespace untouched. Reads of the root namespace go straight to the
//! configured procfs root.
//!
//! # Keys and paths
//!
//! Parameters are addressed by their dotted key, e.g. `net.ipv4.ip_nonlocal_bind`. Device names
//! may contain dots themselves, so a device `eth0.10` is written `eth0/10` inside a key. On disk
//! the two separators swap places: the key `net.ipv6.conf.eth0/10.disable_ipv6` lives at
//! `net/ipv6/conf/eth0.10/disable_ipv6`.

use std::{fmt, path::Path};

use netctl_exec::Command;
use netctl_parse::IpVersion;

use crate::{controller::Context, Error, Result};

/// A sysctl parameter that can be addressed by key.
pub trait SysctlParam {
    /// Returns the dotted key for the given IP version.
    fn key(&self, version: IpVersion) -> String;
}

/// Converts a dotted key to its path below the procfs root.
pub fn key_to_path(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '.' => '/',
            '/' => '.',
            c => c,
        })
        .collect()
}

/// Escapes a device name for use inside a key.
fn device_key(device: &str) -> String {
    device.replace('.', "/")
}

// ============================================================================
// IP Parameters
// ============================================================================

/// Namespace-wide IP parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Ip {
    /// Route packets between interfaces (0/1).
    Forwarding,

    /// Allow binding to addresses that are not (yet) configured locally (0/1).
    ///
    /// Used by routers whose addresses may move between hosts.
    NonlocalBind,

    /// Promote a secondary address to primary when the primary is removed, instead of
    /// flushing all secondaries (0/1). IPv4 only.
    PromoteSecondaries,
}

impl SysctlParam for Ip {
    fn key(&self, version: IpVersion) -> String {
        match (self, version) {
            (Self::Forwarding, IpVersion::V4) => "net.ipv4.ip_forward",
            (Self::Forwarding, IpVersion::V6) => "net.ipv6.conf.all.forwarding",
            (Self::NonlocalBind, IpVersion::V4) => "net.ipv4.ip_nonlocal_bind",
            (Self::NonlocalBind, IpVersion::V6) => "net.ipv6.ip_nonlocal_bind",
            (Self::PromoteSecondaries, _) => "net.ipv4.conf.all.promote_secondaries",
        }
        .to_string()
    }
}

// ============================================================================
// Per-device Parameters
// ============================================================================

/// Parameters of a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Device<'a> {
    /// Remove every IPv6 address from the device and stop autoconfiguration (0/1).
    DisableIpv6(&'a str),
}

impl SysctlParam for Device<'_> {
    /// Per-device keys exist for IPv6 only, so the version is ignored.
    fn key(&self, _version: IpVersion) -> String {
        match self {
            Self::DisableIpv6(device) => {
                format!("net.ipv6.conf.{}.disable_ipv6", device_key(device))
            }
        }
    }
}

/// Whether IPv6 is enabled on the host.
///
/// IPv6 counts as enabled when the default `disable_ipv6` knob exists and holds `0`. The knob is
/// missing entirely when the kernel was booted with IPv6 off.
pub async fn ipv6_enabled(procfs_dir: &Path) -> bool {
    let path = procfs_dir.join(key_to_path("net.ipv6.conf.default.disable_ipv6"));
    match tokio::fs::read_to_string(&path).await {
        Ok(value) => value.trim() == "0",
        Err(err) => {
            tracing::debug!(path = %path.display(), ?err, "ipv6 knob unreadable");
            false
        }
    }
}

/// Reads and writes sysctl parameters of one namespace.
#[derive(Debug, Clone)]
pub struct Sysctl {
    ctx: Context,
    namespace: Option<String>,
}

impl Sysctl {
    pub(crate) fn new(ctx: Context, namespace: Option<&str>) -> Self {
        Self { ctx, namespace: namespace.map(str::to_string) }
    }

    /// Writes `value` through `sysctl -w`.
    pub async fn write<P: SysctlParam>(
        &self,
        param: P,
        version: IpVersion,
        value: impl fmt::Display,
    ) -> Result<()> {
        let key = param.key(version);
        tracing::debug!(namespace = ?self.namespace, %key, %value, "writing sysctl");

        let command = Command::new("sysctl")
            .arg("-w")
            .arg(format!("{key}={value}"))
            .netns(self.namespace.as_deref())
            .privileged();

        self.ctx
            .execute(command)
            .await
            .map_err(|err| Error::classify(err, None, self.namespace.as_deref()))?;
        Ok(())
    }

    /// Reads a parameter. Returns the trimmed value.
    pub async fn read<P: SysctlParam>(&self, param: P, version: IpVersion) -> Result<String> {
        let key = param.key(version);

        if self.namespace.is_none() {
            let path = self.ctx.config().procfs_dir.join(key_to_path(&key));
            return Ok(tokio::fs::read_to_string(path).await?.trim().to_string());
        }

        let command =
            Command::new("sysctl").args(["-n", key.as_str()]).netns(self.namespace.as_deref());
        let stdout = self
            .ctx
            .stdout(command)
            .await
            .map_err(|err| Error::classify(err, None, self.namespace.as_deref()))?;
        Ok(stdout.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_keys() {
        assert_eq!(Ip::Forwarding.key(IpVersion::V4), "net.ipv4.ip_forward");
        assert_eq!(Ip::Forwarding.key(IpVersion::V6), "net.ipv6.conf.all.forwarding");
        assert_eq!(Ip::NonlocalBind.key(IpVersion::V4), "net.ipv4.ip_nonlocal_bind");
        assert_eq!(
            Ip::PromoteSecondaries.key(IpVersion::V6),
            "net.ipv4.conf.all.promote_secondaries"
        );
    }

    #[test]
    fn device_names_with_dots() {
        let key = Device::DisableIpv6("eth0.10").key(IpVersion::V6);
        assert_eq!(key, "net.ipv6.conf.eth0/10.disable_ipv6");
        assert_eq!(key_to_path(&key), "net/ipv6/conf/eth0.10/disable_ipv6");
    }

    #[tokio::test]
    async fn reads_global_ipv6_knob() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!ipv6_enabled(dir.path()).await);

        let conf = dir.path().join("net/ipv6/conf/default");
        std::fs::create_dir_all(&conf).unwrap();

        std::fs::write(conf.join("disable_ipv6"), "1\n").unwrap();
        assert!(!ipv6_enabled(dir.path()).await);

        std::fs::write(conf.join("disable_ipv6"), "0\n").unwrap();
        assert!(ipv6_enabled(dir.path()).await);
    }
}
