use std::net::IpAddr;

use netctl_exec::{diagnostic, Command};
use netctl_parse::{parse_neighbors_json, IpVersion, NeighState, NeighborEntry};

use crate::{IpDevice, Result};

/// Manages the ARP and NDP entries of one device.
#[derive(Debug, Clone)]
pub struct NeighborController {
    device: IpDevice,
}

impl NeighborController {
    pub(crate) fn new(device: IpDevice) -> Self {
        Self { device }
    }

    /// Adds or replaces the entry for `dst`. Entries are usually added as
    /// [`NeighState::Permanent`].
    pub async fn add(&self, dst: IpAddr, lladdr: &str, state: NeighState) -> Result<()> {
        tracing::debug!(
            device = %self.device,
            namespace = ?self.device.namespace(),
            %dst,
            lladdr,
            %state,
            "adding neighbor"
        );

        let version = IpVersion::of(&dst);
        let dst = dst.to_string();
        let command = Command::ip([version.flag()], "neigh")
            .args(["replace", dst.as_str(), "lladdr", lladdr, "nud", state.as_str()])
            .args(["dev", self.device.name()]);
        self.device.run(command.privileged()).await.map(drop)
    }

    /// Removes the entry for `dst`. A missing entry is not an error.
    pub async fn delete(&self, dst: IpAddr, lladdr: &str) -> Result<()> {
        tracing::debug!(
            device = %self.device,
            namespace = ?self.device.namespace(),
            %dst,
            lladdr,
            "deleting neighbor"
        );

        let command = Command::ip([IpVersion::of(&dst).flag()], "neigh")
            .args(["del".to_string(), dst.to_string()])
            .args(["lladdr", lladdr, "dev", self.device.name()])
            .netns(self.device.namespace())
            .privileged();

        match self.device.ctx().execute(command).await {
            Ok(_) => Ok(()),
            Err(err) if diagnostic::is_entry_not_found(&err) => {
                tracing::debug!(device = %self.device, %dst, "neighbor already gone");
                Ok(())
            }
            Err(err) => Err(self.device.classify(err)),
        }
    }

    /// Entries of one family on the device.
    pub async fn dump(&self, version: IpVersion) -> Result<Vec<NeighborEntry>> {
        let command = Command::ip([version.flag(), "-j"], "neigh")
            .args(["show", "dev", self.device.name()]);

        let stdout = self.device.run(command).await?;
        Ok(parse_neighbors_json(&stdout, Some(self.device.name()))?)
    }

    /// Removes every entry of one family within `prefix`, on any device of the namespace.
    pub async fn flush(&self, version: IpVersion, prefix: &str) -> Result<()> {
        tracing::debug!(namespace = ?self.device.namespace(), prefix, "flushing neighbors");

        let command =
            Command::ip([version.flag()], "neigh").args(["flush", "to", prefix]).privileged();
        self.device.run(command).await.map(drop)
    }
}
