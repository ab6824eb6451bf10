use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

/// Settings threaded into every controller at construction.
///
/// Every field is optional when deserializing and falls back to [`Config::default`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command prefix used to gain elevated privileges. Empty when already running as root.
    pub root_helper: Vec<String>,
    /// List namespaces through the root helper instead of reading [`Config::netns_dir`].
    /// Some deployments cannot read the namespace run directory unprivileged.
    pub use_helper_for_ns_read: bool,
    /// Directory holding the named namespace handles.
    pub netns_dir: PathBuf,
    /// Directory with one symlink per network device.
    pub sysfs_net_dir: PathBuf,
    /// Root of the sysctl tree.
    pub procfs_dir: PathBuf,
    /// First delay between two address readiness polls.
    pub address_poll_interval_ms: u64,
    /// Upper bound for the delay between two address readiness polls.
    pub address_poll_max_interval_ms: u64,
    /// Delay between two gratuitous ARP rounds.
    pub arping_interval_ms: u64,
    /// Deadline passed to `arping -w`.
    pub arping_wait_secs: f64,
    /// How long a gratuitous ARP round may run before its tasks are abandoned.
    pub announce_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_helper: vec!["sudo".to_string()],
            use_helper_for_ns_read: true,
            netns_dir: PathBuf::from("/run/netns"),
            sysfs_net_dir: PathBuf::from("/sys/class/net"),
            procfs_dir: PathBuf::from("/proc/sys"),
            address_poll_interval_ms: 200,
            address_poll_max_interval_ms: 1000,
            arping_interval_ms: 2000,
            arping_wait_secs: 1.5,
            announce_grace_ms: 5000,
        }
    }
}

impl Config {
    /// Sets the command prefix used for privileged commands.
    pub fn with_root_helper<I, S>(mut self, helper: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.root_helper = helper.into_iter().map(Into::into).collect();
        self
    }

    /// Lists namespaces through the root helper instead of reading the run directory.
    pub fn with_helper_for_ns_read(mut self, enabled: bool) -> Self {
        self.use_helper_for_ns_read = enabled;
        self
    }

    /// Sets the directory holding named namespaces.
    pub fn with_netns_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.netns_dir = dir.into();
        self
    }

    /// Sets the directory listing network devices.
    pub fn with_sysfs_net_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sysfs_net_dir = dir.into();
        self
    }

    /// Sets the sysctl root, usually `/proc/sys`.
    pub fn with_procfs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.procfs_dir = dir.into();
        self
    }

    /// Sets the first and the maximum delay between address readiness polls.
    pub fn with_address_poll(mut self, interval: Duration, max: Duration) -> Self {
        self.address_poll_interval_ms = millis(interval);
        self.address_poll_max_interval_ms = millis(max);
        self
    }

    /// Sets the pause between announcement rounds.
    pub fn with_arping_interval(mut self, interval: Duration) -> Self {
        self.arping_interval_ms = millis(interval);
        self
    }

    /// Sets how long one announcement round may take.
    pub fn with_announce_grace(mut self, grace: Duration) -> Self {
        self.announce_grace_ms = millis(grace);
        self
    }

    /// First delay between address readiness polls.
    pub fn address_poll_interval(&self) -> Duration {
        Duration::from_millis(self.address_poll_interval_ms)
    }

    /// Upper bound on the delay between address readiness polls.
    pub fn address_poll_max_interval(&self) -> Duration {
        Duration::from_millis(self.address_poll_max_interval_ms)
    }

    /// Pause between announcement rounds.
    pub fn arping_interval(&self) -> Duration {
        Duration::from_millis(self.arping_interval_ms)
    }

    /// Time allowed for one announcement round.
    pub fn announce_grace(&self) -> Duration {
        Duration::from_millis(self.announce_grace_ms)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
