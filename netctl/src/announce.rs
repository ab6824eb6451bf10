//! Gratuitous ARP announcements.
//!
//! An announcement burst runs as a detached task. Each round spawns one `arping -A` (reply
//! style) and one `arping -U` (request style) command and joins them within a grace period.
//! Failures are logged and never reach the caller.

use std::net::IpAddr;

use netctl_exec::Command;
use tokio::{
    task::{JoinHandle, JoinSet},
    time::{sleep, timeout},
};
use tracing::Instrument;

use crate::{AddrFilter, Error, IpDevice};

/// `arping` exits with 1 when nobody answers, which is the normal outcome of an announcement.
/// Later rounds also accept 2, reported when the device went down in between.
const FIRST_ROUND_OK: &[i32] = &[1];
const LATER_ROUND_OK: &[i32] = &[1, 2];

/// The two announcement styles: unsolicited ARP reply and ARP request.
const MODES: [&str; 2] = ["-A", "-U"];

/// Handle on a running announcement burst.
///
/// Dropping the handle detaches the burst, which keeps running to completion.
#[derive(Debug)]
#[must_use = "dropping the handle detaches the announcements"]
pub struct AnnouncementHandle {
    task: Option<JoinHandle<()>>,
}

impl AnnouncementHandle {
    const fn noop() -> Self {
        Self { task: None }
    }

    /// Waits for the burst to finish.
    pub async fn join(self) {
        let Some(task) = self.task else { return };
        if let Err(err) = task.await {
            if err.is_panic() {
                tracing::warn!(?err, "announcement task panicked");
            }
        }
    }

    /// Cancels the remaining rounds.
    pub fn abort(&self) {
        if let Some(ref task) = self.task {
            task.abort();
        }
    }

    /// Whether every round has run or the burst was aborted.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

/// Spawns `count` announcement rounds for `address` on `device`. IPv6 addresses are skipped.
pub(crate) fn spawn(device: IpDevice, address: IpAddr, count: u32) -> AnnouncementHandle {
    if address.is_ipv6() {
        tracing::debug!(device = %device, %address, "not announcing ipv6 address");
        return AnnouncementHandle::noop();
    }
    if count == 0 {
        return AnnouncementHandle::noop();
    }

    let span = tracing::info_span!(
        parent: None,
        "gratuitous_arp",
        device = %device,
        namespace = ?device.namespace(),
        %address
    );

    let task = tokio::spawn(announce(device, address, count).instrument(span));
    AnnouncementHandle { task: Some(task) }
}

fn arping(device: &IpDevice, mode: &str, address: IpAddr, ok_codes: &[i32]) -> Command {
    let wait = device.ctx().config().arping_wait_secs;
    Command::new("arping")
        .args([mode, "-I", device.name(), "-c", "1", "-w"])
        .args([wait.to_string(), address.to_string()])
        .netns(device.namespace())
        .privileged()
        .ok_codes(ok_codes)
}

/// Runs one round and returns the first failure, if any.
async fn round(device: &IpDevice, address: IpAddr, ok_codes: &[i32]) -> Option<String> {
    let config = device.ctx().config();
    let mut tasks = JoinSet::new();

    for mode in MODES {
        let command = arping(device, mode, address, ok_codes);
        let ctx = device.ctx().clone();
        tasks.spawn(async move { ctx.execute(command).await });
    }

    let joined = timeout(config.announce_grace(), async {
        let mut failure = None;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => failure = failure.or_else(|| Some(err.to_string())),
                Err(err) => failure = failure.or_else(|| Some(err.to_string())),
            }
        }
        failure
    })
    .await;

    joined.unwrap_or_else(|_| {
        tasks.abort_all();
        Some(format!("arping did not finish within {:?}", config.announce_grace()))
    })
}

/// Whether the address is still configured on the device. A missing device or namespace counts
/// as a removed address.
async fn still_configured(device: &IpDevice, address: IpAddr) -> bool {
    let filter = [AddrFilter::To(address.to_string())];
    match device.addr().list(None, &filter).await {
        Ok(addresses) => addresses.iter().any(|a| a.ip() == address),
        Err(Error::DeviceNotFound { .. } | Error::NamespaceNotFound(_)) => false,
        Err(err) => {
            tracing::debug!(?err, "could not check address");
            true
        }
    }
}

async fn announce(device: IpDevice, address: IpAddr, count: u32) {
    let interval = device.ctx().config().arping_interval();

    for i in 0..count {
        let ok_codes = if i == 0 { FIRST_ROUND_OK } else { LATER_ROUND_OK };

        if let Some(err) = round(&device, address, ok_codes).await {
            if !still_configured(&device, address).await {
                tracing::info!(round = i, "address removed, stopping announcements");
                return;
            }
            tracing::warn!(round = i, %err, "failed to send gratuitous arp");
        }

        if i + 1 < count {
            sleep(interval).await;
        }
    }

    tracing::debug!(rounds = count, "announcements sent");
}
