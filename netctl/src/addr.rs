use std::{fmt, net::IpAddr, time::Duration};

use futures::StreamExt;
use netctl_exec::Command;
use netctl_parse::{broadcast, parse_addresses, parse_cidr, Address, IpVersion, Scope};

use crate::{backoff::ExponentialBackoff, Error, IpDevice, Result};

/// Selectors accepted by [`AddressController::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddrFilter {
    Permanent,
    Dynamic,
    Tentative,
    Dadfailed,
    /// Addresses within a prefix, or one exact address.
    To(String),
}

impl AddrFilter {
    fn args(&self) -> Vec<String> {
        match self {
            Self::Permanent => vec!["permanent".to_string()],
            Self::Dynamic => vec!["dynamic".to_string()],
            Self::Tentative => vec!["tentative".to_string()],
            Self::Dadfailed => vec!["dadfailed".to_string()],
            Self::To(cidr) => vec!["to".to_string(), cidr.clone()],
        }
    }
}

/// Manages the addresses of one device.
#[derive(Debug, Clone)]
pub struct AddressController {
    device: IpDevice,
}

impl AddressController {
    pub(crate) fn new(device: IpDevice) -> Self {
        Self { device }
    }

    fn not_ready(&self, address: IpAddr, reason: impl fmt::Display) -> Error {
        Error::AddressNotReady {
            device: self.device.name().to_string(),
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Adds `cidr` with the given scope.
    ///
    /// With `add_broadcast`, IPv4 prefixes shorter than /31 get their broadcast address. Adding
    /// an address twice fails the way the kernel fails it.
    pub async fn add(&self, cidr: &str, scope: Scope, add_broadcast: bool) -> Result<()> {
        let net = parse_cidr(cidr)?;
        let version = IpVersion::of(&net.addr());
        tracing::debug!(
            device = %self.device,
            namespace = ?self.device.namespace(),
            cidr,
            "adding address"
        );

        let mut command = Command::ip([version.flag()], "addr")
            .args(["add", cidr, "scope"])
            .arg(scope.to_string())
            .args(["dev", self.device.name()]);
        if let Some(brd) = broadcast(&net).filter(|_| add_broadcast) {
            command = command.args(["brd".to_string(), brd.to_string()]);
        }

        self.device.run(command.privileged()).await.map(drop)
    }

    /// Removes `cidr` from the device.
    pub async fn delete(&self, cidr: &str) -> Result<()> {
        let version = IpVersion::of_cidr(cidr)?;
        tracing::debug!(
            device = %self.device,
            namespace = ?self.device.namespace(),
            cidr,
            "deleting address"
        );

        let command = Command::ip([version.flag()], "addr")
            .args(["del", cidr, "dev", self.device.name()])
            .privileged();
        self.device.run(command).await.map(drop)
    }

    /// Removes every address of one family.
    pub async fn flush(&self, version: IpVersion) -> Result<()> {
        let command = Command::ip([version.flag()], "addr")
            .args(["flush", "dev", self.device.name()])
            .privileged();
        self.device.run(command).await.map(drop)
    }

    /// Addresses of the device, narrowed by `scope` and `filters`.
    pub async fn list(&self, scope: Option<Scope>, filters: &[AddrFilter]) -> Result<Vec<Address>> {
        let mut command = Command::ip([], "addr").args(["show", "dev", self.device.name()]);
        for filter in filters {
            command = command.args(filter.args());
        }
        if let Some(scope) = scope {
            command = command.args(["scope".to_string(), scope.to_string()]);
        }

        let stdout = self.device.run(command).await?;
        Ok(parse_addresses(&stdout)?)
    }

    /// Waits until `address` has left the tentative state.
    ///
    /// Fails with [`Error::AddressNotReady`] if the address is missing, failed duplicate address
    /// detection, or is still tentative after `wait`. A ready address returns without sleeping.
    pub async fn wait_until_ready(&self, address: IpAddr, wait: Duration) -> Result<()> {
        let config = self.device.ctx().config();
        let mut backoff = ExponentialBackoff::new(
            config.address_poll_interval(),
            config.address_poll_max_interval(),
        );

        let poll = async {
            loop {
                let filter = [AddrFilter::To(address.to_string())];
                let addresses = self.list(None, &filter).await?;
                let Some(addr) = addresses.iter().find(|a| a.ip() == address) else {
                    return Err(self.not_ready(address, "address not present on interface"));
                };

                if addr.dadfailed {
                    return Err(self.not_ready(address, "duplicate address detected"));
                }
                if !addr.tentative {
                    return Ok(());
                }

                backoff.next().await;
            }
        };

        let result = tokio::time::timeout(wait, poll).await;
        let Ok(result) = result else {
            tracing::debug!(
                device = %self.device,
                %address,
                polls = backoff.retry_count(),
                "address still tentative"
            );
            let reason = format!(
                "exceeded {:.1}s limit waiting to leave the tentative state",
                wait.as_secs_f64()
            );
            return Err(self.not_ready(address, reason));
        };

        result
    }
}

#[cfg(test)]
mod tests {
    use netctl_exec::{FakeExecutor, Reply};

    use crate::{Config, NetCtl};

    use super::*;

    fn addr(fake: &FakeExecutor) -> AddressController {
        let poll = (Duration::from_millis(5), Duration::from_millis(20));
        let config = Config::default().with_address_poll(poll.0, poll.1);
        NetCtl::new(fake.clone(), config).device("tap0", None).addr()
    }

    const READY: &str = "2: tap0: <BROADCAST,UP> mtu 1500
    inet6 2001:db8::5/64 scope global
";
    const TENTATIVE: &str = "2: tap0: <BROADCAST,UP> mtu 1500
    inet6 2001:db8::5/64 scope global tentative
";
    const DADFAILED: &str = "2: tap0: <BROADCAST,UP> mtu 1500
    inet6 2001:db8::5/64 scope global tentative dadfailed
";

    fn ip() -> IpAddr {
        "2001:db8::5".parse().unwrap()
    }

    #[tokio::test]
    async fn add_computes_broadcast() {
        let fake = FakeExecutor::new();
        let addr = addr(&fake);

        addr.add("192.168.45.100/24", Scope::Global, true).await.unwrap();
        addr.add("10.0.0.1/24", Scope::Link, false).await.unwrap();
        addr.add("10.0.0.2/31", Scope::Global, true).await.unwrap();
        addr.add("2001:db8::1/64", Scope::Global, true).await.unwrap();

        assert_eq!(
            fake.commands(),
            [
                "ip -4 addr add 192.168.45.100/24 scope global dev tap0 brd 192.168.45.255",
                "ip -4 addr add 10.0.0.1/24 scope link dev tap0",
                "ip -4 addr add 10.0.0.2/31 scope global dev tap0",
                "ip -6 addr add 2001:db8::1/64 scope global dev tap0",
            ]
        );
    }

    #[tokio::test]
    async fn delete_and_flush() {
        let fake = FakeExecutor::new();
        let addr = addr(&fake);

        addr.delete("192.168.45.100/24").await.unwrap();
        addr.flush(IpVersion::V6).await.unwrap();

        assert_eq!(
            fake.commands(),
            ["ip -4 addr del 192.168.45.100/24 dev tap0", "ip -6 addr flush dev tap0"]
        );
    }

    #[tokio::test]
    async fn list_passes_filters() {
        let fake = FakeExecutor::new();
        let addr = addr(&fake);

        let filters = [AddrFilter::Permanent, AddrFilter::To("10.0.0.0/8".into())];
        addr.list(Some(Scope::Global), &filters).await.unwrap();
        assert_eq!(fake.commands(), ["ip addr show dev tap0 permanent to 10.0.0.0/8 scope global"]);
    }

    #[tokio::test]
    async fn ready_address_returns_without_polling() {
        let fake = FakeExecutor::new();
        fake.on("addr show", Reply::stdout(READY));

        addr(&fake).wait_until_ready(ip(), Duration::from_secs(2)).await.unwrap();
        assert_eq!(fake.count("addr show dev tap0 to 2001:db8::5"), 1);
    }

    #[tokio::test]
    async fn polls_while_tentative() {
        let _ = tracing_subscriber::fmt::try_init();
        let fake = FakeExecutor::new();
        fake.once("addr show", Reply::stdout(TENTATIVE));
        fake.once("addr show", Reply::stdout(TENTATIVE));
        fake.on("addr show", Reply::stdout(READY));

        addr(&fake).wait_until_ready(ip(), Duration::from_secs(2)).await.unwrap();
        assert_eq!(fake.count("addr show"), 3);
    }

    #[tokio::test]
    async fn dadfailed_is_never_ready() {
        let fake = FakeExecutor::new();
        fake.on("addr show", Reply::stdout(DADFAILED));

        let err = addr(&fake).wait_until_ready(ip(), Duration::from_secs(2)).await.unwrap_err();
        assert!(err.to_string().contains("duplicate address detected"), "{err}");
    }

    #[tokio::test]
    async fn missing_address_fails() {
        let fake = FakeExecutor::new();

        let err = addr(&fake).wait_until_ready(ip(), Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, Error::AddressNotReady { .. }));
        assert!(err.to_string().contains("not present"), "{err}");
    }

    #[tokio::test]
    async fn times_out_while_tentative() {
        let fake = FakeExecutor::new();
        fake.on("addr show", Reply::stdout(TENTATIVE));

        let err = addr(&fake).wait_until_ready(ip(), Duration::from_millis(60)).await.unwrap_err();
        assert!(err.to_string().contains("exceeded 0.1s limit"), "{err}");
        assert!(fake.count("addr show") > 1);
    }
}
