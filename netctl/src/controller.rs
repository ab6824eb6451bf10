use std::{net::IpAddr, sync::Arc};

use netctl_exec::{Command, Executor, Output, Runner};

use crate::{
    announce::{self, AnnouncementHandle},
    sysctl::Sysctl,
    Config, IpDevice, LinkController, NamespaceManager, RouteController, RuleController,
};

/// State shared by every controller handed out by one [`NetCtl`].
#[derive(Debug, Clone)]
pub(crate) struct Context {
    executor: Arc<dyn Executor>,
    config: Arc<Config>,
}

impl Context {
    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) async fn execute(&self, command: Command) -> netctl_exec::Result<Output> {
        self.executor.execute(command).await
    }

    /// Runs `command` and returns its stdout.
    pub(crate) async fn stdout(&self, command: Command) -> netctl_exec::Result<String> {
        self.execute(command).await.map(|output| output.stdout)
    }
}

/// Entry point: owns the executor and configuration, and hands out controllers.
///
/// Controllers are cheap handles. Operations on different namespaces may run concurrently.
#[derive(Debug, Clone)]
pub struct NetCtl {
    ctx: Context,
}

impl NetCtl {
    /// Creates a controller running commands through `executor`.
    pub fn new(executor: impl Executor, config: Config) -> Self {
        Self { ctx: Context { executor: Arc::new(executor), config: Arc::new(config) } }
    }

    /// Uses the process [`Runner`] with the configured root helper.
    pub fn with_runner(config: Config) -> Self {
        let runner = Runner::new(config.root_helper.clone());
        Self::new(runner, config)
    }

    /// The configuration shared by every controller.
    pub fn config(&self) -> &Config {
        self.ctx.config()
    }

    /// Manages named namespaces.
    pub fn namespaces(&self) -> NamespaceManager {
        NamespaceManager::new(self.ctx.clone())
    }

    /// Link controller for `namespace`, `None` being the root namespace.
    pub fn links(&self, namespace: Option<&str>) -> LinkController {
        LinkController::new(self.ctx.clone(), namespace)
    }

    /// A handle on a device, whether or not it exists yet.
    pub fn device(&self, name: &str, namespace: Option<&str>) -> IpDevice {
        IpDevice::new(self.ctx.clone(), name, namespace)
    }

    /// Routes of a whole namespace, not bound to a device.
    pub fn routes(&self, namespace: Option<&str>) -> RouteController {
        RouteController::new(self.ctx.clone(), namespace, None)
    }

    /// Policy rules of a namespace.
    pub fn rules(&self, namespace: Option<&str>) -> RuleController {
        RuleController::new(self.ctx.clone(), namespace)
    }

    /// Sysctl parameters of a namespace.
    pub fn sysctl(&self, namespace: Option<&str>) -> Sysctl {
        Sysctl::new(self.ctx.clone(), namespace)
    }

    /// Announces `address` on `device` with `count` rounds of gratuitous ARP.
    ///
    /// Returns at once. IPv6 addresses are not announced. Must be called from within a tokio
    /// runtime.
    pub fn send_gratuitous_announcements(
        &self,
        namespace: Option<&str>,
        device: &str,
        address: IpAddr,
        count: u32,
    ) -> AnnouncementHandle {
        announce::spawn(self.device(device, namespace), address, count)
    }
}
