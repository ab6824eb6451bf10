use std::io;

use netctl_exec::{diagnostic, Command};
use netctl_parse::{parse_namespaces, IpVersion};

use crate::{
    controller::Context,
    sysctl::{Ip, Sysctl},
    Error, LinkController, Result,
};

/// Creates, lists and removes named network namespaces.
#[derive(Debug, Clone)]
pub struct NamespaceManager {
    ctx: Context,
}

impl NamespaceManager {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Creates namespace `name` and brings its loopback device up.
    ///
    /// Secondary addresses are promoted when a primary address is removed.
    pub async fn create(&self, name: &str) -> Result<()> {
        tracing::debug!(namespace = name, "creating namespace");

        let command = Command::ip([], "netns").args(["add", name]).privileged();
        self.ctx.execute(command).await?;

        Sysctl::new(self.ctx.clone(), Some(name))
            .write(Ip::PromoteSecondaries, IpVersion::V4, 1)
            .await?;

        LinkController::new(self.ctx.clone(), Some(name)).device("lo").set_up().await
    }

    /// Creates namespace `name` unless it exists.
    pub async fn ensure(&self, name: &str) -> Result<()> {
        if !self.exists(name).await? {
            self.create(name).await?;
        }
        Ok(())
    }

    /// Removes namespace `name`. Callers are expected to check [`Self::is_empty`] first.
    pub async fn delete(&self, name: &str) -> Result<()> {
        tracing::debug!(namespace = name, "deleting namespace");

        let command = Command::ip([], "netns").args(["delete", name]).privileged();
        self.ctx.execute(command).await.map_err(|err| {
            if diagnostic::is_entry_not_found(&err) {
                Error::NamespaceNotFound(name.to_string())
            } else {
                Error::Command(err)
            }
        })?;
        Ok(())
    }

    /// Names of all namespaces.
    ///
    /// Uses `ip netns list` through the root helper or reads the namespace run directory,
    /// depending on [`Config::use_helper_for_ns_read`](crate::Config::use_helper_for_ns_read).
    pub async fn list(&self) -> Result<Vec<String>> {
        let config = self.ctx.config();

        if config.use_helper_for_ns_read {
            let command = Command::ip([], "netns").arg("list").privileged();
            return Ok(parse_namespaces(&self.ctx.stdout(command).await?));
        }

        let mut entries = match tokio::fs::read_dir(&config.netns_dir).await {
            Ok(entries) => entries,
            // The directory only appears with the first namespace.
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        Ok(names)
    }

    /// Whether namespace `name` exists.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.list().await?.iter().any(|ns| ns == name))
    }

    /// Whether the namespace holds no devices besides loopback and fallback tunnels.
    pub async fn is_empty(&self, name: &str) -> Result<bool> {
        let links = LinkController::new(self.ctx.clone(), Some(name));
        Ok(links.list_devices(true, true).await?.is_empty())
    }

    /// Deletes namespace `name` if it exists and is empty. Returns whether it was deleted.
    pub async fn garbage_collect(&self, name: &str) -> Result<bool> {
        if !self.exists(name).await? {
            return Ok(false);
        }

        match self.is_empty(name).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(namespace = name, "namespace still has devices, keeping it");
                return Ok(false);
            }
            Err(Error::NamespaceNotFound(_)) => return Ok(false),
            Err(err) => return Err(err),
        }

        match self.delete(name).await {
            Ok(()) => {
                tracing::info!(namespace = name, "garbage collected namespace");
                Ok(true)
            }
            // Removed concurrently after the checks above.
            Err(Error::NamespaceNotFound(_)) => {
                tracing::debug!(namespace = name, "namespace already removed");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Allows processes in the namespace to bind to addresses that are not configured locally.
    pub async fn set_ip_nonlocal_bind(&self, name: &str, enabled: bool) -> Result<()> {
        Sysctl::new(self.ctx.clone(), Some(name))
            .write(Ip::NonlocalBind, IpVersion::V4, u8::from(enabled))
            .await
    }
}
