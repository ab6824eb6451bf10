use std::net::IpAddr;

use netctl_exec::Command;
use netctl_parse::{
    parse_gateway, parse_routes, parse_routes_json, Gateway, IpVersion, Route, Scope, Table,
};

use crate::{controller::Context, Error, Result};

/// Manages routes of a namespace, optionally bound to one device and one table.
///
/// Adds are upserts: re-adding an existing route replaces it instead of failing.
#[derive(Debug, Clone)]
pub struct RouteController {
    ctx: Context,
    namespace: Option<String>,
    device: Option<String>,
    table: Option<Table>,
}

impl RouteController {
    pub(crate) fn new(ctx: Context, namespace: Option<&str>, device: Option<&str>) -> Self {
        Self {
            ctx,
            namespace: namespace.map(str::to_string),
            device: device.map(str::to_string),
            table: None,
        }
    }

    /// Scopes every operation to `table` instead of the main table.
    pub fn table(mut self, table: impl Into<Table>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// The namespace this controller manages, `None` for the root.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The device routes are scoped to, if any.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// The table routes are read from and tagged with.
    fn queried_table(&self) -> Table {
        self.table.clone().unwrap_or(Table::Main)
    }

    /// `ip -V route <args> [dev D] [table T]`.
    fn command<I, S>(&self, version: IpVersion, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut command = Command::ip([version.flag()], "route").args(args);
        if let Some(ref device) = self.device {
            command = command.args(["dev", device.as_str()]);
        }
        if let Some(ref table) = self.table {
            command = command.args(["table".to_string(), table.to_string()]);
        }
        command
    }

    async fn run(&self, command: Command) -> Result<String> {
        let command = command.netns(self.namespace.as_deref());
        self.ctx.stdout(command).await.map_err(|err| {
            Error::classify(err, self.device.as_deref(), self.namespace.as_deref())
        })
    }

    /// The default route's next hop and metric, if there is a default route.
    pub async fn get_gateway(&self, version: IpVersion) -> Result<Option<Gateway>> {
        let stdout = self.run(self.command(version, ["list"])).await?;
        Ok(parse_gateway(version, &stdout)?)
    }

    /// Sets the default route through `gateway`.
    pub async fn add_gateway(&self, gateway: IpAddr, metric: Option<u32>) -> Result<()> {
        let version = IpVersion::of(&gateway);
        tracing::debug!(
            namespace = ?self.namespace,
            device = ?self.device,
            %gateway,
            ?metric,
            "setting default route"
        );

        let mut args = vec!["replace".to_string(), "default".to_string(), "via".to_string()];
        args.push(gateway.to_string());
        if let Some(metric) = metric {
            args.extend(["metric".to_string(), metric.to_string()]);
        }

        self.run(self.command(version, args).privileged()).await.map(drop)
    }

    /// Removes the default route through `gateway`.
    pub async fn delete_gateway(&self, gateway: IpAddr) -> Result<()> {
        let version = IpVersion::of(&gateway);
        tracing::debug!(
            namespace = ?self.namespace,
            device = ?self.device,
            %gateway,
            "deleting default route"
        );

        let gateway = gateway.to_string();
        let command = self.command(version, ["del", "default", "via", gateway.as_str()]);
        self.run(command.privileged()).await.map(drop)
    }

    fn route_args(action: &str, cidr: &str, via: Option<IpAddr>) -> Vec<String> {
        let mut args = vec![action.to_string(), cidr.to_string()];
        if let Some(via) = via {
            args.extend(["via".to_string(), via.to_string()]);
        }
        args
    }

    fn with_scope(command: Command, scope: Option<Scope>) -> Command {
        match scope {
            Some(scope) => command.args(["scope".to_string(), scope.to_string()]),
            None => command,
        }
    }

    /// Adds or replaces a route to `cidr`. `via` may be left out for on-link routes.
    pub async fn add_route(
        &self,
        cidr: &str,
        via: Option<IpAddr>,
        scope: Option<Scope>,
    ) -> Result<()> {
        let version = IpVersion::of_cidr(cidr)?;
        tracing::debug!(
            namespace = ?self.namespace,
            device = ?self.device,
            cidr,
            ?via,
            "adding route"
        );

        let command = self.command(version, Self::route_args("replace", cidr, via));
        self.run(Self::with_scope(command, scope).privileged()).await.map(drop)
    }

    /// Removes the route to `cidr`.
    pub async fn delete_route(
        &self,
        cidr: &str,
        via: Option<IpAddr>,
        scope: Option<Scope>,
    ) -> Result<()> {
        let version = IpVersion::of_cidr(cidr)?;
        tracing::debug!(
            namespace = ?self.namespace,
            device = ?self.device,
            cidr,
            ?via,
            "deleting route"
        );

        let command = self.command(version, Self::route_args("del", cidr, via));
        self.run(Self::with_scope(command, scope).privileged()).await.map(drop)
    }

    /// Adds a link scoped route to `cidr` without a next hop.
    pub async fn add_onlink_route(&self, cidr: &str) -> Result<()> {
        self.add_route(cidr, None, Some(Scope::Link)).await
    }

    /// Removes the link-scoped route to `cidr`.
    pub async fn delete_onlink_route(&self, cidr: &str) -> Result<()> {
        self.delete_route(cidr, None, Some(Scope::Link)).await
    }

    /// Routes of one family, each tagged with the queried table.
    pub async fn list_routes(&self, version: IpVersion) -> Result<Vec<Route>> {
        let stdout = self.run(self.command(version, ["list"])).await?;
        Ok(parse_routes(version, &self.queried_table(), self.device.as_deref(), &stdout)?)
    }

    /// Link scoped routes without a next hop or preferred source, excluding kernel routes.
    pub async fn list_onlink_routes(&self, version: IpVersion) -> Result<Vec<Route>> {
        let command = self.command(version, ["list"]).args(["scope", "link"]);
        let stdout = self.run(command).await?;

        let routes = parse_routes(version, &self.queried_table(), self.device.as_deref(), &stdout)?;
        Ok(routes.into_iter().filter(Route::is_onlink).collect())
    }

    /// Removes every route of one family from the table.
    pub async fn flush(&self, version: IpVersion) -> Result<()> {
        tracing::debug!(
            namespace = ?self.namespace,
            device = ?self.device,
            table = %self.queried_table(),
            "flushing routes"
        );

        let mut command = Command::ip([version.flag()], "route").arg("flush");
        if let Some(ref device) = self.device {
            command = command.args(["dev", device.as_str()]);
        }
        let command = command.args(["table".to_string(), self.queried_table().to_string()]);

        self.run(command.privileged()).await.map(drop)
    }

    /// Structured dump of the table, for every device.
    pub async fn routing_table(&self, version: IpVersion) -> Result<Vec<Route>> {
        let table = self.queried_table();
        let command = Command::ip([version.flag(), "-j"], "route")
            .args(["list".to_string(), "table".to_string(), table.to_string()]);

        let stdout = self.run(command).await?;
        Ok(parse_routes_json(version, &table, &stdout)?)
    }
}
