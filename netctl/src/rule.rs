use netctl_exec::{diagnostic, Command};
use netctl_parse::{parse_rules, parse_rules_json, IpVersion, Rule, RuleSpec, Table};

use crate::{controller::Context, Error, Result};

/// Manages the policy routing rules of a namespace.
///
/// Unlike routes, rules are not upserted. [`RuleController::add`] skips a rule that is already
/// installed and otherwise adds it.
#[derive(Debug, Clone)]
pub struct RuleController {
    ctx: Context,
    namespace: Option<String>,
}

impl RuleController {
    pub(crate) fn new(ctx: Context, namespace: Option<&str>) -> Self {
        Self { ctx, namespace: namespace.map(str::to_string) }
    }

    /// The namespace this controller manages, `None` for the root.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    async fn execute(&self, command: Command) -> netctl_exec::Result<String> {
        self.ctx.stdout(command.netns(self.namespace.as_deref())).await
    }

    fn classify(&self, err: netctl_exec::Error) -> Error {
        Error::classify(err, None, self.namespace.as_deref())
    }

    /// Installed rules as printed by `ip rule show`.
    async fn installed(&self, version: IpVersion) -> Result<Vec<Rule>> {
        let command = Command::ip([version.flag()], "rule").arg("show");
        let stdout = self.execute(command).await.map_err(|err| self.classify(err))?;
        Ok(parse_rules(version, &stdout)?)
    }

    /// Adds the rule unless an equivalent one is installed. Returns whether it was added.
    ///
    /// A rule with a priority only matches an installed rule with the same priority. Without a
    /// priority, any installed rule selecting the same traffic matches.
    pub async fn add(&self, spec: RuleSpec, version: IpVersion) -> Result<bool> {
        let rule = spec.canonicalize(version);

        let exists = self.installed(version).await?.iter().any(|installed| match rule.priority {
            Some(_) => installed == &rule,
            None => installed.same_as(&rule),
        });
        if exists {
            tracing::debug!(namespace = ?self.namespace, ?rule, "rule already installed");
            return Ok(false);
        }

        tracing::debug!(namespace = ?self.namespace, ?rule, "adding rule");
        let command = Command::ip([version.flag()], "rule").arg("add").args(rule.to_args());
        self.execute(command.privileged()).await.map_err(|err| self.classify(err))?;

        Ok(true)
    }

    /// Routes traffic from `cidr` through `table`.
    pub async fn add_rule(
        &self,
        cidr: &str,
        table: impl Into<Table>,
        priority: Option<u32>,
        version: IpVersion,
    ) -> Result<bool> {
        self.add(Self::source_rule(cidr, table, priority), version).await
    }

    /// Deletes the rule. A rule that is not installed is not an error.
    pub async fn delete(&self, spec: RuleSpec, version: IpVersion) -> Result<()> {
        let rule = spec.canonicalize(version);
        tracing::debug!(namespace = ?self.namespace, ?rule, "deleting rule");

        let command = Command::ip([version.flag()], "rule").arg("del").args(rule.to_args());
        match self.execute(command.privileged()).await {
            Ok(_) => Ok(()),
            Err(err) if diagnostic::is_entry_not_found(&err) => {
                tracing::debug!(namespace = ?self.namespace, ?rule, "rule not installed");
                Ok(())
            }
            Err(err) => Err(self.classify(err)),
        }
    }

    /// Deletes the rule routing `cidr` through `table`. See [`Self::delete`].
    pub async fn delete_rule(
        &self,
        cidr: &str,
        table: impl Into<Table>,
        priority: Option<u32>,
        version: IpVersion,
    ) -> Result<()> {
        self.delete(Self::source_rule(cidr, table, priority), version).await
    }

    fn source_rule(cidr: &str, table: impl Into<Table>, priority: Option<u32>) -> RuleSpec {
        let spec = RuleSpec::new().src(cidr).table(table);
        match priority {
            Some(priority) => spec.priority(priority),
            None => spec,
        }
    }

    /// Installed rules of one family, in canonical form.
    pub async fn list_rules(&self, version: IpVersion) -> Result<Vec<Rule>> {
        let command = Command::ip([version.flag(), "-j"], "rule").arg("show");
        let stdout = self.execute(command).await.map_err(|err| self.classify(err))?;
        Ok(parse_rules_json(version, &stdout)?)
    }
}
