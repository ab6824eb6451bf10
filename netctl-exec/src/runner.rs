use std::process::Stdio;

use async_trait::async_trait;

use crate::{Command, Error, Executor, Output, Result};

/// Runs commands as child processes, escalating through a root helper when a command is
/// privileged.
#[derive(Debug, Clone)]
pub struct Runner {
    root_helper: Vec<String>,
}

impl Default for Runner {
    fn default() -> Self {
        Self { root_helper: vec!["sudo".to_string()] }
    }
}

impl Runner {
    /// Creates a runner with the given root helper argv, e.g. `["sudo", "-n"]`. An empty helper
    /// runs privileged commands directly, which is what a process that already holds
    /// `CAP_NET_ADMIN` wants.
    pub fn new(root_helper: Vec<String>) -> Self {
        Self { root_helper }
    }

    /// Prefix prepended to privileged commands.
    pub fn root_helper(&self) -> &[String] {
        &self.root_helper
    }
}

#[async_trait]
impl Executor for Runner {
    async fn execute(&self, command: Command) -> Result<Output> {
        let argv = command.render(&self.root_helper);
        let mut iter = argv.iter();
        let program = iter.next().ok_or(Error::Empty)?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(iter)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(?argv, "running command");

        let output: Output = cmd.output().await?.into();

        if !command.accepts(output.code) {
            tracing::debug!(?output.stderr, output.code, ?argv, "command returned non-zero status");
            return Err(Error::NonZero { command: command.to_string(), output });
        }

        Ok(output)
    }
}
