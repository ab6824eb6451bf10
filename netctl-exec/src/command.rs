//! Commands handed to an [`Executor`](crate::Executor) and the output they produce.

use std::{fmt, io, process};

/// Errors returned by the execution boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("empty command provided")]
    Empty,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("`{command}` exited with status {}: {}", .output.code, .output.stderr.trim())]
    NonZero { command: String, output: Output },
}

impl Error {
    /// The captured diagnostic output of a failed command, if it ran at all.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::NonZero { output, .. } => Some(&output.stderr),
            _ => None,
        }
    }
}

/// Result alias for the execution boundary.
pub type Result<T> = std::result::Result<T, Error>;

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// Exit code, `-1` if the process was killed by a signal.
    pub code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl Output {
    /// Successful output with the given stdout.
    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self { code: 0, stdout: stdout.into(), stderr: String::new() }
    }

    /// Whether the command exited with status 0.
    pub const fn success(&self) -> bool {
        self.code == 0
    }
}

impl From<process::Output> for Output {
    fn from(value: process::Output) -> Self {
        Self {
            code: value.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&value.stdout).to_string(),
            stderr: String::from_utf8_lossy(&value.stderr).to_string(),
        }
    }
}

/// A single invocation across the execution boundary.
///
/// A command that targets a namespace is wrapped in `ip netns exec <ns>` and always runs
/// with elevated privileges, since entering a namespace requires them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    argv: Vec<String>,
    namespace: Option<String>,
    privileged: bool,
    ok_codes: Vec<i32>,
}

impl Command {
    /// A command running `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self { argv: vec![program.into()], ..Default::default() }
    }

    /// `ip <options...> <object>`, the prefix shared by every iproute2 invocation.
    pub fn ip<'a>(options: impl IntoIterator<Item = &'a str>, object: &str) -> Self {
        Self::new("ip").args(options).arg(object)
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs the command inside `namespace`. `None` targets the root namespace.
    pub fn netns(mut self, namespace: Option<&str>) -> Self {
        self.namespace = namespace.map(ToOwned::to_owned);
        self
    }

    /// Runs the command through the root helper.
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Additional exit codes that count as success.
    pub fn ok_codes(mut self, codes: &[i32]) -> Self {
        self.ok_codes = codes.to_vec();
        self
    }

    /// Program and arguments, without the namespace prefix.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The target namespace, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Whether the command runs through the root helper.
    pub fn is_privileged(&self) -> bool {
        self.privileged || self.namespace.is_some()
    }

    /// Whether an exit code counts as success for this command.
    pub fn accepts(&self, code: i32) -> bool {
        code == 0 || self.ok_codes.contains(&code)
    }

    /// The argv without the root helper: `[ip netns exec <ns>] argv...`.
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.argv.len() + 4);
        if let Some(ref ns) = self.namespace {
            argv.extend(["ip", "netns", "exec", ns.as_str()].map(String::from));
        }
        argv.extend(self.argv.iter().cloned());
        argv
    }

    /// The full argv as executed, including the root helper when privileged.
    pub fn render(&self, root_helper: &[String]) -> Vec<String> {
        if self.is_privileged() {
            root_helper.iter().cloned().chain(self.to_argv()).collect()
        } else {
            self.to_argv()
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_argv().join(" "))
    }
}
