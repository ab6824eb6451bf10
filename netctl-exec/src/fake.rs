use std::{fmt, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Command, Error, Executor, Output, Result};

/// A canned answer for a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: i32,
    stdout: String,
    stderr: String,
}

impl Reply {
    /// Exit 0 with the given stdout.
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self { code: 0, stdout: stdout.into(), stderr: String::new() }
    }

    /// Exit with `code` and the given stderr.
    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        Self { code, stdout: String::new(), stderr: stderr.into() }
    }
}

impl Default for Reply {
    fn default() -> Self {
        Self::stdout("")
    }
}

type Handler = dyn Fn(&Command) -> Option<Reply> + Send + Sync;

struct Rule {
    pattern: String,
    reply: Reply,
    once: bool,
}

#[derive(Default)]
struct State {
    calls: Vec<Command>,
    rules: Vec<Rule>,
    handler: Option<Arc<Handler>>,
}

/// An [`Executor`] that never spawns anything.
///
/// Every command is recorded. Replies come from the handler if one is installed and returns
/// `Some`, then from the first rule whose pattern is a substring of the rendered command.
/// Commands without a matching rule succeed with empty output.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    state: Arc<Mutex<State>>,
}

impl fmt::Debug for FakeExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FakeExecutor")
            .field("calls", &state.calls.len())
            .field("rules", &state.rules.len())
            .field("handler", &state.handler.is_some())
            .finish()
    }
}

impl FakeExecutor {
    /// Creates a fake that answers every command with empty success.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fake that consults `handler` before any rule.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Command) -> Option<Reply> + Send + Sync + 'static,
    {
        let fake = Self::default();
        fake.state.lock().handler = Some(Arc::new(handler));
        fake
    }

    /// Answers every matching command with `reply`.
    pub fn on(&self, pattern: impl Into<String>, reply: Reply) -> &Self {
        self.state.lock().rules.push(Rule { pattern: pattern.into(), reply, once: false });
        self
    }

    /// Answers the next matching command with `reply`, then forgets the rule.
    pub fn once(&self, pattern: impl Into<String>, reply: Reply) -> &Self {
        self.state.lock().rules.push(Rule { pattern: pattern.into(), reply, once: true });
        self
    }

    /// Every recorded command, in order.
    pub fn calls(&self) -> Vec<Command> {
        self.state.lock().calls.clone()
    }

    /// Rendered form of every recorded command, without the root helper.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().calls.iter().map(ToString::to_string).collect()
    }

    /// Number of recorded commands containing `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| c.to_string().contains(pattern)).count()
    }

    fn reply_for(&self, command: &Command) -> Reply {
        let rendered = command.to_string();

        let handler = {
            let mut state = self.state.lock();
            state.calls.push(command.clone());
            state.handler.clone()
        };

        if let Some(reply) = handler.and_then(|handler| handler(command)) {
            return reply;
        }

        let mut state = self.state.lock();
        let Some(idx) = state.rules.iter().position(|rule| rendered.contains(&rule.pattern)) else {
            return Reply::default();
        };

        if state.rules[idx].once {
            state.rules.remove(idx).reply
        } else {
            state.rules[idx].reply.clone()
        }
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn execute(&self, command: Command) -> Result<Output> {
        if command.argv().is_empty() {
            return Err(Error::Empty);
        }

        let Reply { code, stdout, stderr } = self.reply_for(&command);
        let output = Output { code, stdout, stderr };

        tracing::debug!(%command, code, "fake command");

        if !command.accepts(code) {
            return Err(Error::NonZero { command: command.to_string(), output });
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_replies() {
        let fake = FakeExecutor::new();
        fake.once("addr show", Reply::stdout("first"));
        fake.on("addr show", Reply::stdout("second"));
        fake.on("link del", Reply::fail(1, "Cannot find device \"foo\""));

        let show = || Command::ip([], "addr").arg("show");

        assert_eq!(fake.execute(show()).await.unwrap().stdout, "first");
        assert_eq!(fake.execute(show()).await.unwrap().stdout, "second");
        assert_eq!(fake.execute(show()).await.unwrap().stdout, "second");

        let err = fake.execute(Command::ip([], "link").args(["del", "foo"])).await.unwrap_err();
        assert!(crate::diagnostic::is_device_not_found(&err));

        assert_eq!(fake.count("addr show"), 3);
        assert_eq!(fake.commands().last().unwrap(), "ip link del foo");
    }

    #[tokio::test]
    async fn handler_takes_precedence_and_ok_codes_apply() {
        let fake = FakeExecutor::with_handler(|cmd| {
            (cmd.argv()[0] == "arping").then(|| Reply::fail(1, "no replies"))
        });
        fake.on("arping", Reply::stdout("unreachable"));

        let output = fake.execute(Command::new("arping").ok_codes(&[1])).await.unwrap();
        assert_eq!(output.code, 1);

        assert!(fake.execute(Command::new("arping")).await.is_err());
        assert!(fake.execute(Command::new("true")).await.unwrap().success());
    }
}
