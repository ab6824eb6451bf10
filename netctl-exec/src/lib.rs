#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! The privileged execution boundary.
//!
//! Everything that needs elevated capability or crosses into another network namespace is
//! expressed as a [`Command`] and handed to an [`Executor`]. [`Runner`] is the production
//! implementation and spawns child processes through a root helper. With the `test-utils`
//! feature enabled, [`FakeExecutor`] records commands and answers them from canned replies.

use std::sync::Arc;

use async_trait::async_trait;

mod command;
pub use command::{Command, Error, Output, Result};

/// Classification of failed commands.
pub mod diagnostic;

mod runner;
pub use runner::Runner;

#[cfg(any(test, feature = "test-utils"))]
mod fake;
#[cfg(any(test, feature = "test-utils"))]
pub use fake::{FakeExecutor, Reply};

/// Executes commands on behalf of the controllers.
///
/// Implementations report a non-zero exit status that the command does not accept as
/// [`Error::NonZero`], carrying the full [`Output`] so callers can classify the failure with
/// [`diagnostic`].
#[async_trait]
pub trait Executor: std::fmt::Debug + Send + Sync + 'static {
    async fn execute(&self, command: Command) -> Result<Output>;
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Arc<E> {
    async fn execute(&self, command: Command) -> Result<Output> {
        (**self).execute(command).await
    }
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Box<E> {
    async fn execute(&self, command: Command) -> Result<Output> {
        (**self).execute(command).await
    }
}
