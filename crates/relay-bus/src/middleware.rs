//! Command middleware.
//!
//! Middleware forms an ordered chain around command execution:
//! `M1 -> M2 -> ... -> handler`. Each middleware receives the command and
//! a [`Next`] continuation; it may transform the command before calling
//! `next`, or short-circuit by returning a `CommandResult` without
//! calling it. Transformed commands are what the handler sees — the
//! `bus.command.started` event still carries the command as the caller
//! submitted it.

use async_trait::async_trait;
use relay_message::{Command, CommandResult, ErrorKind};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Continuation for the rest of the middleware chain.
///
/// Calling [`run`](Next::run) passes control to the next middleware, or
/// to command dispatch once the chain is exhausted.
pub struct Next<'a> {
    chain: &'a [Arc<dyn CommandMiddleware>],
    endpoint: &'a (dyn CommandEndpoint),
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        chain: &'a [Arc<dyn CommandMiddleware>],
        endpoint: &'a dyn CommandEndpoint,
    ) -> Self {
        Self { chain, endpoint }
    }

    /// Runs the remainder of the chain with the given command.
    pub async fn run(self, command: Command) -> CommandResult {
        match self.chain.split_first() {
            Some((middleware, rest)) => {
                middleware
                    .handle(command, Next::new(rest, self.endpoint))
                    .await
            }
            None => self.endpoint.dispatch(command).await,
        }
    }
}

/// Terminal stage of the middleware chain.
#[async_trait]
pub(crate) trait CommandEndpoint: Send + Sync {
    async fn dispatch(&self, command: Command) -> CommandResult;
}

/// An ordered interceptor on the command path.
///
/// # Example
///
/// ```no_run
/// use async_trait::async_trait;
/// use relay_bus::{CommandMiddleware, Next};
/// use relay_message::{Command, CommandResult};
///
/// struct Stamp;
///
/// #[async_trait]
/// impl CommandMiddleware for Stamp {
///     async fn handle(&self, mut command: Command, next: Next<'_>) -> CommandResult {
///         command.payload["stamped"] = serde_json::json!(true);
///         next.run(command).await
///     }
/// }
/// ```
#[async_trait]
pub trait CommandMiddleware: Send + Sync {
    /// Processes a command, calling `next.run` to continue the chain.
    async fn handle(&self, command: Command, next: Next<'_>) -> CommandResult;
}

/// Logs each command execution with its duration and outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl CommandMiddleware for LoggingMiddleware {
    async fn handle(&self, command: Command, next: Next<'_>) -> CommandResult {
        let command_type = command.command_type.clone();
        let command_id = command.command_id;
        info!(%command_id, command_type, session = %command.session_id, "executing command");

        let start = Instant::now();
        let result = next.run(command).await;
        let elapsed = start.elapsed();

        if result.success {
            info!(%command_id, command_type, ?elapsed, "command completed");
        } else {
            warn!(
                %command_id,
                command_type,
                ?elapsed,
                error = result.error.as_ref().map(|e| e.message.as_str()),
                "command failed"
            );
        }
        result
    }
}

/// Tracks per-command-type execution counts and cumulative duration.
#[derive(Debug, Default)]
pub struct TimingMiddleware {
    timings: parking_lot::Mutex<std::collections::HashMap<String, TimingEntry>>,
}

/// Aggregated timings for one command type.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingEntry {
    /// Invocations observed.
    pub count: u64,
    /// Total wall time across invocations.
    pub total: std::time::Duration,
    /// Longest single invocation.
    pub max: std::time::Duration,
}

impl TimingMiddleware {
    /// Creates an empty timing middleware.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the collected timings.
    #[must_use]
    pub fn stats(&self) -> std::collections::HashMap<String, TimingEntry> {
        self.timings.lock().clone()
    }
}

#[async_trait]
impl CommandMiddleware for TimingMiddleware {
    async fn handle(&self, command: Command, next: Next<'_>) -> CommandResult {
        let command_type = command.command_type.clone();
        let start = Instant::now();
        let result = next.run(command).await;
        let elapsed = start.elapsed();

        let mut timings = self.timings.lock();
        let entry = timings.entry(command_type).or_default();
        entry.count += 1;
        entry.total += elapsed;
        entry.max = entry.max.max(elapsed);
        result
    }
}

/// Rejects malformed commands before they reach the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationMiddleware;

#[async_trait]
impl CommandMiddleware for ValidationMiddleware {
    async fn handle(&self, command: Command, next: Next<'_>) -> CommandResult {
        if command.command_type.is_empty() {
            return CommandResult::failed(
                command.command_id,
                ErrorKind::NoHandler,
                "command has an empty type",
            );
        }
        if command.session_id.as_str().is_empty() {
            return CommandResult::failed(
                command.command_id,
                ErrorKind::InvalidScope,
                "command has an empty session id",
            );
        }
        next.run(command).await
    }
}
