//! Handler traits and registration keys.
//!
//! Handlers are type-erased trait objects stored in the registry:
//!
//! - [`CommandHandler`]: consumes one command, returns a value (or an
//!   error the engine lifts into a failed `CommandResult`)
//! - [`EventHandler`]: observes one event, returns nothing
//!
//! Both traits have blanket implementations for async closures, so tests
//! and simple callers can register functions directly:
//!
//! ```
//! use relay_bus::HandlerError;
//! use relay_message::{Command, Event};
//! use serde_json::{json, Value};
//!
//! async fn ping(_command: Command) -> Result<Value, HandlerError> {
//!     Ok(json!("pong"))
//! }
//!
//! async fn audit(_event: Event) -> Result<(), HandlerError> {
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use relay_message::{Command, Event};
use relay_types::HandlerScope;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Event handler priority constants. Higher runs first; same-priority
/// handlers run concurrently.
pub mod priority {
    /// Runs before normal handlers.
    pub const HIGH: u32 = 100;
    /// Default priority.
    pub const NORMAL: u32 = 50;
    /// Runs after normal handlers.
    pub const LOW: u32 = 10;
}

/// Error returned by handler code.
///
/// The engine converts handler errors into the bus error taxonomy
/// (`ErrorKind::HandlerFailure`); handlers never construct
/// `CommandResult`s themselves.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Creates a handler error from anything displayable.
    #[must_use]
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

/// A command handler: consumes a single command, returns a value.
///
/// The returned value becomes `CommandResult.value`; an `Err` becomes a
/// failed result (after the resilience layer's retries). Handlers may
/// suspend on I/O.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handles one command.
    async fn handle(&self, command: Command) -> Result<Value, HandlerError>;

    /// Identity used for logs and circuit breaker labels.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(Command) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn handle(&self, command: Command) -> Result<Value, HandlerError> {
        (self)(command).await
    }
}

/// An event handler: observes a single event, fire-and-forget.
///
/// Errors are isolated — they never affect peer handlers or subsequent
/// events — and are reported via a `bus.handler.failed` event plus the
/// `events_failed_total` counter. Event handlers are never retried.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one event.
    async fn handle(&self, event: Event) -> Result<(), HandlerError>;

    /// Identity used for logs and histogram labels.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, event: Event) -> Result<(), HandlerError> {
        (self)(event).await
    }
}

/// Per-handler filter predicate, checked at dispatch time.
///
/// Must be pure: no side effects observable to the rest of the system.
pub type EventPredicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Which registry a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Command handler entry.
    Command,
    /// Event handler entry.
    Event,
}

/// Opaque key identifying one registration.
///
/// Returned by the registration API; pass it to `unregister` to remove
/// the handler. Unregistration is idempotent — a key may be used at most
/// once meaningfully, and stale keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    pub(crate) id: u64,
    pub(crate) kind: HandlerKind,
    pub(crate) scope: HandlerScope,
    pub(crate) message_type: String,
}

impl HandlerKey {
    /// The kind of handler this key refers to.
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// The scope the handler was registered in.
    #[must_use]
    pub fn scope(&self) -> &HandlerScope {
        &self.scope
    }

    /// The message type the handler was registered for.
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }
}

impl std::fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            HandlerKind::Command => "command",
            HandlerKind::Event => "event",
        };
        write!(f, "{kind}:{}:{}#{}", self.scope, self.message_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn closures_are_command_handlers() {
        let handler = |command: Command| async move { Ok(json!(command.command_type)) };
        let result = CommandHandler::handle(&handler, Command::new("Ping", Value::Null)).await;
        assert_eq!(result.unwrap(), json!("Ping"));
    }

    #[tokio::test]
    async fn closures_are_event_handlers() {
        let handler = |_event: Event| async move { Ok(()) };
        let result = EventHandler::handle(&handler, Event::new("tick", Value::Null)).await;
        assert!(result.is_ok());
    }

    #[test]
    fn handler_error_from_str() {
        let err: HandlerError = "boom".into();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn handler_key_display() {
        let key = HandlerKey {
            id: 7,
            kind: HandlerKind::Event,
            scope: HandlerScope::Bus,
            message_type: "tick".into(),
        };
        assert_eq!(key.to_string(), "event:BUS:tick#7");
    }
}
