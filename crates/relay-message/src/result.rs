//! Command results and the bus error taxonomy.
//!
//! A [`CommandResult`] is produced by the dispatch engine for every
//! accepted command — never by handler code directly. Handler failures are
//! lifted into a failed result carrying an [`ErrorKind`] from the taxonomy
//! below; nothing is ever raised through `execute`.

use relay_types::{CommandId, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Failure classification for bus operations.
///
/// Kinds, not types: each variant names *why* an operation failed, and
/// callers branch on the kind rather than on error messages.
///
/// | Kind | Meaning | Recoverable |
/// |------|---------|-------------|
/// | [`NoHandler`](Self::NoHandler) | No eligible handler in scope | No |
/// | [`DuplicateHandler`](Self::DuplicateHandler) | Command handler re-registration | No |
/// | [`InvalidScope`](Self::InvalidScope) | Reserved or malformed session id | No |
/// | [`QueueFull`](Self::QueueFull) | Rejected by backpressure | Yes |
/// | [`HandlerFailure`](Self::HandlerFailure) | Handler returned an error or panicked | Yes |
/// | [`CircuitOpen`](Self::CircuitOpen) | Breaker short-circuited the call | Yes |
/// | [`Timeout`](Self::Timeout) | Caller or internal deadline exceeded | Yes |
/// | [`Cancelled`](Self::Cancelled) | Caller or session cancelled | No |
/// | [`ShuttingDown`](Self::ShuttingDown) | Operation after `stop` began | No |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Command has no eligible handler in its scope.
    NoHandler,
    /// A command handler is already registered for this (scope, type).
    DuplicateHandler,
    /// Reserved or malformed session id used as a scope.
    InvalidScope,
    /// Event rejected by the bounded queue's backpressure policy.
    QueueFull,
    /// Handler returned an error or panicked.
    HandlerFailure,
    /// Circuit breaker rejected the call without invoking the handler.
    CircuitOpen,
    /// Caller or internal deadline exceeded.
    Timeout,
    /// The caller cancelled, or the owning session closed mid-flight.
    Cancelled,
    /// Operation attempted after shutdown began.
    ShuttingDown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NoHandler => "no handler",
            Self::DuplicateHandler => "duplicate handler",
            Self::InvalidScope => "invalid scope",
            Self::QueueFull => "queue full",
            Self::HandlerFailure => "handler failure",
            Self::CircuitOpen => "circuit open",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::ShuttingDown => "shutting down",
        };
        f.write_str(name)
    }
}

impl ErrorCode for ErrorKind {
    fn code(&self) -> &'static str {
        match self {
            Self::NoHandler => "BUS_NO_HANDLER",
            Self::DuplicateHandler => "BUS_DUPLICATE_HANDLER",
            Self::InvalidScope => "BUS_INVALID_SCOPE",
            Self::QueueFull => "BUS_QUEUE_FULL",
            Self::HandlerFailure => "BUS_HANDLER_FAILURE",
            Self::CircuitOpen => "BUS_CIRCUIT_OPEN",
            Self::Timeout => "BUS_TIMEOUT",
            Self::Cancelled => "BUS_CANCELLED",
            Self::ShuttingDown => "BUS_SHUTTING_DOWN",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::QueueFull | Self::HandlerFailure | Self::CircuitOpen | Self::Timeout => true,
            Self::NoHandler
            | Self::DuplicateHandler
            | Self::InvalidScope
            | Self::Cancelled
            | Self::ShuttingDown => false,
        }
    }
}

/// A classified command failure: taxonomy kind plus human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct CommandError {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable detail for logs and diagnostics.
    pub message: String,
}

impl CommandError {
    /// Creates a classified failure.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of a command execution.
///
/// Exactly one `CommandResult` exists for every accepted command, success
/// or failure. Only the dispatch engine constructs results; handlers
/// return plain values or errors which the engine lifts into this shape.
///
/// # Example
///
/// ```
/// use relay_message::{CommandResult, ErrorKind};
/// use relay_types::CommandId;
/// use serde_json::json;
///
/// let id = CommandId::new();
/// let ok = CommandResult::ok(id, json!("pong")).with_attempts(1);
/// assert!(ok.success);
/// assert_eq!(ok.attempts, 1);
///
/// let failed = CommandResult::failed(id, ErrorKind::NoHandler, "no handler for `Ping`");
/// assert!(!failed.success);
/// assert_eq!(failed.error_kind(), Some(ErrorKind::NoHandler));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Whether the command completed successfully.
    pub success: bool,

    /// Identifier of the originating command.
    pub command_id: CommandId,

    /// Handler-produced value on success.
    pub value: Option<Value>,

    /// Classified failure on error.
    pub error: Option<CommandError>,

    /// Number of handler invocations performed (0 if the handler was
    /// never reached).
    pub attempts: u32,

    /// Engine-attached metadata (diagnostics, breaker state, etc).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn ok(command_id: CommandId, value: Value) -> Self {
        Self {
            success: true,
            command_id,
            value: Some(value),
            error: None,
            attempts: 1,
            metadata: Map::new(),
        }
    }

    /// Creates a failed result. `attempts` defaults to 0.
    #[must_use]
    pub fn failed(command_id: CommandId, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            command_id,
            value: None,
            error: Some(CommandError::new(kind, message)),
            attempts: 0,
            metadata: Map::new(),
        }
    }

    /// Sets the recorded attempt count.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Attaches a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the failure kind, if this result is a failure.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::assert_error_codes;
    use serde_json::json;

    fn all_kinds() -> Vec<ErrorKind> {
        vec![
            ErrorKind::NoHandler,
            ErrorKind::DuplicateHandler,
            ErrorKind::InvalidScope,
            ErrorKind::QueueFull,
            ErrorKind::HandlerFailure,
            ErrorKind::CircuitOpen,
            ErrorKind::Timeout,
            ErrorKind::Cancelled,
            ErrorKind::ShuttingDown,
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_kinds(), "BUS_");
    }

    #[test]
    fn kind_serde_uses_snake_case() {
        let json = serde_json::to_string(&ErrorKind::QueueFull).unwrap();
        assert_eq!(json, "\"queue_full\"");
    }

    #[test]
    fn transient_kinds_are_recoverable() {
        assert!(ErrorKind::QueueFull.is_recoverable());
        assert!(ErrorKind::CircuitOpen.is_recoverable());
        assert!(!ErrorKind::NoHandler.is_recoverable());
        assert!(!ErrorKind::ShuttingDown.is_recoverable());
    }

    #[test]
    fn ok_result_shape() {
        let id = CommandId::new();
        let result = CommandResult::ok(id, json!(42)).with_attempts(2);
        assert!(result.success);
        assert_eq!(result.command_id, id);
        assert_eq!(result.value, Some(json!(42)));
        assert_eq!(result.attempts, 2);
        assert!(result.error.is_none());
    }

    #[test]
    fn failed_result_shape() {
        let id = CommandId::new();
        let result = CommandResult::failed(id, ErrorKind::Timeout, "deadline exceeded")
            .with_metadata("deadline_ms", json!(100));
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
        assert_eq!(result.attempts, 0);
        assert_eq!(result.metadata["deadline_ms"], json!(100));
    }

    #[test]
    fn command_error_display() {
        let err = CommandError::new(ErrorKind::CircuitOpen, "breaker `BUS::Ping` is open");
        assert_eq!(err.to_string(), "circuit open: breaker `BUS::Ping` is open");
    }
}
