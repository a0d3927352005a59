//! Bus layer errors.
//!
//! Registration and session errors are the only errors the bus *returns*:
//! they are programmer errors, surfaced synchronously. Runtime failures
//! (handler errors, timeouts, backpressure) never become `Err` values —
//! they are classified into [`ErrorKind`](relay_message::ErrorKind) and
//! reported through `CommandResult`, publish outcomes and metrics.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`RegistryError::DuplicateHandler`] | `BUS_DUPLICATE_HANDLER` | No |
//! | [`RegistryError::InvalidScope`] | `BUS_INVALID_SCOPE` | No |
//! | [`SessionError::InvalidId`] | `BUS_INVALID_SCOPE` | No |
//! | [`SessionError::AlreadyActive`] | `BUS_SESSION_ACTIVE` | No |
//! | [`ConfigError::*`] | `BUS_INVALID_CONFIG` | No |

use relay_types::{ErrorCode, HandlerScope, SessionId};
use thiserror::Error;

/// Handler registration error.
///
/// Raised synchronously from the registration API; these are programmer
/// errors, not runtime conditions.
///
/// # Example
///
/// ```
/// use relay_bus::RegistryError;
/// use relay_types::{ErrorCode, HandlerScope};
///
/// let err = RegistryError::DuplicateHandler {
///     command_type: "Ping".into(),
///     scope: HandlerScope::Bus,
/// };
/// assert_eq!(err.code(), "BUS_DUPLICATE_HANDLER");
/// assert!(!err.is_recoverable());
/// ```
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A command handler is already registered for this (scope, type).
    #[error("command handler for `{command_type}` already registered in scope {scope}")]
    DuplicateHandler {
        /// Command type that conflicted.
        command_type: String,
        /// Scope the conflict occurred in.
        scope: HandlerScope,
    },

    /// Empty or reserved session id used as a scope.
    #[error("invalid scope: {0}")]
    InvalidScope(String),
}

impl ErrorCode for RegistryError {
    fn code(&self) -> &'static str {
        match self {
            Self::DuplicateHandler { .. } => "BUS_DUPLICATE_HANDLER",
            Self::InvalidScope(_) => "BUS_INVALID_SCOPE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Session lifecycle error.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Session name is empty or uses the reserved `"BUS"` identifier.
    #[error("invalid session id: {0}")]
    InvalidId(String),

    /// A session with this id is already open.
    #[error("session `{0}` is already active")]
    AlreadyActive(SessionId),
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidId(_) => "BUS_INVALID_SCOPE",
            Self::AlreadyActive(_) => "BUS_SESSION_ACTIVE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Water marks must satisfy `0 < low < high <= 1`.
    #[error("water marks must satisfy 0 < low ({low}) < high ({high}) <= 1")]
    InvalidWaterMarks {
        /// Configured low water mark ratio.
        low: f64,
        /// Configured high water mark ratio.
        high: f64,
    },

    /// A capacity or batch size must be positive.
    #[error("`{field}` must be greater than zero")]
    ZeroCapacity {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The retry exponential base must be at least 1.0.
    #[error("retry exponential base must be >= 1.0, got {0}")]
    InvalidExponentialBase(f64),
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        "BUS_INVALID_CONFIG"
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Validates a session id for use as a handler scope or session name.
///
/// Empty names and the reserved `"BUS"` name are rejected.
pub(crate) fn validate_session_name(session_id: &SessionId) -> Result<(), SessionError> {
    if session_id.as_str().is_empty() {
        return Err(SessionError::InvalidId("empty session id".into()));
    }
    if session_id.is_bus() {
        return Err(SessionError::InvalidId(
            "`BUS` is reserved for the bus-wide scope".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::assert_error_codes;

    #[test]
    fn registry_error_codes_valid() {
        assert_error_codes(
            &[
                RegistryError::DuplicateHandler {
                    command_type: "x".into(),
                    scope: HandlerScope::Bus,
                },
                RegistryError::InvalidScope("x".into()),
            ],
            "BUS_",
        );
    }

    #[test]
    fn session_error_codes_valid() {
        assert_error_codes(
            &[
                SessionError::InvalidId("x".into()),
                SessionError::AlreadyActive(SessionId::named("x")),
            ],
            "BUS_",
        );
    }

    #[test]
    fn duplicate_handler_message_names_scope() {
        let err = RegistryError::DuplicateHandler {
            command_type: "Ping".into(),
            scope: HandlerScope::Session(SessionId::named("job-1")),
        };
        assert!(err.to_string().contains("Ping"));
        assert!(err.to_string().contains("SESSION:job-1"));
    }

    #[test]
    fn session_name_validation() {
        assert!(validate_session_name(&SessionId::named("job-1")).is_ok());
        assert!(validate_session_name(&SessionId::named("")).is_err());
        assert!(validate_session_name(&SessionId::bus()).is_err());
    }
}
