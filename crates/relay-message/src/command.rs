//! Command messages.
//!
//! A command represents an *intention*: it is consumed by exactly one
//! handler, which produces a result for the caller. Commands are immutable
//! once constructed; the bus owns them from acceptance to completion.

use chrono::{DateTime, Utc};
use relay_types::{CommandId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable command record.
///
/// Commands carry a stable type name used for handler resolution and a
/// JSON payload interpreted by the handler. The `session_id` selects the
/// scope the command resolves in: a session-scoped handler is preferred,
/// with fallback to the bus scope.
///
/// # Example
///
/// ```
/// use relay_message::Command;
/// use relay_types::SessionId;
/// use serde_json::json;
///
/// let command = Command::new("Ping", json!({"seq": 1}));
/// assert_eq!(command.command_type, "Ping");
/// assert!(command.session_id.is_bus());
///
/// let scoped = Command::new("Ping", json!({})).with_session(SessionId::named("job-1"));
/// assert_eq!(scoped.session_id.as_str(), "job-1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Globally unique command identifier.
    pub command_id: CommandId,

    /// Session whose scope the command resolves in.
    pub session_id: SessionId,

    /// Stable type name used for handler resolution.
    pub command_type: String,

    /// Handler-interpreted payload.
    pub payload: Value,

    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
}

impl Command {
    /// Creates a command in the bus-wide scope with a fresh identifier.
    #[must_use]
    pub fn new(command_type: impl Into<String>, payload: Value) -> Self {
        Self {
            command_id: CommandId::new(),
            session_id: SessionId::bus(),
            command_type: command_type.into(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// Returns a copy of this command targeted at the given session scope.
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({}) in {}",
            self.command_type, self.command_id, self.session_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_command_defaults_to_bus_scope() {
        let cmd = Command::new("Ping", Value::Null);
        assert!(cmd.session_id.is_bus());
        assert_eq!(cmd.command_type, "Ping");
    }

    #[test]
    fn with_session_retargets() {
        let cmd = Command::new("Ping", Value::Null).with_session(SessionId::named("s1"));
        assert_eq!(cmd.session_id.as_str(), "s1");
    }

    #[test]
    fn command_roundtrips_serde() {
        let cmd = Command::new("Echo", json!({"msg": "hi"}));
        let json = serde_json::to_string(&cmd).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(back.command_id, cmd.command_id);
        assert_eq!(back.payload, cmd.payload);
    }
}
