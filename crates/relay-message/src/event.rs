//! Event messages and bus lifecycle events.
//!
//! An event represents a *fact*: zero or more handlers observe it and the
//! record itself is never mutated. Events are broadcast within their
//! session scope; bus-scoped handlers observe every session.
//!
//! # Lifecycle events
//!
//! The bus itself publishes events about its own operation, using the
//! stable type names in [`lifecycle`]:
//!
//! | Type | Published when |
//! |------|----------------|
//! | [`lifecycle::COMMAND_STARTED`] | A command resolved and is about to run |
//! | [`lifecycle::COMMAND_RESULT`] | A command finished (success or failure) |
//! | [`lifecycle::HANDLER_FAILED`] | An event handler returned an error |
//! | [`lifecycle::SESSION_START`] | A session opened |
//! | [`lifecycle::SESSION_END`] | A session closed (after handler cleanup) |
//! | [`lifecycle::DEAD_LETTER`] | A command exhausted its retry budget |

use crate::{Command, CommandResult};
use chrono::{DateTime, Utc};
use relay_types::{EventId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Stable type names for events the bus publishes about itself.
pub mod lifecycle {
    /// A command resolved to a handler and entered dispatch.
    pub const COMMAND_STARTED: &str = "bus.command.started";
    /// A command finished; the payload carries its `CommandResult`.
    pub const COMMAND_RESULT: &str = "bus.command.result";
    /// An event handler failed; peers were unaffected.
    pub const HANDLER_FAILED: &str = "bus.handler.failed";
    /// A session opened.
    pub const SESSION_START: &str = "bus.session.start";
    /// A session closed; all owned handlers were already removed.
    pub const SESSION_END: &str = "bus.session.end";
    /// A command was moved to the dead letter queue.
    pub const DEAD_LETTER: &str = "bus.dead_letter";
}

/// An immutable event record.
///
/// # Example
///
/// ```
/// use relay_message::Event;
/// use relay_types::SessionId;
/// use serde_json::json;
///
/// let event = Event::new("order.placed", json!({"order": 42}));
/// assert!(event.session_id.is_bus());
///
/// let scoped = Event::new("tick", json!({})).with_session(SessionId::named("job-1"));
/// assert_eq!(scoped.session_id.as_str(), "job-1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique event identifier.
    pub event_id: EventId,

    /// Session the event belongs to. Session-scoped handlers only see
    /// events of their own session; bus-scoped handlers see everything.
    pub session_id: SessionId,

    /// Stable type name used for handler resolution.
    pub event_type: String,

    /// Handler-interpreted payload.
    pub payload: Value,

    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Creates an event in the bus-wide scope with a fresh identifier.
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_id: EventId::new(),
            session_id: SessionId::bus(),
            event_type: event_type.into(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// Returns a copy of this event assigned to the given session.
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    /// Builds the [`lifecycle::COMMAND_STARTED`] event for a command.
    ///
    /// Carries the command as observed at `execute` time — middleware
    /// transformations are not reflected here.
    #[must_use]
    pub fn command_started(command: &Command) -> Self {
        Self {
            event_id: EventId::new(),
            session_id: command.session_id.clone(),
            event_type: lifecycle::COMMAND_STARTED.to_string(),
            payload: json!({
                "command_id": command.command_id,
                "command_type": command.command_type,
                "session_id": command.session_id,
            }),
            created_at: Utc::now(),
        }
    }

    /// Builds the [`lifecycle::COMMAND_RESULT`] event for a finished
    /// command.
    #[must_use]
    pub fn command_result(result: &CommandResult, session_id: &SessionId) -> Self {
        Self {
            event_id: EventId::new(),
            session_id: session_id.clone(),
            event_type: lifecycle::COMMAND_RESULT.to_string(),
            payload: serde_json::to_value(result).unwrap_or(Value::Null),
            created_at: Utc::now(),
        }
    }

    /// Builds the [`lifecycle::HANDLER_FAILED`] event for a failed event
    /// handler.
    ///
    /// Carries the failing event's id and type — not its full payload —
    /// plus the handler name and error message.
    #[must_use]
    pub fn handler_failed(failed: &Event, handler: &str, error: &str) -> Self {
        Self {
            event_id: EventId::new(),
            session_id: failed.session_id.clone(),
            event_type: lifecycle::HANDLER_FAILED.to_string(),
            payload: json!({
                "event_id": failed.event_id,
                "event_type": failed.event_type,
                "handler": handler,
                "error": error,
            }),
            created_at: Utc::now(),
        }
    }

    /// Builds the [`lifecycle::SESSION_START`] event.
    #[must_use]
    pub fn session_started(session_id: &SessionId, started_at: DateTime<Utc>) -> Self {
        Self {
            event_id: EventId::new(),
            session_id: session_id.clone(),
            event_type: lifecycle::SESSION_START.to_string(),
            payload: json!({
                "session_id": session_id,
                "started_at": started_at,
            }),
            created_at: Utc::now(),
        }
    }

    /// Builds the [`lifecycle::SESSION_END`] event.
    #[must_use]
    pub fn session_ended(session_id: &SessionId, ended_at: DateTime<Utc>, duration_ms: u64) -> Self {
        Self {
            event_id: EventId::new(),
            session_id: session_id.clone(),
            event_type: lifecycle::SESSION_END.to_string(),
            payload: json!({
                "session_id": session_id,
                "ended_at": ended_at,
                "duration_ms": duration_ms,
            }),
            created_at: Utc::now(),
        }
    }

    /// Builds the [`lifecycle::DEAD_LETTER`] event for a command that
    /// exhausted its retry budget.
    #[must_use]
    pub fn dead_letter(command: &Command, attempts: u32, error: &str) -> Self {
        Self {
            event_id: EventId::new(),
            session_id: command.session_id.clone(),
            event_type: lifecycle::DEAD_LETTER.to_string(),
            payload: json!({
                "command_id": command.command_id,
                "command_type": command.command_type,
                "attempts": attempts,
                "error": error,
            }),
            created_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({}) in {}",
            self.event_type, self.event_id, self.session_id
        )
    }
}
