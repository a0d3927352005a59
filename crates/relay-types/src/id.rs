//! Identifier types for the relay bus.
//!
//! Message identifiers ([`CommandId`], [`EventId`]) are UUID-based so they
//! are globally unique without coordination and safe to log or transmit.
//! [`SessionId`] is string-based: session names are chosen by callers, and
//! the reserved name `"BUS"` denotes the process-lifetime scope.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved session name for the bus-wide (process-lifetime) scope.
pub const BUS_SESSION_NAME: &str = "BUS";

/// Identifier for a command dispatched through the bus.
///
/// A command represents an intention: exactly one handler consumes it and
/// produces a result carrying the same `CommandId`.
///
/// # Example
///
/// ```
/// use relay_types::CommandId;
///
/// let a = CommandId::new();
/// let b = CommandId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub Uuid);

impl CommandId {
    /// Creates a new [`CommandId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cmd:{}", self.0)
    }
}

/// Identifier for an event published through the bus.
///
/// An event represents a fact: zero or more handlers observe it, and the
/// record itself is never mutated after publication.
///
/// # Example
///
/// ```
/// use relay_types::EventId;
///
/// let id = EventId::new();
/// assert!(id.to_string().starts_with("evt:"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new [`EventId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evt:{}", self.0)
    }
}

/// Identifier for a handler-registration session.
///
/// Sessions are named scopes with guaranteed handler cleanup on close.
/// Names are caller-chosen non-empty strings; the reserved name `"BUS"`
/// (see [`BUS_SESSION_NAME`]) denotes the bus-wide scope and cannot be
/// used for a caller session.
///
/// `SessionId` construction does not validate the name: validation happens
/// where a name is *used* as a scope (handler registration, session open),
/// so that `SessionId::bus()` and deserialized identifiers flow through
/// the same type.
///
/// # Example
///
/// ```
/// use relay_types::SessionId;
///
/// let bus = SessionId::bus();
/// assert!(bus.is_bus());
///
/// let job = SessionId::named("job-1");
/// assert!(!job.is_bus());
/// assert_eq!(job.as_str(), "job-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Returns the reserved bus-wide session identifier.
    #[must_use]
    pub fn bus() -> Self {
        Self(BUS_SESSION_NAME.to_string())
    }

    /// Creates a session identifier from a caller-chosen name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Creates a session identifier with a random, unique name.
    #[must_use]
    pub fn random() -> Self {
        Self(format!("session-{}", Uuid::new_v4()))
    }

    /// Returns `true` if this is the reserved bus-wide identifier.
    #[must_use]
    pub fn is_bus(&self) -> bool {
        self.0 == BUS_SESSION_NAME
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for SessionId {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ids_are_unique() {
        assert_ne!(CommandId::new(), CommandId::new());
    }

    #[test]
    fn event_id_display() {
        let id = EventId::new();
        assert!(id.to_string().starts_with("evt:"));
    }

    #[test]
    fn bus_session_is_reserved() {
        assert!(SessionId::bus().is_bus());
        assert!(SessionId::named("BUS").is_bus());
        assert!(!SessionId::named("bus").is_bus());
    }

    #[test]
    fn random_sessions_are_unique() {
        let a = SessionId::random();
        let b = SessionId::random();
        assert_ne!(a, b);
        assert!(!a.is_bus());
    }

    #[test]
    fn session_id_from_str() {
        let id: SessionId = "job-7".into();
        assert_eq!(id.as_str(), "job-7");
    }

    #[test]
    fn ids_roundtrip_serde() {
        let id = CommandId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: CommandId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
