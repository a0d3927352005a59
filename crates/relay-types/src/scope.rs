//! Handler lifetime scopes.
//!
//! Every handler registered on the bus lives in exactly one scope:
//!
//! | Scope | Lifetime | Receives |
//! |-------|----------|----------|
//! | [`HandlerScope::Bus`] | Process | Events from every session |
//! | [`HandlerScope::Session`] | Until session close | Events of that session only |
//!
//! There are no other scopes. Command resolution prefers the session scope
//! and falls back to the bus scope; event resolution returns the union of
//! both.

use crate::id::SessionId;
use serde::{Deserialize, Serialize};

/// Lifetime namespace for a registered handler.
///
/// # Example
///
/// ```
/// use relay_types::{HandlerScope, SessionId};
///
/// let bus = HandlerScope::Bus;
/// assert!(bus.is_bus());
///
/// let scoped = HandlerScope::for_session(&SessionId::named("job-1"));
/// assert_eq!(scoped.session_id().unwrap().as_str(), "job-1");
///
/// // The reserved "BUS" session name maps onto the bus scope.
/// let mapped = HandlerScope::for_session(&SessionId::bus());
/// assert!(mapped.is_bus());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerScope {
    /// Process-lifetime scope. Handlers here observe all sessions.
    Bus,

    /// Scope tied to a named session. Handlers are removed when the
    /// session closes.
    Session(SessionId),
}

impl HandlerScope {
    /// Maps a session identifier onto its scope.
    ///
    /// The reserved `"BUS"` identifier maps to [`HandlerScope::Bus`];
    /// anything else maps to [`HandlerScope::Session`].
    #[must_use]
    pub fn for_session(session_id: &SessionId) -> Self {
        if session_id.is_bus() {
            Self::Bus
        } else {
            Self::Session(session_id.clone())
        }
    }

    /// Returns `true` for the bus-wide scope.
    #[must_use]
    pub fn is_bus(&self) -> bool {
        matches!(self, Self::Bus)
    }

    /// Returns the session identifier for session scopes, `None` for the
    /// bus scope.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Bus => None,
            Self::Session(id) => Some(id),
        }
    }
}

impl std::fmt::Display for HandlerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bus => f.write_str("BUS"),
            Self::Session(id) => write!(f, "SESSION:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_name_maps_to_bus_scope() {
        let scope = HandlerScope::for_session(&SessionId::bus());
        assert_eq!(scope, HandlerScope::Bus);
    }

    #[test]
    fn named_session_maps_to_session_scope() {
        let id = SessionId::named("job-1");
        let scope = HandlerScope::for_session(&id);
        assert_eq!(scope.session_id(), Some(&id));
    }

    #[test]
    fn display_format() {
        assert_eq!(HandlerScope::Bus.to_string(), "BUS");
        assert_eq!(
            HandlerScope::Session(SessionId::named("s1")).to_string(),
            "SESSION:s1"
        );
    }

    #[test]
    fn scope_equality() {
        let a = HandlerScope::Session(SessionId::named("x"));
        let b = HandlerScope::Session(SessionId::named("x"));
        let c = HandlerScope::Session(SessionId::named("y"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, HandlerScope::Bus);
    }
}
