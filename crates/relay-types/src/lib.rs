//! Core types for the relay message bus.
//!
//! This crate provides the foundational identifier and scope types shared
//! by every layer of the relay workspace.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Message Model Layer                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  relay-types    : CommandId, EventId, SessionId,  ◄── HERE  │
//! │                   HandlerScope, ErrorCode                    │
//! │  relay-message  : Command, Event, CommandResult, ErrorKind  │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Runtime Layer                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  relay-bus      : registry, queue, dispatch, sessions,      │
//! │                   resilience, metrics, observability         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Identifier Design
//!
//! Command and event identifiers are UUID-based: globally unique without
//! coordination, serde-serializable, and safe to log. Session identifiers
//! are caller-chosen strings; the reserved name `"BUS"` denotes the
//! process-lifetime scope.
//!
//! # Example
//!
//! ```
//! use relay_types::{CommandId, EventId, HandlerScope, SessionId};
//!
//! let command_id = CommandId::new();
//! let event_id = EventId::new();
//!
//! // The reserved "BUS" session maps onto the bus-wide scope.
//! let scope = HandlerScope::for_session(&SessionId::bus());
//! assert!(scope.is_bus());
//!
//! // Caller sessions get their own scope.
//! let scope = HandlerScope::for_session(&SessionId::named("job-1"));
//! assert!(!scope.is_bus());
//! ```

mod error;
mod id;
mod scope;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{CommandId, EventId, SessionId, BUS_SESSION_NAME};
pub use scope::HandlerScope;
