//! Message model for the relay bus.
//!
//! This crate defines the records that flow through the bus and the error
//! taxonomy their failures are classified into.
//!
//! # Message Types
//!
//! | Type | Direction | Response | Use case |
//! |------|-----------|----------|----------|
//! | [`Command`] | Producer → single handler | [`CommandResult`] | Intentions |
//! | [`Event`] | Producer → all matching handlers | None | Facts, fire-and-forget |
//!
//! ```text
//! ┌─────────────┐  execute    ┌─────────────┐  Command   ┌─────────────┐
//! │  Producer   │ ──────────► │    Bus      │ ─────────► │   Handler   │
//! │             │ ◄────────── │             │ ◄───────── │             │
//! └─────────────┘ CommandResult └───────────┘   value    └─────────────┘
//!
//! ┌─────────────┐  publish    ┌─────────────┐   Event    ┌─────────────┐
//! │  Producer   │ ──────────► │    Bus      │ ─────────► │ Handler(s)  │
//! └─────────────┘             └─────────────┘            └─────────────┘
//! ```
//!
//! # Payload Model
//!
//! Messages carry a stable string type name (used for handler resolution)
//! and a `serde_json::Value` payload interpreted by handlers. This keeps
//! the registry type-erased while leaving typed (de)serialization to the
//! edges.
//!
//! # Error Taxonomy
//!
//! Failures are classified by [`ErrorKind`], not by concrete error types.
//! Command failures are *never* raised through `execute` — they become a
//! failed [`CommandResult`] carrying the kind. See [`ErrorKind`] for the
//! full table.
//!
//! # Example
//!
//! ```
//! use relay_message::{Command, Event};
//! use relay_types::SessionId;
//! use serde_json::json;
//!
//! let command = Command::new("Ping", json!({"seq": 1}))
//!     .with_session(SessionId::named("job-1"));
//! let event = Event::new("order.placed", json!({"order": 42}));
//!
//! assert_eq!(command.command_type, "Ping");
//! assert_eq!(event.event_type, "order.placed");
//! ```

mod command;
mod event;
mod result;

pub use command::Command;
pub use event::{lifecycle, Event};
pub use result::{CommandError, CommandResult, ErrorKind};

// Re-export from relay_types for convenience
pub use relay_types::{CommandId, EventId, SessionId};
