//! relay-bus - In-process async message bus.
//!
//! An asynchronous dispatcher routing *commands* (one-to-one,
//! result-returning) and *events* (one-to-many, fire-and-forget) between
//! producers and handlers, with scoped registration, ordered event
//! processing, backpressure, resilience and a direct observability hook.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              Bus                                 │
//! │                                                                  │
//! │  execute ──► middleware ──► registry ──► breaker ──► handler     │
//! │                               │ resolve              │ retry     │
//! │                               │                      ▼           │
//! │                               │               dead letter queue  │
//! │                                                                  │
//! │  publish ──► hook ──► filters ──► bounded queue ──► dispatch     │
//! │                                     │ backpressure    │ worker   │
//! │                                     ▼                 ▼          │
//! │                                  metrics      priority groups    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Scopes
//!
//! Handlers live in exactly one of two scopes: `BUS` (process lifetime)
//! or `SESSION:<id>` (until the session closes). Sessions guarantee
//! handler cleanup on every exit path, including unwinds.
//!
//! # Degradation under load
//!
//! Overload activates the configured overflow policy; failing handlers
//! open per-handler circuit breakers; commands that exhaust their retry
//! budget move to a bounded dead letter queue. No operation ever blocks
//! a publisher indefinitely.
//!
//! # Example
//!
//! ```no_run
//! use relay_bus::{Bus, BusConfig, HandlerError};
//! use relay_message::{Command, Event};
//! use relay_types::HandlerScope;
//! use serde_json::{json, Value};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = Bus::new(BusConfig::default())?;
//!     bus.start().await;
//!
//!     bus.register_command_handler(
//!         "Ping",
//!         |_command: Command| async move { Ok::<Value, HandlerError>(json!("pong")) },
//!         HandlerScope::Bus,
//!     )?;
//!     bus.register_event_handler(
//!         "order.placed",
//!         |event: Event| async move {
//!             println!("observed {event}");
//!             Ok::<(), HandlerError>(())
//!         },
//!         HandlerScope::Bus,
//!     )?;
//!
//!     let result = bus.execute(Command::new("Ping", Value::Null)).await;
//!     assert!(result.success);
//!
//!     bus.publish(Event::new("order.placed", json!({"order": 42})));
//!     bus.wait_until_idle().await;
//!     bus.stop(Duration::from_secs(1)).await;
//!     Ok(())
//! }
//! ```

mod bus;
mod config;
mod error;
mod filter;
mod handler;
mod metrics;
mod middleware;
mod observability;
mod queue;
mod registry;
mod resilience;
mod session;
pub mod testing;
mod worker;

pub use bus::{Bus, BusStats, DropReason, PublishOutcome, RejectReason};
pub use config::{BusConfig, CircuitBreakerConfig, JitterMode, OverflowPolicy, RetryConfig};
pub use error::{ConfigError, RegistryError, SessionError};
pub use filter::{CompositeFilter, EventFilter, EventTypeFilter, PatternFilter, SessionFilter};
pub use handler::{
    priority, CommandHandler, EventHandler, EventPredicate, HandlerError, HandlerKey, HandlerKind,
};
pub use metrics::{BucketCount, HistogramSnapshot, MetricsCollector, MetricsSnapshot};
pub use middleware::{
    CommandMiddleware, LoggingMiddleware, Next, TimingEntry, TimingMiddleware,
    ValidationMiddleware,
};
pub use observability::{ObservabilityHook, TracingHook};
pub use queue::QueueStats;
pub use registry::RegistryStats;
pub use resilience::{BreakerStateInfo, CircuitState, DeadLetterEntry};
pub use session::SessionHandle;

// Re-exports from the message model for convenience
pub use relay_message::{lifecycle, Command, CommandError, CommandResult, ErrorKind, Event};
pub use relay_types::{CommandId, ErrorCode, EventId, HandlerScope, SessionId};
