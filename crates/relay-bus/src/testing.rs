//! Test harnesses for bus-based code.
//!
//! Small building blocks for exercising the bus without external
//! infrastructure: a recording observability hook, counting handlers,
//! and a handler that fails a configurable number of times.
//!
//! # Example
//!
//! ```no_run
//! use relay_bus::testing::{CountingEventHandler, RecordingHook};
//! use relay_bus::Bus;
//! use relay_types::HandlerScope;
//!
//! # async fn demo(bus: Bus) -> Result<(), Box<dyn std::error::Error>> {
//! let hook = RecordingHook::new();
//! bus.set_observability_hook(hook.clone());
//!
//! let counter = CountingEventHandler::new();
//! bus.register_event_handler("tick", counter.clone(), HandlerScope::Bus)?;
//! # Ok(())
//! # }
//! ```

use crate::handler::{CommandHandler, EventHandler, HandlerError};
use crate::observability::ObservabilityHook;
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_message::{Command, Event};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Observability hook that records every observed event.
#[derive(Clone, Default)]
pub struct RecordingHook {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingHook {
    /// Creates an empty recording hook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events observed so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Observed event types, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|event| event.event_type.clone())
            .collect()
    }

    /// Number of observed events of the given type.
    #[must_use]
    pub fn count_of(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }
}

impl ObservabilityHook for RecordingHook {
    fn observe(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

/// Event handler that counts invocations.
#[derive(Clone, Default)]
pub struct CountingEventHandler {
    hits: Arc<AtomicUsize>,
}

impl CountingEventHandler {
    /// Creates a handler with a zeroed counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invocations observed so far.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for CountingEventHandler {
    async fn handle(&self, _event: Event) -> Result<(), HandlerError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "counting_event_handler"
    }
}

/// Command handler that fails its first `n` invocations, then echoes the
/// command payload.
#[derive(Clone)]
pub struct FailNTimesHandler {
    remaining: Arc<AtomicI64>,
    calls: Arc<AtomicUsize>,
}

impl FailNTimesHandler {
    /// Fails the first `n` calls.
    #[must_use]
    pub fn new(n: i64) -> Self {
        Self {
            remaining: Arc::new(AtomicI64::new(n)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Total invocations observed so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandHandler for FailNTimesHandler {
    async fn handle(&self, command: Command) -> Result<Value, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            return Err(HandlerError::new("simulated failure"));
        }
        Ok(command.payload)
    }

    fn name(&self) -> &str {
        "fail_n_times_handler"
    }
}
