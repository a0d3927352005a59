//! Event dispatch loop.
//!
//! A single worker task drains batches from the bounded queue and fans
//! each event out to its handlers:
//!
//! - events within a batch are dispatched in admission order, so
//!   per-producer FIFO holds for handlers of equal priority
//! - within one event, handlers are grouped by priority; groups run in
//!   descending order and the handlers inside a group run concurrently
//! - handler resolution happens here, at drain time — handlers
//!   unregistered while an event was queued are not invoked
//! - handler failures are isolated: they are counted, reported through a
//!   `bus.handler.failed` event, and never affect peers or later events
//!
//! On shutdown the loop keeps draining for the configured grace period,
//! then abandons whatever is left (counted as dropped).

use crate::bus::BusInner;
use crate::metrics::Counter;
use crate::registry::EventBinding;
use relay_message::Event;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs the dispatch loop until shutdown is signalled, then drains.
pub(crate) async fn run(bus: Arc<BusInner>) {
    let mut shutdown = bus.shutdown_tx.subscribe();
    info!("event dispatch loop started");

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => {}
            batch = bus.queue.get_batch(bus.config.batch_size, bus.config.batch_timeout()) => {
                process_batch(&bus, batch).await;
            }
        }
    }

    let grace = *bus.shutdown_grace.lock();
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        let batch = bus.queue.take_now(bus.config.batch_size);
        if batch.is_empty() {
            break;
        }
        process_batch(&bus, batch).await;
    }

    let abandoned = bus.queue.abandon_remaining();
    if abandoned > 0 {
        warn!(abandoned, "abandoned queued events at shutdown");
    }
    info!("event dispatch loop stopped");
}

async fn process_batch(bus: &Arc<BusInner>, batch: Vec<crate::queue::QueueItem>) {
    for item in batch {
        dispatch_event(bus, item.event).await;
        bus.queue.mark_dispatched(1);
    }
}

/// Fans one event out to its handlers, priority group by priority group.
async fn dispatch_event(bus: &Arc<BusInner>, event: Event) {
    let bindings = bus
        .registry
        .resolve_event(&event.event_type, &event.session_id);
    let eligible: Vec<EventBinding> = bindings
        .into_iter()
        .filter(|binding| binding.accepts(&event))
        .collect();
    if eligible.is_empty() {
        debug!(event = %event, "no handlers for event");
        return;
    }

    let mut index = 0;
    while index < eligible.len() {
        let group_priority = eligible[index].priority;
        let mut handles = Vec::new();

        // Same-priority handlers run concurrently; the group is awaited
        // before the next (lower) priority starts.
        while index < eligible.len() && eligible[index].priority == group_priority {
            let binding = eligible[index].clone();
            let name = binding.name.clone();
            let event = event.clone();
            let metrics = bus.metrics.clone();
            handles.push((
                name,
                tokio::spawn(async move {
                    let started = Instant::now();
                    let result = binding.handler.handle(event).await;
                    metrics.observe_event_duration(&binding.name, started.elapsed());
                    result
                }),
            ));
            index += 1;
        }

        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(())) => {
                    bus.metrics.inc_counter(Counter::EventsProcessed);
                }
                Ok(Err(err)) => {
                    report_handler_failure(bus, &event, &name, &err.to_string());
                }
                Err(join_err) => {
                    let reason = if join_err.is_panic() {
                        "event handler panicked"
                    } else {
                        "event handler aborted"
                    };
                    report_handler_failure(bus, &event, &name, reason);
                }
            }
        }
    }
}

/// Counts and reports one handler failure without disturbing peers.
fn report_handler_failure(bus: &BusInner, event: &Event, handler: &str, error_message: &str) {
    bus.metrics.inc_counter(Counter::EventsFailed);
    error!(event = %event, handler, error = error_message, "event handler failed");

    let outcome = bus.publish_event(Event::handler_failed(event, handler, error_message));
    if !outcome.is_accepted() {
        debug!(event = %event, "handler failure event not admitted");
    }
}
