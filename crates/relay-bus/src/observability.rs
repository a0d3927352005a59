//! Observability hook.
//!
//! The hook is the single egress channel the bus requires from
//! collaborators: it is invoked exactly once per published event,
//! synchronously on the publishing path, before filters run and before
//! the event is enqueued. Concrete sinks (console, files, OTel exporters)
//! live outside the bus and are driven through this interface.
//!
//! # Anti-recursion
//!
//! The hook is called directly — it does not re-enter the publish path,
//! and implementations must never publish events back to the bus.
//! Panics inside a hook are caught and counted
//! (`observability_errors_total`); they never abort publishing.

use relay_message::Event;
use tracing::debug;

/// Direct, non-recursive sink for every published event.
pub trait ObservabilityHook: Send + Sync {
    /// Observes one published event.
    ///
    /// Must not publish events back to the bus. Panics are caught by the
    /// caller and counted; they do not destabilize dispatch.
    fn observe(&self, event: &Event);
}

impl<F> ObservabilityHook for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn observe(&self, event: &Event) {
        (self)(event);
    }
}

/// Hook that logs every event through `tracing` at debug level.
///
/// A minimal default sink for development; production deployments attach
/// their own exporter-backed hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

impl ObservabilityHook for TracingHook {
    fn observe(&self, event: &Event) {
        debug!(event = %event, payload = %event.payload, "observed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn closure_is_a_hook() {
        let seen = Arc::new(AtomicUsize::new(0));
        let hook = {
            let seen = seen.clone();
            move |_event: &Event| {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        };
        hook.observe(&Event::new("tick", Value::Null));
        hook.observe(&Event::new("tick", Value::Null));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tracing_hook_is_quiet() {
        TracingHook.observe(&Event::new("tick", Value::Null));
    }
}
