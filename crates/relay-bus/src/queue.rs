//! Bounded event queue with backpressure.
//!
//! A thread-safe FIFO holding pending events. Admission is prompt — the
//! overflow policy decides between evicting the head, rejecting the new
//! item, or shedding load probabilistically — and never waits on the
//! consumer. Crossing the high water mark raises the backpressure signal;
//! falling below the low water mark clears it.
//!
//! Sequence numbers are assigned at admission and are strictly
//! increasing, so FIFO order within the queue is observable by consumers.

use crate::config::OverflowPolicy;
use crate::metrics::{Counter, Gauge, MetricsCollector};
use parking_lot::Mutex;
use rand::Rng;
use relay_message::Event;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Multiplicative decrease applied to the adaptive acceptance rate on
/// each rejection.
const RATE_DECREASE: f64 = 0.67;
/// Multiplicative increase applied once the queue falls below the low
/// water mark.
const RATE_INCREASE: f64 = 1.1;
/// Clamp bounds for the adaptive acceptance rate.
const RATE_MIN: f64 = 0.01;
const RATE_MAX: f64 = 1.0;

/// One queued event with its admission metadata.
#[derive(Debug)]
pub(crate) struct QueueItem {
    pub event: Event,
    #[allow(dead_code)] // Read by queue stats and tests
    pub enqueued_at: Instant,
    pub seq: u64,
}

/// Result of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PutOutcome {
    /// Event admitted.
    Accepted,
    /// Event rejected by the overflow policy.
    RejectedFull,
}

/// Cumulative queue health counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    /// Events admitted over the queue's lifetime.
    pub total_enqueued: u64,
    /// Events drained over the queue's lifetime.
    pub total_dequeued: u64,
    /// Events evicted by the `drop_oldest` policy or abandoned at
    /// shutdown.
    pub total_dropped: u64,
    /// Events rejected by `reject_new` or the adaptive rate limiter.
    pub total_rejected: u64,
    /// Times the high water mark was crossed upward.
    pub high_water_mark_hits: u64,
    /// Largest size the queue ever reached.
    pub max_size_reached: usize,
    /// Size at the time of the stats read.
    pub current_size: usize,
    /// Whether backpressure is currently active.
    pub backpressure_active: bool,
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<QueueItem>,
    next_seq: u64,
    backpressure: bool,
    accept_rate: f64,
    stats: QueueStats,
}

/// Thread-safe bounded FIFO with watermark signalling.
#[derive(Debug)]
pub(crate) struct BoundedEventQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    high_water: usize,
    low_water: usize,
    policy: OverflowPolicy,
    metrics: Arc<MetricsCollector>,
    /// Items drained but not yet fully dispatched; used to detect
    /// quiescence.
    in_flight: AtomicUsize,
}

impl BoundedEventQueue {
    pub fn new(
        capacity: usize,
        high_water_ratio: f64,
        low_water_ratio: f64,
        policy: OverflowPolicy,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let high_water = ((capacity as f64 * high_water_ratio) as usize).max(1);
        let low_water = (capacity as f64 * low_water_ratio) as usize;
        debug!(
            capacity,
            high_water,
            low_water,
            ?policy,
            "bounded event queue created"
        );
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                next_seq: 0,
                backpressure: false,
                accept_rate: RATE_MAX,
                stats: QueueStats::default(),
            }),
            notify: Notify::new(),
            capacity,
            high_water,
            low_water,
            policy,
            metrics,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Attempts to admit an event. Always prompt; the policy decides the
    /// outcome when the queue is full.
    pub fn put(&self, event: Event) -> PutOutcome {
        let mut state = self.state.lock();

        // Probabilistic shedding applies even before the queue is full,
        // once the acceptance rate has been driven below 1.0.
        if self.policy == OverflowPolicy::AdaptiveRateLimit && state.accept_rate < RATE_MAX {
            let sample: f64 = rand::rng().random();
            if sample > state.accept_rate {
                state.accept_rate = (state.accept_rate * RATE_DECREASE).max(RATE_MIN);
                state.stats.total_rejected += 1;
                self.metrics.inc_counter(Counter::EventsRejected);
                debug!(
                    rate = state.accept_rate,
                    "event shed by adaptive rate limiter"
                );
                return PutOutcome::RejectedFull;
            }
        }

        if state.items.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::DropOldest => {
                    if let Some(dropped) = state.items.pop_front() {
                        state.stats.total_dropped += 1;
                        self.metrics.inc_counter(Counter::EventsDropped);
                        warn!(event = %dropped.event, "dropped oldest event on overflow");
                    }
                }
                OverflowPolicy::RejectNew => {
                    state.stats.total_rejected += 1;
                    self.metrics.inc_counter(Counter::EventsRejected);
                    warn!(event = %event, "rejected event: queue full");
                    return PutOutcome::RejectedFull;
                }
                OverflowPolicy::AdaptiveRateLimit => {
                    state.accept_rate = (state.accept_rate * RATE_DECREASE).max(RATE_MIN);
                    state.stats.total_rejected += 1;
                    self.metrics.inc_counter(Counter::EventsRejected);
                    warn!(
                        rate = state.accept_rate,
                        "rejected event: queue full, rate lowered"
                    );
                    return PutOutcome::RejectedFull;
                }
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.items.push_back(QueueItem {
            event,
            enqueued_at: Instant::now(),
            seq,
        });

        let size = state.items.len();
        state.stats.total_enqueued += 1;
        state.stats.max_size_reached = state.stats.max_size_reached.max(size);
        self.metrics.set_gauge(Gauge::QueueSize, size as i64);

        if size >= self.high_water && !state.backpressure {
            state.backpressure = true;
            state.stats.high_water_mark_hits += 1;
            self.metrics.set_gauge(Gauge::BackpressureActive, 1);
            warn!(size, capacity = self.capacity, "backpressure activated");
        }

        drop(state);
        self.notify.notify_one();
        PutOutcome::Accepted
    }

    /// Drains up to `max_items`, waiting up to `timeout` for the first
    /// item. An empty batch means the deadline expired.
    ///
    /// Drained items count as in-flight until
    /// [`mark_dispatched`](Self::mark_dispatched) is called for them.
    pub async fn get_batch(&self, max_items: usize, timeout: Duration) -> Vec<QueueItem> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(batch) = self.try_take(max_items) {
                return batch;
            }
            let notified = self.notify.notified();
            if let Some(batch) = self.try_take(max_items) {
                return batch;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Vec::new();
            }
        }
    }

    /// Drains up to `max_items` without waiting.
    pub fn take_now(&self, max_items: usize) -> Vec<QueueItem> {
        self.try_take(max_items).unwrap_or_default()
    }

    fn try_take(&self, max_items: usize) -> Option<Vec<QueueItem>> {
        let mut state = self.state.lock();
        if state.items.is_empty() {
            return None;
        }
        let n = max_items.min(state.items.len());
        let batch: Vec<QueueItem> = state.items.drain(..n).collect();
        self.in_flight.fetch_add(batch.len(), Ordering::SeqCst);
        self.after_drain(&mut state, batch.len() as u64);
        Some(batch)
    }

    fn after_drain(&self, state: &mut QueueState, drained: u64) {
        state.stats.total_dequeued += drained;
        let size = state.items.len();
        self.metrics.set_gauge(Gauge::QueueSize, size as i64);

        if size <= self.low_water {
            if state.backpressure {
                state.backpressure = false;
                self.metrics.set_gauge(Gauge::BackpressureActive, 0);
                debug!(size, "backpressure released");
            }
            if self.policy == OverflowPolicy::AdaptiveRateLimit && size < self.low_water {
                state.accept_rate = (state.accept_rate * RATE_INCREASE).min(RATE_MAX);
            }
        }
    }

    /// Marks `n` previously drained items as fully dispatched.
    pub fn mark_dispatched(&self, n: usize) {
        self.in_flight.fetch_sub(n, Ordering::SeqCst);
    }

    /// Discards everything still queued, counting the items as dropped.
    /// Returns the number discarded.
    pub fn abandon_remaining(&self) -> usize {
        let mut state = self.state.lock();
        let n = state.items.len();
        if n > 0 {
            state.items.clear();
            state.stats.total_dropped += n as u64;
            self.metrics.inc_counter_by(Counter::EventsDropped, n as u64);
            self.metrics.set_gauge(Gauge::QueueSize, 0);
            if state.backpressure {
                state.backpressure = false;
                self.metrics.set_gauge(Gauge::BackpressureActive, 0);
            }
        }
        n
    }

    /// Current queue size.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// True when nothing is queued and nothing drained is still being
    /// dispatched.
    pub fn is_idle(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0 && self.state.lock().items.is_empty()
    }

    /// Cumulative health counters plus the current size.
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        let mut stats = state.stats;
        stats.current_size = state.items.len();
        stats.backpressure_active = state.backpressure;
        stats
    }

    #[cfg(test)]
    pub fn accept_rate(&self) -> f64 {
        self.state.lock().accept_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn queue(capacity: usize, policy: OverflowPolicy) -> BoundedEventQueue {
        BoundedEventQueue::new(
            capacity,
            0.8,
            0.5,
            policy,
            Arc::new(MetricsCollector::new()),
        )
    }

    fn event(n: u64) -> Event {
        Event::new("tick", Value::from(n))
    }

    #[test]
    fn fifo_order_with_increasing_seq() {
        let q = queue(10, OverflowPolicy::RejectNew);
        for n in 0..5 {
            assert_eq!(q.put(event(n)), PutOutcome::Accepted);
        }
        let batch = q.take_now(10);
        let seqs: Vec<u64> = batch.iter().map(|i| i.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        q.mark_dispatched(batch.len());
        assert!(q.is_idle());
    }

    #[test]
    fn reject_new_when_full() {
        let q = queue(3, OverflowPolicy::RejectNew);
        for n in 0..3 {
            assert_eq!(q.put(event(n)), PutOutcome::Accepted);
        }
        assert_eq!(q.put(event(3)), PutOutcome::RejectedFull);
        assert_eq!(q.put(event(4)), PutOutcome::RejectedFull);

        let stats = q.stats();
        assert_eq!(stats.total_rejected, 2);
        assert_eq!(stats.current_size, 3);
    }

    #[test]
    fn drop_oldest_evicts_head() {
        let q = queue(3, OverflowPolicy::DropOldest);
        for n in 0..4 {
            assert_eq!(q.put(event(n)), PutOutcome::Accepted);
        }
        let batch = q.take_now(10);
        let payloads: Vec<Value> = batch.iter().map(|i| i.event.payload.clone()).collect();
        // Event 0 was evicted to admit event 3.
        assert_eq!(payloads, vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert_eq!(q.stats().total_dropped, 1);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        for policy in [
            OverflowPolicy::DropOldest,
            OverflowPolicy::RejectNew,
            OverflowPolicy::AdaptiveRateLimit,
        ] {
            let q = queue(5, policy);
            for n in 0..50 {
                q.put(event(n));
                assert!(q.len() <= 5, "policy {policy:?} exceeded capacity");
            }
        }
    }

    #[test]
    fn backpressure_edges() {
        let metrics = Arc::new(MetricsCollector::new());
        let q = BoundedEventQueue::new(10, 0.8, 0.5, OverflowPolicy::RejectNew, metrics.clone());

        for n in 0..8 {
            q.put(event(n));
        }
        assert!(q.stats().backpressure_active);
        assert_eq!(metrics.gauge(Gauge::BackpressureActive), 1);
        assert_eq!(q.stats().high_water_mark_hits, 1);

        // Still above the low water mark after a small drain.
        let batch = q.take_now(2);
        q.mark_dispatched(batch.len());
        assert!(q.stats().backpressure_active);
        // Reaching the low water mark releases the signal.
        let batch = q.take_now(1);
        q.mark_dispatched(batch.len());
        assert!(!q.stats().backpressure_active);
        assert_eq!(metrics.gauge(Gauge::BackpressureActive), 0);
    }

    #[test]
    fn adaptive_rate_decreases_on_full_and_recovers() {
        let q = queue(3, OverflowPolicy::AdaptiveRateLimit);
        for n in 0..3 {
            q.put(event(n));
        }
        assert_eq!(q.put(event(3)), PutOutcome::RejectedFull);
        let lowered = q.accept_rate();
        assert!(lowered < 1.0);

        // Draining below the low water mark raises the rate again.
        let batch = q.take_now(3);
        q.mark_dispatched(batch.len());
        assert!(q.accept_rate() > lowered);
    }

    #[test]
    fn adaptive_rate_clamps_at_floor() {
        let q = queue(1, OverflowPolicy::AdaptiveRateLimit);
        q.put(event(0));
        for n in 0..1000 {
            q.put(event(n));
        }
        assert!(q.accept_rate() >= RATE_MIN);
    }

    #[test]
    fn abandon_counts_dropped() {
        let metrics = Arc::new(MetricsCollector::new());
        let q = BoundedEventQueue::new(10, 0.8, 0.5, OverflowPolicy::RejectNew, metrics.clone());
        for n in 0..4 {
            q.put(event(n));
        }
        assert_eq!(q.abandon_remaining(), 4);
        assert_eq!(q.len(), 0);
        assert_eq!(metrics.counter(Counter::EventsDropped), 4);
    }

    #[tokio::test]
    async fn get_batch_returns_empty_on_timeout() {
        let q = queue(10, OverflowPolicy::RejectNew);
        let batch = q.get_batch(10, Duration::from_millis(10)).await;
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn get_batch_wakes_on_put() {
        let q = Arc::new(queue(10, OverflowPolicy::RejectNew));
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get_batch(10, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.put(event(1));
        let batch = waiter.await.unwrap();
        assert_eq!(batch.len(), 1);
    }
}
