//! Metrics collection for the bus.
//!
//! Three metric families, all updated on the hot path without blocking:
//!
//! - **Counters** (monotonic): atomic increments, lock-free
//! - **Gauges**: atomic stores, lock-free
//! - **Histograms**: duration samples appended under a short per-metric
//!   lock; percentiles are computed only on snapshot
//!
//! The collector performs no I/O and exposes a single [`snapshot`]
//! (deep-copied, immutable) suitable for any external exporter.
//!
//! [`snapshot`]: MetricsCollector::snapshot

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Histogram bucket upper bounds, in seconds.
const DURATION_BUCKETS: [f64; 12] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Monotonic counters tracked by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Counter {
    EventsPublished,
    EventsProcessed,
    EventsFailed,
    EventsDropped,
    EventsRejected,
    CommandsSent,
    CommandsProcessed,
    CommandsFailed,
    ObservabilityErrors,
}

impl Counter {
    const COUNT: usize = 9;

    const ALL: [Counter; Self::COUNT] = [
        Counter::EventsPublished,
        Counter::EventsProcessed,
        Counter::EventsFailed,
        Counter::EventsDropped,
        Counter::EventsRejected,
        Counter::CommandsSent,
        Counter::CommandsProcessed,
        Counter::CommandsFailed,
        Counter::ObservabilityErrors,
    ];

    fn index(self) -> usize {
        match self {
            Self::EventsPublished => 0,
            Self::EventsProcessed => 1,
            Self::EventsFailed => 2,
            Self::EventsDropped => 3,
            Self::EventsRejected => 4,
            Self::CommandsSent => 5,
            Self::CommandsProcessed => 6,
            Self::CommandsFailed => 7,
            Self::ObservabilityErrors => 8,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::EventsPublished => "events_published_total",
            Self::EventsProcessed => "events_processed_total",
            Self::EventsFailed => "events_failed_total",
            Self::EventsDropped => "events_dropped_total",
            Self::EventsRejected => "events_rejected_total",
            Self::CommandsSent => "commands_sent_total",
            Self::CommandsProcessed => "commands_processed_total",
            Self::CommandsFailed => "commands_failed_total",
            Self::ObservabilityErrors => "observability_errors_total",
        }
    }
}

/// Point-in-time gauges tracked by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gauge {
    QueueSize,
    BackpressureActive,
    DeadLetterQueueSize,
    ActiveSessions,
    RegisteredHandlers,
}

impl Gauge {
    const COUNT: usize = 5;

    const ALL: [Gauge; Self::COUNT] = [
        Gauge::QueueSize,
        Gauge::BackpressureActive,
        Gauge::DeadLetterQueueSize,
        Gauge::ActiveSessions,
        Gauge::RegisteredHandlers,
    ];

    fn index(self) -> usize {
        match self {
            Self::QueueSize => 0,
            Self::BackpressureActive => 1,
            Self::DeadLetterQueueSize => 2,
            Self::ActiveSessions => 3,
            Self::RegisteredHandlers => 4,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::QueueSize => "queue_size",
            Self::BackpressureActive => "backpressure_active",
            Self::DeadLetterQueueSize => "dead_letter_queue_size",
            Self::ActiveSessions => "active_sessions",
            Self::RegisteredHandlers => "registered_handlers",
        }
    }
}

/// Centralized metrics collection for the bus.
///
/// Updates are non-blocking and O(1). See [`MetricsCollector::snapshot`]
/// for the read side.
#[derive(Debug)]
pub struct MetricsCollector {
    counters: [AtomicU64; Counter::COUNT],
    gauges: [AtomicI64; Gauge::COUNT],
    breaker_states: RwLock<HashMap<String, u8>>,
    command_durations: RwLock<HashMap<String, Arc<Mutex<Vec<f64>>>>>,
    event_durations: RwLock<HashMap<String, Arc<Mutex<Vec<f64>>>>>,
}

impl MetricsCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
            gauges: std::array::from_fn(|_| AtomicI64::new(0)),
            breaker_states: RwLock::new(HashMap::new()),
            command_durations: RwLock::new(HashMap::new()),
            event_durations: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn inc_counter(&self, counter: Counter) {
        self.counters[counter.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_counter_by(&self, counter: Counter, delta: u64) {
        self.counters[counter.index()].fetch_add(delta, Ordering::Relaxed);
    }

    pub(crate) fn counter(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    pub(crate) fn set_gauge(&self, gauge: Gauge, value: i64) {
        self.gauges[gauge.index()].store(value, Ordering::Relaxed);
    }

    pub(crate) fn gauge(&self, gauge: Gauge) -> i64 {
        self.gauges[gauge.index()].load(Ordering::Relaxed)
    }

    /// Records a circuit breaker state (0=closed, 1=open, 2=half-open).
    pub(crate) fn set_breaker_state(&self, breaker: &str, state: u8) {
        self.breaker_states
            .write()
            .insert(breaker.to_string(), state);
    }

    /// Records a command handler invocation duration, labeled by command
    /// type.
    pub(crate) fn observe_command_duration(&self, command_type: &str, duration: Duration) {
        Self::observe(&self.command_durations, command_type, duration);
    }

    /// Records an event handler invocation duration, labeled by handler
    /// identity.
    pub(crate) fn observe_event_duration(&self, handler_type: &str, duration: Duration) {
        Self::observe(&self.event_durations, handler_type, duration);
    }

    fn observe(
        family: &RwLock<HashMap<String, Arc<Mutex<Vec<f64>>>>>,
        label: &str,
        duration: Duration,
    ) {
        let series = {
            let read = family.read();
            read.get(label).cloned()
        };
        let series = match series {
            Some(series) => series,
            None => family
                .write()
                .entry(label.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
                .clone(),
        };
        series.lock().push(duration.as_secs_f64());
    }

    /// Returns a deep-copied, immutable view of every metric.
    ///
    /// Percentiles (p50/p95/p99) are interpolated linearly from the
    /// sorted samples at snapshot time; the hot path never sorts.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = Counter::ALL
            .iter()
            .map(|c| (c.name().to_string(), self.counter(*c)))
            .collect();
        let gauges = Gauge::ALL
            .iter()
            .map(|g| (g.name().to_string(), self.gauge(*g)))
            .collect();
        let circuit_breakers = self
            .breaker_states
            .read()
            .iter()
            .map(|(name, state)| (name.clone(), *state))
            .collect();

        MetricsSnapshot {
            counters,
            gauges,
            circuit_breakers,
            command_durations: Self::snapshot_family(&self.command_durations),
            event_durations: Self::snapshot_family(&self.event_durations),
        }
    }

    fn snapshot_family(
        family: &RwLock<HashMap<String, Arc<Mutex<Vec<f64>>>>>,
    ) -> BTreeMap<String, HistogramSnapshot> {
        family
            .read()
            .iter()
            .map(|(label, series)| {
                let values = series.lock().clone();
                (label.clone(), HistogramSnapshot::from_values(&values))
            })
            .collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep-copied view of all metrics at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Counter name to value.
    pub counters: BTreeMap<String, u64>,
    /// Gauge name to value.
    pub gauges: BTreeMap<String, i64>,
    /// Breaker identity to state (0=closed, 1=open, 2=half-open).
    pub circuit_breakers: BTreeMap<String, u8>,
    /// `command_processing_duration_seconds`, labeled by command type.
    pub command_durations: BTreeMap<String, HistogramSnapshot>,
    /// `event_processing_duration_seconds`, labeled by handler identity.
    pub event_durations: BTreeMap<String, HistogramSnapshot>,
}

impl MetricsSnapshot {
    /// Convenience counter lookup; missing names read as 0.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Convenience gauge lookup; missing names read as 0.
    #[must_use]
    pub fn gauge(&self, name: &str) -> i64 {
        self.gauges.get(name).copied().unwrap_or(0)
    }
}

/// Immutable summary of one duration series.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    /// Number of samples.
    pub count: usize,
    /// Sum of samples, in seconds.
    pub sum: f64,
    /// Interpolated 50th percentile.
    pub p50: Option<f64>,
    /// Interpolated 95th percentile.
    pub p95: Option<f64>,
    /// Interpolated 99th percentile.
    pub p99: Option<f64>,
    /// Sample count per bucket (first bucket whose bound fits).
    pub buckets: Vec<BucketCount>,
    /// Samples above the largest bucket bound.
    pub overflow: u64,
}

/// One histogram bucket.
#[derive(Debug, Clone, Serialize)]
pub struct BucketCount {
    /// Upper bound, in seconds.
    pub le: f64,
    /// Samples whose first fitting bucket this is.
    pub count: u64,
}

impl HistogramSnapshot {
    fn from_values(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut buckets: Vec<BucketCount> = DURATION_BUCKETS
            .iter()
            .map(|le| BucketCount { le: *le, count: 0 })
            .collect();
        let mut overflow = 0;
        for value in values {
            match buckets.iter_mut().find(|b| *value <= b.le) {
                Some(bucket) => bucket.count += 1,
                None => overflow += 1,
            }
        }

        Self {
            count: values.len(),
            sum: values.iter().sum(),
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            buckets,
            overflow,
        }
    }
}

/// Linear-interpolation percentile over pre-sorted samples.
fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    if n == 1 {
        return Some(sorted[0]);
    }

    let pos = (n - 1) as f64 * p / 100.0;
    let lower = pos.floor() as usize;
    let upper = (lower + 1).min(n - 1);
    if lower == upper {
        return Some(sorted[lower]);
    }

    let fraction = pos - lower as f64;
    Some(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}
