//! Per-handler circuit breaker.
//!
//! State machine: `Closed -> Open -> HalfOpen -> Closed`.
//!
//! - **Closed**: calls pass; `failure_threshold` *consecutive* failures
//!   open the breaker.
//! - **Open**: calls are rejected immediately; after `recovery_timeout`
//!   the next acquisition transitions to half-open.
//! - **HalfOpen**: one probe is admitted at a time;
//!   `success_threshold` consecutive successes close the breaker, any
//!   failure reopens it.
//!
//! Transitions are atomic under a per-breaker lock and mirrored into the
//! `circuit_breaker_state` gauge (0=closed, 1=open, 2=half-open).

use crate::config::CircuitBreakerConfig;
use crate::metrics::MetricsCollector;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing; calls are rejected.
    Open,
    /// Probing whether the handler recovered.
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0=closed, 1=open, 2=half-open.
    #[must_use]
    pub fn as_gauge(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

/// Introspection view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStateInfo {
    /// Breaker identity (`<scope>::<command_type>`).
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures while closed.
    pub consecutive_failures: u32,
    /// Consecutive successes while half-open.
    pub half_open_successes: u32,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    probe_in_flight: bool,
    opened_at: Option<Instant>,
}

/// Circuit breaker for a single handler identity.
#[derive(Debug)]
pub(crate) struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    metrics: Arc<MetricsCollector>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let name = name.into();
        metrics.set_breaker_state(&name, CircuitState::Closed.as_gauge());
        Self {
            name,
            config,
            metrics,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                probe_in_flight: false,
                opened_at: None,
            }),
        }
    }

    /// Asks permission to invoke the handler.
    ///
    /// Returns `false` while open (before the recovery timeout) and while
    /// a half-open probe is already in flight.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let recovered = inner
                    .opened_at
                    .map_or(false, |at| at.elapsed() >= self.config.recovery_timeout());
                if recovered {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.probe_in_flight = true;
                    self.metrics
                        .set_breaker_state(&self.name, CircuitState::HalfOpen.as_gauge());
                    info!(breaker = %self.name, "circuit breaker half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful invocation.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.half_open_successes += 1;
                debug!(
                    breaker = %self.name,
                    successes = inner.half_open_successes,
                    needed = self.config.success_threshold,
                    "half-open probe succeeded"
                );
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.opened_at = None;
                    self.metrics
                        .set_breaker_state(&self.name, CircuitState::Closed.as_gauge());
                    info!(breaker = %self.name, "circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed invocation.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    Self::open(&mut inner, &self.name, &self.metrics);
                }
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                Self::open(&mut inner, &self.name, &self.metrics);
            }
            CircuitState::Open => {}
        }
    }

    fn open(inner: &mut BreakerInner, name: &str, metrics: &MetricsCollector) {
        inner.state = CircuitState::Open;
        inner.half_open_successes = 0;
        inner.opened_at = Some(Instant::now());
        metrics.set_breaker_state(name, CircuitState::Open.as_gauge());
        warn!(breaker = %name, "circuit breaker opened");
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Introspection snapshot.
    pub fn info(&self) -> BreakerStateInfo {
        let inner = self.inner.lock();
        BreakerStateInfo {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
        }
    }
}
