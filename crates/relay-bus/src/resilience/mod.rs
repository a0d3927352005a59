//! Resilience layer: retry with jitter, circuit breakers, dead letters.
//!
//! Wraps command dispatch only — event handlers are never retried. The
//! pieces compose as:
//!
//! ```text
//! execute ──► breaker.try_acquire ──► handler ──► on_success
//!                  │ rejected              │ error
//!                  ▼                       ▼
//!             CircuitOpen          on_failure + jittered backoff
//!                                          │ retries exhausted
//!                                          ▼
//!                                   dead letter queue
//! ```

mod breaker;
mod dlq;

pub use breaker::{BreakerStateInfo, CircuitState};
pub use dlq::DeadLetterEntry;

pub(crate) use breaker::CircuitBreaker;
pub(crate) use dlq::DeadLetterQueue;

use crate::config::{CircuitBreakerConfig, JitterMode, RetryConfig};
use crate::metrics::MetricsCollector;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Sleep before retry `i` (0-indexed): the computed exponential delay,
/// jittered according to the configured mode.
///
/// With full jitter the sleep is sampled uniformly from
/// `[0, min(initial * base^i, max)]`.
pub(crate) fn retry_delay(config: &RetryConfig, retry_index: u32) -> Duration {
    let computed = config.computed_delay(retry_index);
    match config.jitter {
        JitterMode::None => computed,
        JitterMode::Full => {
            let upper = computed.as_secs_f64();
            if upper <= 0.0 {
                Duration::ZERO
            } else {
                Duration::from_secs_f64(rand::rng().random_range(0.0..=upper))
            }
        }
    }
}

/// Lazily-created circuit breakers, one per handler identity.
pub(crate) struct BreakerSet {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    config: CircuitBreakerConfig,
    metrics: Arc<MetricsCollector>,
}

impl BreakerSet {
    pub fn new(config: CircuitBreakerConfig, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            config,
            metrics,
        }
    }

    /// Returns the breaker for a handler identity, creating it on first
    /// use.
    pub fn breaker_for(&self, identity: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(identity) {
            return breaker.clone();
        }
        self.breakers
            .write()
            .entry(identity.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    identity,
                    self.config.clone(),
                    self.metrics.clone(),
                ))
            })
            .clone()
    }

    /// State info for every breaker created so far.
    pub fn states(&self) -> BTreeMap<String, BreakerStateInfo> {
        self.breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.info()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_is_bounded_by_computed_delay() {
        let config = RetryConfig::default();
        for retry_index in 0..6 {
            let computed = config.computed_delay(retry_index);
            for _ in 0..50 {
                let delay = retry_delay(&config, retry_index);
                assert!(delay <= computed, "jittered delay exceeded computed bound");
            }
        }
    }

    #[test]
    fn no_jitter_returns_exact_delay() {
        let config = RetryConfig {
            jitter: JitterMode::None,
            ..Default::default()
        };
        assert_eq!(retry_delay(&config, 1), config.computed_delay(1));
    }

    #[test]
    fn breaker_set_reuses_instances() {
        let set = BreakerSet::new(
            CircuitBreakerConfig::default(),
            Arc::new(MetricsCollector::new()),
        );
        let a = set.breaker_for("BUS::Ping");
        let b = set.breaker_for("BUS::Ping");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(set.states().len(), 1);
    }
}
