//! Bus configuration.
//!
//! All types implement [`Default`] with the documented production
//! defaults, serialize to TOML for file storage, and are validated once
//! at bus construction.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Overflow policy for the bounded event queue.
///
/// | Policy | Behavior when full |
/// |--------|--------------------|
/// | `DropOldest` | Evict the head to admit the new event |
/// | `RejectNew` | Reject the new event with `QueueFull` |
/// | `AdaptiveRateLimit` | Reject probabilistically with a global, self-adjusting acceptance rate |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Remove the queue head to make room; the evicted event is counted
    /// as dropped.
    DropOldest,

    /// Reject new admissions while full.
    #[default]
    RejectNew,

    /// Shed load probabilistically: the acceptance rate decreases
    /// multiplicatively (x0.67) on each rejection and recovers (x1.1)
    /// once the queue falls below the low water mark, clamped to
    /// `[0.01, 1.0]`.
    AdaptiveRateLimit,
}

/// Jitter strategy for retry delays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterMode {
    /// Sleep a uniform sample from `[0, computed_delay]`.
    #[default]
    Full,

    /// Sleep the computed delay exactly.
    None,
}

/// Retry behavior for command handlers.
///
/// The computed delay before retry `i` (0-indexed) is
/// `min(initial_delay_s * exponential_base^i, max_delay_s)`; with
/// [`JitterMode::Full`] the actual sleep is sampled uniformly from
/// `[0, computed_delay]`. Retries apply to command handlers only — event
/// handlers are never retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retries after the first attempt (so `max_retries = 3`
    /// allows up to 4 invocations).
    pub max_retries: u32,

    /// Base delay in seconds before the first retry.
    pub initial_delay_s: f64,

    /// Upper bound on the computed delay, in seconds.
    pub max_delay_s: f64,

    /// Exponential growth factor per retry.
    pub exponential_base: f64,

    /// Jitter strategy applied to computed delays.
    pub jitter: JitterMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_s: 0.1,
            max_delay_s: 10.0,
            exponential_base: 2.0,
            jitter: JitterMode::Full,
        }
    }
}

impl RetryConfig {
    /// Computed (pre-jitter) delay before retry `i`, 0-indexed.
    #[must_use]
    pub fn computed_delay(&self, retry_index: u32) -> Duration {
        let secs = self.initial_delay_s * self.exponential_base.powi(retry_index as i32);
        Duration::from_secs_f64(secs.min(self.max_delay_s))
    }
}

/// Circuit breaker behavior, applied per handler identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,

    /// Seconds to stay open before admitting a half-open probe.
    pub recovery_timeout_s: f64,

    /// Consecutive half-open successes before closing.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_s: 60.0,
            success_threshold: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Recovery timeout as a [`Duration`].
    #[must_use]
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.recovery_timeout_s)
    }
}

/// Main bus configuration.
///
/// # Example
///
/// ```
/// use relay_bus::{BusConfig, OverflowPolicy};
///
/// let config = BusConfig::default();
/// assert_eq!(config.event_queue_size, 10_000);
/// assert_eq!(config.overflow_policy, OverflowPolicy::RejectNew);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bounded event queue capacity.
    pub event_queue_size: usize,

    /// Queue fill ratio that activates the backpressure signal.
    pub high_water_mark_ratio: f64,

    /// Queue fill ratio that releases the backpressure signal.
    pub low_water_mark_ratio: f64,

    /// Maximum events drained per dispatch batch.
    pub batch_size: usize,

    /// Milliseconds the dispatch loop waits for the first event of a
    /// batch.
    pub batch_timeout_ms: u64,

    /// Behavior when the queue is full.
    pub overflow_policy: OverflowPolicy,

    /// Bounded capacity of the dead letter queue; the oldest entry is
    /// evicted when full.
    pub dead_letter_queue_capacity: usize,

    /// Command retry behavior.
    pub retry: RetryConfig,

    /// Per-handler circuit breaker behavior.
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            event_queue_size: 10_000,
            high_water_mark_ratio: 0.8,
            low_water_mark_ratio: 0.5,
            batch_size: 100,
            batch_timeout_ms: 100,
            overflow_policy: OverflowPolicy::default(),
            dead_letter_queue_capacity: 1000,
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl BusConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch timeout as a [`Duration`].
    #[must_use]
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Validates invariants between fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if capacities are zero, water marks are
    /// out of order, or the retry base is below 1.0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_queue_size == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "event_queue_size",
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroCapacity { field: "batch_size" });
        }
        if self.dead_letter_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "dead_letter_queue_capacity",
            });
        }
        if !(self.low_water_mark_ratio > 0.0
            && self.low_water_mark_ratio < self.high_water_mark_ratio
            && self.high_water_mark_ratio <= 1.0)
        {
            return Err(ConfigError::InvalidWaterMarks {
                low: self.low_water_mark_ratio,
                high: self.high_water_mark_ratio,
            });
        }
        if self.retry.exponential_base < 1.0 {
            return Err(ConfigError::InvalidExponentialBase(
                self.retry.exponential_base,
            ));
        }
        Ok(())
    }

    /// Serializes to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}
