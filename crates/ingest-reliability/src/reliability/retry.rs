//! Retry policy implementation

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::duration_millis;

/// Configuration for per-task retries inside the worker loop
///
/// The default reproduces the classic ingestion schedule: three attempts,
/// sleeping `2^attempt` seconds after each failed attempt.
///
/// # Example
///
/// ```
/// use ingest_reliability::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
///
/// // After attempt 1 fails, wait 2 seconds
/// assert_eq!(policy.delay_after_attempt(1), Duration::from_secs(2));
/// // After attempt 2 fails, wait 4 seconds
/// assert_eq!(policy.delay_after_attempt(2), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Maximum delay between attempts
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier (e.g., 2.0 for exponential)
    pub backoff_coefficient: f64,

    /// Jitter factor (0.0-1.0) to add randomness
    ///
    /// A value of 0.1 means ±10% randomness.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Exponential backoff: 3 attempts, 2s then 4s, capped at 60s, no jitter
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(60),
            backoff_coefficient: 2.0,
            jitter: 0.0,
        }
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    /// Create a policy with fixed intervals (no backoff)
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    /// Set the maximum number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the maximum retry interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the jitter factor (0.0-1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay to sleep after the given (1-based) attempt failed
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_interval.as_secs_f64()
            * self.backoff_coefficient.powi(attempt as i32 - 1);
        // f64::min drops NaN; negative products clamp to zero
        let max = self.max_interval.as_secs_f64();
        let capped = match base.min(max) {
            d if d.is_finite() && d >= 0.0 => d,
            d if d < 0.0 => 0.0,
            _ => max,
        };

        let jitter = self.jitter.clamp(0.0, 1.0);
        let jittered = if jitter > 0.0 && capped > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter_range = capped * jitter;
            let jitter_offset = rng.gen_range(-jitter_range..jitter_range);
            (capped + jitter_offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }

    /// Check if there are remaining attempts
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_defaults() {
        let policy = RetryPolicy::exponential();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_interval, Duration::from_secs(2));
        assert_eq!(policy.backoff_coefficient, 2.0);
        assert_eq!(policy.jitter, 0.0);
    }

    #[test]
    fn test_power_of_two_schedule() {
        let policy = RetryPolicy::exponential();

        assert_eq!(policy.delay_after_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_after_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.has_attempts_remaining(1));
    }

    #[test]
    fn test_fixed_interval() {
        let policy = RetryPolicy::fixed(Duration::from_millis(5), 4);
        assert_eq!(policy.delay_after_attempt(1), Duration::from_millis(5));
        assert_eq!(policy.delay_after_attempt(3), Duration::from_millis(5));
    }

    #[test]
    fn test_max_interval_cap() {
        let policy = RetryPolicy::exponential().with_max_interval(Duration::from_secs(5));
        assert_eq!(policy.delay_after_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_bad_coefficient_never_panics() {
        let negative = RetryPolicy {
            backoff_coefficient: -2.0,
            ..RetryPolicy::exponential()
        };
        // -2s after attempt 2 clamps to zero
        assert_eq!(negative.delay_after_attempt(2), Duration::ZERO);
        assert_eq!(negative.delay_after_attempt(3), Duration::from_secs(8));

        let nan = RetryPolicy {
            backoff_coefficient: f64::NAN,
            ..RetryPolicy::exponential()
        };
        assert_eq!(nan.delay_after_attempt(2), Duration::from_secs(60));

        let huge = RetryPolicy {
            backoff_coefficient: f64::MAX,
            ..RetryPolicy::exponential()
        };
        assert_eq!(huge.delay_after_attempt(5), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::exponential().with_jitter(0.5);
        for _ in 0..50 {
            let delay = policy.delay_after_attempt(1).as_secs_f64();
            assert!((1.0..=3.0).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_has_attempts_remaining() {
        let policy = RetryPolicy::exponential();
        assert!(policy.has_attempts_remaining(1));
        assert!(policy.has_attempts_remaining(2));
        assert!(!policy.has_attempts_remaining(3));
    }

    #[test]
    fn test_serialization() {
        let policy = RetryPolicy::exponential().with_max_attempts(5);
        let json = serde_json::to_string(&policy).unwrap();
        let parsed: RetryPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, parsed);
    }
}
