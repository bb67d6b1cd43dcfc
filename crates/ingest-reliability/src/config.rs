//! Controller configuration
//!
//! Loaded once at construction. Every source is optional: a missing file,
//! a malformed file or an unparseable environment variable logs a warning
//! and leaves the documented default in place.
//!
//! Environment variables:
//! - `INGEST_CONFIG_FILE`: path to a JSON config file (read first)
//! - `INGEST_RATE_LIMIT`: initial ceiling in tasks/minute (default: 100)
//! - `INGEST_BURST_SIZE`: token bucket capacity (default: 50)
//! - `INGEST_HISTORY_WINDOW`: processing samples kept for scaling (default: 100)
//! - `INGEST_RETRY_BUDGET`: total retries allowed across all workers (default: 1000)
//! - `INGEST_INITIAL_WORKERS`: workers spawned by `start()` (default: 2)
//! - `INGEST_ACCEPTED_TYPES`: comma-separated task types (default: any)

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::reliability::RetryPolicy;

pub const DEFAULT_RATE: u32 = 100;
pub const DEFAULT_BURST: u32 = 50;
pub const DEFAULT_HISTORY_WINDOW: usize = 100;
pub const DEFAULT_RETRY_BUDGET: u64 = 1000;

/// Top-level controller configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Initial limiter ceiling (tokens per minute)
    pub initial_rate: u32,

    /// Maximum tokens the bucket may hold
    pub burst_size: u32,

    /// Ceiling restored when the system reports healthy
    pub baseline_rate: u32,

    /// Processing samples retained by the scaling estimator
    pub history_window: usize,

    /// Total retries permitted across the whole process
    pub retry_budget: u64,

    /// Workers spawned on start
    pub initial_workers: usize,

    /// Lower bound for predictive scaling
    pub min_workers: usize,

    /// Upper bound for predictive scaling
    pub max_workers: usize,

    /// Task types workers dequeue (empty accepts any type)
    pub accepted_types: Vec<String>,

    /// Per-task retry policy
    pub retry: RetryPolicy,

    /// Loop periods, sleeps and timeouts
    pub intervals: LoopIntervals,

    /// Levels at which a health check counts as critical
    pub thresholds: HealthThresholds,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            initial_rate: DEFAULT_RATE,
            burst_size: DEFAULT_BURST,
            baseline_rate: DEFAULT_RATE,
            history_window: DEFAULT_HISTORY_WINDOW,
            retry_budget: DEFAULT_RETRY_BUDGET,
            initial_workers: 2,
            min_workers: 1,
            max_workers: 20,
            accepted_types: vec![],
            retry: RetryPolicy::default(),
            intervals: LoopIntervals::default(),
            thresholds: HealthThresholds::default(),
        }
    }
}

impl ControllerConfig {
    /// Create a configuration with the documented defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial rate (tokens per minute)
    pub fn with_initial_rate(mut self, rate: u32) -> Self {
        self.initial_rate = rate;
        self
    }

    /// Set the burst size
    pub fn with_burst_size(mut self, burst: u32) -> Self {
        self.burst_size = burst;
        self
    }

    /// Set the healthy baseline rate
    pub fn with_baseline_rate(mut self, rate: u32) -> Self {
        self.baseline_rate = rate;
        self
    }

    /// Set the estimator history window
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window.max(1);
        self
    }

    /// Set the process-wide retry budget
    pub fn with_retry_budget(mut self, budget: u64) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Set the number of workers spawned on start
    pub fn with_initial_workers(mut self, workers: usize) -> Self {
        self.initial_workers = workers;
        self
    }

    /// Set scaling bounds
    pub fn with_worker_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_workers = min.max(1);
        self.max_workers = max.max(self.min_workers);
        self
    }

    /// Set the accepted task types
    pub fn with_accepted_types(mut self, types: Vec<String>) -> Self {
        self.accepted_types = types;
        self
    }

    /// Set the retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set loop intervals
    pub fn with_intervals(mut self, intervals: LoopIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    /// Set health thresholds
    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Load configuration from `INGEST_CONFIG_FILE` and the environment
    ///
    /// Never fails; problems are logged and defaults kept.
    pub fn load() -> Self {
        let base = match std::env::var("INGEST_CONFIG_FILE") {
            Ok(path) if !path.is_empty() => Self::from_file(&path).unwrap_or_else(|e| {
                warn!(path = %path, error = %e, "Config file unusable, using defaults");
                Self::default()
            }),
            _ => Self::default(),
        };
        base.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Create configuration from environment variables over the defaults
    pub fn from_env() -> Self {
        Self::default().apply_overrides(|key| std::env::var(key).ok())
    }

    /// Read a JSON config file; missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.intervals = config.intervals.validated();
        debug!(path = %path.as_ref().display(), "Loaded controller config file");
        Ok(config)
    }

    /// Apply overrides from a key lookup (the environment in production)
    pub(crate) fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "INGEST_RATE_LIMIT", &mut self.initial_rate);
        override_from(&lookup, "INGEST_BURST_SIZE", &mut self.burst_size);
        override_from(&lookup, "INGEST_HISTORY_WINDOW", &mut self.history_window);
        override_from(&lookup, "INGEST_RETRY_BUDGET", &mut self.retry_budget);
        override_from(&lookup, "INGEST_INITIAL_WORKERS", &mut self.initial_workers);

        if let Some(types) = lookup("INGEST_ACCEPTED_TYPES") {
            self.accepted_types = types
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }

        self.history_window = self.history_window.max(1);
        self
    }
}

fn override_from<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(value) = lookup(key) else {
        return;
    };
    match parse_env(key, &value) {
        Ok(parsed) => *slot = parsed,
        Err(e) => warn!(error = %e, "Ignoring config override"),
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Periods of the background loops and the sleeps inside the worker loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopIntervals {
    /// Health check period
    #[serde(with = "duration_millis")]
    pub health_check: Duration,

    /// Metrics refresh period
    #[serde(with = "duration_millis")]
    pub metrics: Duration,

    /// Predictive scaling period
    #[serde(with = "duration_millis")]
    pub scaling: Duration,

    /// Worker sleep when the queue is empty
    #[serde(with = "duration_millis")]
    pub poll: Duration,

    /// Worker sleep after a loop-level error
    #[serde(with = "duration_millis")]
    pub error_backoff: Duration,

    /// Worker sleep after an admission rejection
    #[serde(with = "duration_millis")]
    pub admission_backoff: Duration,

    /// Per-task join timeout on stop
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for LoopIntervals {
    fn default() -> Self {
        Self {
            health_check: Duration::from_secs(30),
            metrics: Duration::from_secs(60),
            scaling: Duration::from_secs(300),
            poll: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            admission_backoff: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl LoopIntervals {
    /// Replace zero periods and sleeps with their defaults
    ///
    /// `shutdown_timeout` may be zero (stop aborts immediately).
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        let slots = [
            ("health_check", &mut self.health_check, defaults.health_check),
            ("metrics", &mut self.metrics, defaults.metrics),
            ("scaling", &mut self.scaling, defaults.scaling),
            ("poll", &mut self.poll, defaults.poll),
            ("error_backoff", &mut self.error_backoff, defaults.error_backoff),
            ("admission_backoff", &mut self.admission_backoff, defaults.admission_backoff),
        ];
        for (name, slot, default) in slots {
            if slot.is_zero() {
                warn!(interval = name, ?default, "Zero interval not allowed, using default");
                *slot = default;
            }
        }
        self
    }
}

/// Levels at which a health signal counts as a critical failure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthThresholds {
    /// Queue depth ratio (0.0-1.0)
    pub queue_depth_ratio: f64,

    /// Memory usage percent
    pub memory_percent: f64,

    /// CPU usage percent
    pub cpu_percent: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            queue_depth_ratio: 0.9,
            memory_percent: 90.0,
            cpu_percent: 90.0,
        }
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_documented_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.initial_rate, 100);
        assert_eq!(config.burst_size, 50);
        assert_eq!(config.history_window, 100);
        assert_eq!(config.retry_budget, 1000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.intervals.health_check, Duration::from_secs(30));
        assert_eq!(config.intervals.metrics, Duration::from_secs(60));
        assert_eq!(config.intervals.scaling, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides_applied() {
        let config = ControllerConfig::default().apply_overrides(lookup(&[
            ("INGEST_RATE_LIMIT", "60"),
            ("INGEST_BURST_SIZE", " 10 "),
            ("INGEST_RETRY_BUDGET", "5"),
            ("INGEST_ACCEPTED_TYPES", "rss, sitemap,,"),
        ]));

        assert_eq!(config.initial_rate, 60);
        assert_eq!(config.burst_size, 10);
        assert_eq!(config.retry_budget, 5);
        assert_eq!(config.accepted_types, vec!["rss", "sitemap"]);
        assert_eq!(config.history_window, 100);
    }

    #[test]
    fn test_invalid_override_keeps_default() {
        let config = ControllerConfig::default().apply_overrides(lookup(&[
            ("INGEST_RATE_LIMIT", "fast"),
            ("INGEST_HISTORY_WINDOW", "-3"),
        ]));

        assert_eq!(config.initial_rate, 100);
        assert_eq!(config.history_window, 100);
    }

    #[test]
    fn test_missing_file_is_an_error_for_from_file() {
        let result = ControllerConfig::from_file("/nonexistent/ingest-reliability.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"initial_rate": 10, "intervals": {"poll": 250}}"#).unwrap();

        assert_eq!(config.initial_rate, 10);
        assert_eq!(config.burst_size, 50);
        assert_eq!(config.intervals.poll, Duration::from_millis(250));
        assert_eq!(config.intervals.scaling, Duration::from_secs(300));
    }

    #[test]
    fn test_zero_intervals_fall_back_to_defaults() {
        let path = std::env::temp_dir()
            .join(format!("ingest-config-{}.json", uuid::Uuid::now_v7()));
        std::fs::write(
            &path,
            r#"{"intervals": {"health_check": 0, "metrics": 0, "scaling": 0, "poll": 0, "shutdown_timeout": 0}}"#,
        )
        .unwrap();

        let config = ControllerConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let defaults = LoopIntervals::default();
        assert_eq!(config.intervals.health_check, defaults.health_check);
        assert_eq!(config.intervals.metrics, defaults.metrics);
        assert_eq!(config.intervals.scaling, defaults.scaling);
        assert_eq!(config.intervals.poll, defaults.poll);
        assert_eq!(config.intervals.shutdown_timeout, Duration::ZERO);
    }

    #[test]
    fn test_validated_keeps_nonzero_intervals() {
        let intervals = LoopIntervals {
            health_check: Duration::from_millis(20),
            ..LoopIntervals::default()
        };
        assert_eq!(intervals.clone().validated(), intervals);
    }

    #[test]
    fn test_serialization() {
        let config = ControllerConfig::default()
            .with_initial_rate(60)
            .with_accepted_types(vec!["rss".into()]);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ControllerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_worker_bounds_normalised() {
        let config = ControllerConfig::default().with_worker_bounds(0, 0);
        assert_eq!(config.min_workers, 1);
        assert_eq!(config.max_workers, 1);
    }
}
