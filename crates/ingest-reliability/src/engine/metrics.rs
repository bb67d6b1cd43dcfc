//! Metrics, status snapshots and per-call outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::QueueStats;
use crate::reliability::HealthStatus;

/// Aggregate reliability counters
///
/// Incremented by `process_task` between metric refreshes, then overwritten
/// wholesale from the queue's own counters on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityMetrics {
    pub total_processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retry_count: u64,
    pub circuit_breaker_trips: u64,
    /// Mean processing time in seconds
    pub avg_processing_time: f64,
    pub health_status: HealthStatus,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl ReliabilityMetrics {
    /// Replace counters with the queue's view
    pub(crate) fn refresh_from(&mut self, stats: &QueueStats, fallback_avg: f64) {
        self.total_processed = stats.total_processed;
        self.succeeded = stats.succeeded;
        self.failed = stats.failed;
        self.retry_count = stats.retry_count;
        self.circuit_breaker_trips = stats.circuit_breaker_trips;
        self.avg_processing_time = if stats.processing_times.is_empty() {
            fallback_avg
        } else {
            stats.processing_times.iter().sum::<f64>() / stats.processing_times.len() as f64
        };
    }

    /// Fraction of processed attempts that succeeded (1.0 when idle)
    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.total_processed as f64
    }
}

/// Immutable snapshot returned by `ReliabilityController::status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub running: bool,
    pub metrics: ReliabilityMetrics,
    /// Current limiter ceiling in tasks per minute
    pub rate_ceiling: u32,
    pub burst_capacity: u32,
    pub worker_count: usize,
    pub retry_budget_remaining: u64,
    pub retry_budget_total: u64,
    pub predicted_load: f64,
}

/// Result of one `process_task` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Admitted and processed successfully
    Succeeded,
    /// Admitted but processing failed; eligible for retry
    Failed(String),
    /// Not admitted by the limiter; try again later, no attempt was spent
    RateLimited,
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// What a scaling pass decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub previous: usize,
    pub target: usize,
}

impl ScalingDecision {
    pub fn changed(&self) -> bool {
        self.previous != self.target
    }
}
