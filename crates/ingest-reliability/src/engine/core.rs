//! State shared by the controller, its loops and every worker

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::metrics::{ProcessOutcome, ReliabilityMetrics};
use crate::collaborators::{
    IngestTask, ResourceMonitor, ServiceHealthMonitor, TaskProcessor, TaskQueue,
};
use crate::config::ControllerConfig;
use crate::error::QueueError;
use crate::reliability::{HealthStatus, HealthTally, RetryBudget, TokenBucketLimiter};
use crate::scaling::TrendScalingEstimator;

/// The collaborators a controller is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub queue: Arc<dyn TaskQueue>,
    pub resources: Arc<dyn ResourceMonitor>,
    pub service_health: Arc<dyn ServiceHealthMonitor>,
    pub processor: Arc<dyn TaskProcessor>,
}

/// Limiter, estimator, retry budget and metrics behind one handle
///
/// Each piece carries its own lock; none is held across an `.await`.
pub(crate) struct ControllerCore {
    pub(crate) config: ControllerConfig,
    pub(crate) queue: Arc<dyn TaskQueue>,
    resources: Arc<dyn ResourceMonitor>,
    service_health: Arc<dyn ServiceHealthMonitor>,
    processor: Arc<dyn TaskProcessor>,
    pub(crate) limiter: TokenBucketLimiter,
    pub(crate) estimator: TrendScalingEstimator,
    pub(crate) retry_budget: RetryBudget,
    metrics: RwLock<ReliabilityMetrics>,
}

impl ControllerCore {
    pub(crate) fn new(mut config: ControllerConfig, collaborators: Collaborators) -> Self {
        config.intervals = config.intervals.validated();
        let limiter = TokenBucketLimiter::new(config.initial_rate, config.burst_size);
        let estimator = TrendScalingEstimator::new(config.history_window)
            .with_worker_bounds(config.min_workers, config.max_workers);
        let retry_budget = RetryBudget::new(config.retry_budget);

        Self {
            config,
            queue: collaborators.queue,
            resources: collaborators.resources,
            service_health: collaborators.service_health,
            processor: collaborators.processor,
            limiter,
            estimator,
            retry_budget,
            metrics: RwLock::new(ReliabilityMetrics::default()),
        }
    }

    /// Admit, process and report one attempt of a task
    pub(crate) async fn process_task(&self, task: &IngestTask, worker_id: &str) -> ProcessOutcome {
        if !self.limiter.acquire(1) {
            debug!(task_id = %task.id, worker_id, "Task rejected by rate limiter");
            return ProcessOutcome::RateLimited;
        }

        let started = Instant::now();
        let result = self.processor.process(task).await;

        let verdict = match &result {
            Ok(()) => self.queue.complete(task.id, worker_id).await,
            Err(reason) => self.queue.fail(task.id, worker_id, reason).await,
        };
        if let Err(e) = verdict {
            error!(task_id = %task.id, worker_id, "Failed to report task result: {}", e);
        }

        self.estimator.record_sample(started.elapsed().as_secs_f64());
        let avg = self.estimator.average();

        let mut metrics = self.metrics.write();
        metrics.total_processed += 1;
        metrics.avg_processing_time = avg;
        match result {
            Ok(()) => {
                metrics.succeeded += 1;
                ProcessOutcome::Succeeded
            }
            Err(reason) => {
                metrics.failed += 1;
                ProcessOutcome::Failed(reason)
            }
        }
    }

    /// Count a retry against the metrics (budget is spent by the caller)
    pub(crate) fn record_retry(&self) {
        self.metrics.write().retry_count += 1;
    }

    /// Poll the health signals, store the result and re-tune the limiter
    pub(crate) async fn check_system_health(&self) -> HealthStatus {
        let thresholds = &self.config.thresholds;
        let mut tally = HealthTally::default();

        match self.queue.queue_health().await {
            Ok(queue) => {
                tally.check(!queue.healthy || queue.depth_ratio >= thresholds.queue_depth_ratio)
            }
            Err(e) => {
                warn!("Queue health unavailable: {}", e);
                tally.check(true);
            }
        }

        match self.resources.resource_health().await {
            Ok(resources) => {
                tally.check(resources.memory_usage_percent >= thresholds.memory_percent);
                tally.check(resources.cpu_usage_percent >= thresholds.cpu_percent);
            }
            Err(e) => {
                warn!("Resource health unavailable: {}", e);
                tally.check(true);
                tally.check(true);
            }
        }

        match self.service_health.overall_health().await {
            Ok(service) => tally.check(!service.is_healthy()),
            Err(e) => {
                warn!("Service health unavailable: {}", e);
                tally.check(true);
            }
        }

        let status = tally.status();
        let previous = {
            let mut metrics = self.metrics.write();
            let previous = metrics.health_status;
            metrics.health_status = status;
            metrics.last_health_check = Some(Utc::now());
            previous
        };

        if previous != status {
            info!(
                from = %previous,
                to = %status,
                critical = tally.critical_failures,
                checks = tally.total_checks,
                "Health status changed"
            );
        }

        self.adjust_rate_for_health();
        status
    }

    /// Move the limiter ceiling according to the stored health status
    pub(crate) fn adjust_rate_for_health(&self) -> u32 {
        let status = self.metrics.read().health_status;
        let current = self.limiter.ceiling();
        let target = status.target_ceiling(current, self.config.baseline_rate);

        if target != current {
            info!(%status, from = current, to = target, "Adjusting ingestion rate");
            self.limiter.adjust_ceiling(target);
        }
        target
    }

    /// Overwrite counters from the queue's aggregate stats
    pub(crate) async fn collect_metrics(&self) -> Result<(), QueueError> {
        let stats = self.queue.queue_stats().await?;
        let fallback = self.estimator.average();
        self.metrics.write().refresh_from(&stats, fallback);
        debug!(
            total = stats.total_processed,
            failed = stats.failed,
            "Metrics refreshed from queue"
        );
        Ok(())
    }

    pub(crate) fn metrics(&self) -> ReliabilityMetrics {
        self.metrics.read().clone()
    }

    #[cfg(test)]
    pub(crate) fn set_health_status(&self, status: HealthStatus) {
        self.metrics.write().health_status = status;
    }
}
