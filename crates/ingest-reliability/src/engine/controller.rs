//! Public controller handle and its lifecycle

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::core::{Collaborators, ControllerCore};
use super::loops::spawn_periodic;
use super::metrics::{ControllerStatus, ProcessOutcome, ReliabilityMetrics, ScalingDecision};
use crate::collaborators::IngestTask;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reliability::{HealthStatus, TokenBucketLimiter};
use crate::scaling::TrendScalingEstimator;
use crate::worker::{WorkerPool, WorkerStats};

/// Handles of one running session
struct RunState {
    shutdown: CancellationToken,
    loops: Vec<(&'static str, JoinHandle<()>)>,
}

/// Supervises the ingestion worker pool
///
/// A controller is created stopped. [`start`](Self::start) spawns the
/// initial workers plus the health, metrics and scaling loops;
/// [`stop`](Self::stop) cancels everything and waits for it to exit. A
/// stopped controller can be started again, with its limiter, estimator,
/// retry budget and metrics carried over.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use ingest_reliability::prelude::*;
///
/// # async fn run() -> Result<(), ControllerError> {
/// let queue = Arc::new(InMemoryTaskQueue::default());
/// let controller = ReliabilityController::new(
///     ControllerConfig::default(),
///     Collaborators {
///         queue: queue.clone(),
///         resources: Arc::new(SystemResourceMonitor::new()),
///         service_health: Arc::new(StaticServiceHealth::healthy()),
///         processor: Arc::new(|_task: &IngestTask| Ok::<(), String>(())),
///     },
/// );
///
/// controller.start().await?;
/// queue.enqueue(IngestTask::new("rss", serde_json::json!({"url": "https://example.com/feed"})))?;
/// // ...
/// controller.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct ReliabilityController {
    core: Arc<ControllerCore>,
    pool: Arc<WorkerPool>,
    run: Mutex<Option<RunState>>,
}

impl ReliabilityController {
    pub fn new(config: ControllerConfig, collaborators: Collaborators) -> Self {
        let core = Arc::new(ControllerCore::new(config, collaborators));
        let pool = Arc::new(WorkerPool::new(Arc::clone(&core)));

        Self {
            core,
            pool,
            run: Mutex::new(None),
        }
    }

    /// Create a controller configured from `INGEST_*` settings
    pub fn from_env(collaborators: Collaborators) -> Self {
        Self::new(ControllerConfig::load(), collaborators)
    }

    /// Spawn the initial workers and the background loops
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), ControllerError> {
        {
            let mut run = self.run.lock();
            if run.is_some() {
                return Err(ControllerError::AlreadyRunning);
            }

            let shutdown = CancellationToken::new();
            self.pool.attach(shutdown.clone());
            let loops = self.spawn_loops(&shutdown);
            *run = Some(RunState { shutdown, loops });
        }

        let initial = self.core.config.initial_workers;
        if let Err(e) = self.pool.add_workers(initial).await {
            error!("Failed to spawn initial workers: {}", e);
            self.stop().await?;
            return Err(e);
        }

        info!(
            workers = initial,
            rate = self.core.limiter.ceiling(),
            burst = self.core.limiter.burst_capacity(),
            "Reliability controller started"
        );
        Ok(())
    }

    /// Cancel the loops and workers and wait for them to exit
    ///
    /// Each loop and worker gets `shutdown_timeout` before it is aborted.
    /// Calling `stop` on a stopped controller is a no-op.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<(), ControllerError> {
        let Some(run) = self.run.lock().take() else {
            debug!("Controller not running, nothing to stop");
            return Ok(());
        };

        info!("Stopping reliability controller");
        run.shutdown.cancel();

        let timeout = self.core.config.intervals.shutdown_timeout;
        for (name, mut handle) in run.loops {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => debug!(loop_name = name, "Loop joined"),
                Ok(Err(e)) => error!(loop_name = name, "Loop ended abnormally: {}", e),
                Err(_) => {
                    warn!(loop_name = name, ?timeout, "Loop did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        let stopped = self.pool.stop_all().await;
        info!(workers = stopped, "Reliability controller stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    /// Admit and process one attempt of `task` on behalf of `worker_id`
    ///
    /// The task must already be claimed by `worker_id` so the verdict can be
    /// reported to the queue. Retries are left to the caller.
    pub async fn process_task(&self, task: &IngestTask, worker_id: &str) -> ProcessOutcome {
        self.core.process_task(task, worker_id).await
    }

    /// Poll every health signal, store the classification and re-tune the
    /// limiter
    pub async fn check_system_health(&self) -> HealthStatus {
        self.core.check_system_health().await
    }

    /// Re-tune the limiter from the last stored health status
    ///
    /// Returns the new ceiling.
    pub fn adjust_rate_for_health(&self) -> u32 {
        self.core.adjust_rate_for_health()
    }

    /// Overwrite the counters from the queue's aggregate stats
    pub async fn collect_metrics(&self) -> Result<(), ControllerError> {
        self.core.collect_metrics().await?;
        Ok(())
    }

    /// Resize the pool to the estimator's recommendation
    pub async fn run_scaling_pass(&self) -> Result<ScalingDecision, ControllerError> {
        scale_pool(&self.core, &self.pool).await
    }

    /// Snapshot of metrics, limiter, pool and retry budget
    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            running: self.is_running(),
            metrics: self.core.metrics(),
            rate_ceiling: self.core.limiter.ceiling(),
            burst_capacity: self.core.limiter.burst_capacity(),
            worker_count: self.pool.len(),
            retry_budget_remaining: self.core.retry_budget.remaining(),
            retry_budget_total: self.core.retry_budget.total(),
            predicted_load: self.core.estimator.predict_load(),
        }
    }

    pub fn metrics(&self) -> ReliabilityMetrics {
        self.core.metrics()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.core.config
    }

    pub fn limiter(&self) -> &TokenBucketLimiter {
        &self.core.limiter
    }

    pub fn estimator(&self) -> &TrendScalingEstimator {
        &self.core.estimator
    }

    pub fn worker_count(&self) -> usize {
        self.pool.len()
    }

    /// Ids of live workers, oldest first
    pub async fn worker_ids(&self) -> Vec<String> {
        self.pool.worker_ids().await
    }

    /// Per-worker counters, oldest first
    pub async fn worker_stats(&self) -> Vec<(String, Arc<WorkerStats>)> {
        self.pool.worker_stats().await
    }

    fn spawn_loops(&self, shutdown: &CancellationToken) -> Vec<(&'static str, JoinHandle<()>)> {
        let intervals = &self.core.config.intervals;

        let core = Arc::clone(&self.core);
        let health = spawn_periodic("health", intervals.health_check, shutdown.clone(), move || {
            let core = Arc::clone(&core);
            async move {
                core.check_system_health().await;
            }
        });

        let core = Arc::clone(&self.core);
        let metrics = spawn_periodic("metrics", intervals.metrics, shutdown.clone(), move || {
            let core = Arc::clone(&core);
            async move {
                if let Err(e) = core.collect_metrics().await {
                    error!("Metrics collection failed: {}", e);
                }
            }
        });

        let core = Arc::clone(&self.core);
        let pool = Arc::clone(&self.pool);
        let scaling = spawn_periodic("scaling", intervals.scaling, shutdown.clone(), move || {
            let core = Arc::clone(&core);
            let pool = Arc::clone(&pool);
            async move {
                if let Err(e) = scale_pool(&core, &pool).await {
                    error!("Scaling pass failed: {}", e);
                }
            }
        });

        vec![("health", health), ("metrics", metrics), ("scaling", scaling)]
    }
}

impl Drop for ReliabilityController {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            run.shutdown.cancel();
        }
    }
}

async fn scale_pool(
    core: &ControllerCore,
    pool: &WorkerPool,
) -> Result<ScalingDecision, ControllerError> {
    let previous = pool.len();
    let target = core.estimator.optimal_worker_count(previous);
    let decision = ScalingDecision { previous, target };

    if !decision.changed() {
        debug!(workers = previous, "Scaling pass: no change");
        return Ok(decision);
    }

    info!(
        predicted_load = core.estimator.predict_load(),
        from = previous,
        to = target,
        "Scaling worker pool"
    );
    if target > previous {
        pool.add_workers(target - previous).await?;
    } else {
        pool.remove_workers(previous - target).await;
    }
    Ok(decision)
}
