//! A single supervised ingestion worker
//!
//! Each worker runs a fetch-process-retry cycle until its cancellation token
//! fires. Cancellation is observed at every sleep and between tasks; a
//! processor call already in progress is allowed to finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collaborators::IngestTask;
use crate::engine::{ControllerCore, ProcessOutcome};

/// Dead-letter reason when a task fails every attempt
pub const MAX_RETRIES_REASON: &str = "Max retries exceeded";
/// Dead-letter reason when the process-wide retry budget is spent
pub const BUDGET_EXHAUSTED_REASON: &str = "Retry budget exhausted";

/// Per-worker counters
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub tasks_succeeded: AtomicU64,
    pub tasks_dead_lettered: AtomicU64,
}

impl WorkerStats {
    pub fn succeeded(&self) -> u64 {
        self.tasks_succeeded.load(Ordering::Relaxed)
    }

    pub fn dead_lettered(&self) -> u64 {
        self.tasks_dead_lettered.load(Ordering::Relaxed)
    }
}

/// How a task left the worker
#[derive(Debug, Clone, PartialEq, Eq)]
enum TaskDisposition {
    Succeeded,
    DeadLettered(&'static str),
    Released,
}

/// Handle to a running worker, owned by the pool
pub(crate) struct Worker {
    id: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a worker whose token is a child of `parent`
    pub(crate) fn spawn(id: String, core: Arc<ControllerCore>, parent: &CancellationToken) -> Self {
        let token = parent.child_token();
        let stats = Arc::new(WorkerStats::default());

        let worker_loop = WorkerLoop {
            id: id.clone(),
            core,
            token: token.clone(),
            stats: Arc::clone(&stats),
        };
        let handle = tokio::spawn(worker_loop.run());

        Self {
            id,
            token,
            handle,
            stats,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Signal the worker and wait for it to exit
    ///
    /// Returns false if the worker had to be aborted after `timeout`.
    pub(crate) async fn stop(self, timeout: Duration) -> bool {
        self.token.cancel();
        let mut handle = self.handle;

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(worker_id = %self.id, "Worker task ended abnormally: {}", e);
                true
            }
            Err(_) => {
                warn!(worker_id = %self.id, ?timeout, "Worker did not stop in time, aborting");
                handle.abort();
                false
            }
        }
    }
}

struct WorkerLoop {
    id: String,
    core: Arc<ControllerCore>,
    token: CancellationToken,
    stats: Arc<WorkerStats>,
}

impl WorkerLoop {
    async fn run(self) {
        info!(worker_id = %self.id, "Worker started");
        let intervals = &self.core.config.intervals;

        loop {
            if self.token.is_cancelled() {
                break;
            }

            let dequeued = self
                .core
                .queue
                .dequeue(&self.id, &self.core.config.accepted_types)
                .await;

            let pause = match dequeued {
                Ok(Some(task)) => {
                    let disposition = self.execute(task).await;
                    self.count(&disposition);
                    None
                }
                Ok(None) => Some(intervals.poll),
                Err(e) => {
                    error!(worker_id = %self.id, "Dequeue failed: {}", e);
                    Some(intervals.error_backoff)
                }
            };

            if let Some(delay) = pause {
                if self.sleep(delay).await {
                    break;
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Run a task through bounded retries
    async fn execute(&self, task: IngestTask) -> TaskDisposition {
        let policy = &self.core.config.retry;
        let mut attempt: u32 = 1;

        loop {
            match self.core.process_task(&task, &self.id).await {
                ProcessOutcome::Succeeded => {
                    debug!(worker_id = %self.id, task_id = %task.id, attempt, "Task succeeded");
                    return TaskDisposition::Succeeded;
                }
                ProcessOutcome::RateLimited => {
                    if self.sleep(self.core.config.intervals.admission_backoff).await {
                        return self.release(&task).await;
                    }
                }
                ProcessOutcome::Failed(reason) => {
                    warn!(
                        worker_id = %self.id,
                        task_id = %task.id,
                        attempt,
                        max_attempts = policy.max_attempts,
                        reason = %reason,
                        "Task attempt failed"
                    );

                    if !policy.has_attempts_remaining(attempt) {
                        return self.dead_letter(&task, MAX_RETRIES_REASON).await;
                    }
                    if !self.core.retry_budget.try_spend() {
                        return self.dead_letter(&task, BUDGET_EXHAUSTED_REASON).await;
                    }
                    self.core.record_retry();

                    if self.sleep(policy.delay_after_attempt(attempt)).await {
                        return self.release(&task).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Hand the task to the dead-letter sink, retrying until it is accepted
    ///
    /// A worker cancelled while the sink is down releases the task instead.
    async fn dead_letter(&self, task: &IngestTask, reason: &'static str) -> TaskDisposition {
        loop {
            match self.core.queue.move_to_dead_letter(task, reason).await {
                Ok(()) => return TaskDisposition::DeadLettered(reason),
                Err(e) => {
                    error!(
                        worker_id = %self.id,
                        task_id = %task.id,
                        reason,
                        "Dead-letter hand-off failed, retrying: {}",
                        e
                    );
                    if self.sleep(self.core.config.intervals.error_backoff).await {
                        return self.release(task).await;
                    }
                }
            }
        }
    }

    async fn release(&self, task: &IngestTask) -> TaskDisposition {
        debug!(worker_id = %self.id, task_id = %task.id, "Releasing task on shutdown");
        if let Err(e) = self.core.queue.release(task.id, &self.id).await {
            warn!(worker_id = %self.id, task_id = %task.id, "Failed to release task: {}", e);
        }
        TaskDisposition::Released
    }

    fn count(&self, disposition: &TaskDisposition) {
        match disposition {
            TaskDisposition::Succeeded => {
                self.stats.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
            }
            TaskDisposition::DeadLettered(_) => {
                self.stats.tasks_dead_lettered.fetch_add(1, Ordering::Relaxed);
            }
            TaskDisposition::Released => {}
        }
    }

    /// Sleep unless cancelled; returns true on cancellation
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}
