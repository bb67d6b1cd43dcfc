//! Resizable pool of ingestion workers
//!
//! Resizes are serialized by one async mutex over the worker list, which is
//! held while removed workers are joined.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::ingest_worker::{Worker, WorkerStats};
use crate::engine::ControllerCore;
use crate::error::ControllerError;

/// Worker pool owned by a controller
pub(crate) struct WorkerPool {
    core: Arc<ControllerCore>,
    /// Parent of every worker token; replaced on each controller start
    shutdown: SyncMutex<CancellationToken>,
    workers: Mutex<Vec<Worker>>,
    worker_count: AtomicUsize,
    next_id: AtomicU64,
}

impl WorkerPool {
    pub(crate) fn new(core: Arc<ControllerCore>) -> Self {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        Self {
            core,
            shutdown: SyncMutex::new(shutdown),
            workers: Mutex::new(Vec::new()),
            worker_count: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach the pool to a fresh run of the controller
    pub(crate) fn attach(&self, shutdown: CancellationToken) {
        *self.shutdown.lock() = shutdown;
    }

    /// Spawn and start `n` workers
    #[instrument(skip(self))]
    pub(crate) async fn add_workers(&self, n: usize) -> Result<(), ControllerError> {
        let parent = self.shutdown.lock().clone();
        if parent.is_cancelled() {
            return Err(ControllerError::NotRunning);
        }

        let mut workers = self.workers.lock().await;
        for _ in 0..n {
            let id = format!("ingest-worker-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
            debug!(worker_id = %id, "Spawning worker");
            workers.push(Worker::spawn(id, Arc::clone(&self.core), &parent));
        }
        self.worker_count.store(workers.len(), Ordering::Release);

        info!(added = n, total = workers.len(), "Workers added");
        Ok(())
    }

    /// Stop the `n` most recently added workers, waiting for each to exit
    #[instrument(skip(self))]
    pub(crate) async fn remove_workers(&self, n: usize) -> usize {
        let timeout = self.core.config.intervals.shutdown_timeout;
        let mut workers = self.workers.lock().await;

        let mut removed = 0;
        while removed < n {
            let Some(worker) = workers.pop() else {
                break;
            };
            debug!(worker_id = %worker.id(), "Stopping worker");
            worker.stop(timeout).await;
            removed += 1;
            self.worker_count.store(workers.len(), Ordering::Release);
        }

        info!(removed, total = workers.len(), "Workers removed");
        removed
    }

    /// Stop every worker (newest first)
    pub(crate) async fn stop_all(&self) -> usize {
        let n = self.len();
        self.remove_workers(n).await
    }

    pub(crate) fn len(&self) -> usize {
        self.worker_count.load(Ordering::Acquire)
    }

    /// Worker ids, oldest first
    pub(crate) async fn worker_ids(&self) -> Vec<String> {
        self.workers
            .lock()
            .await
            .iter()
            .map(|w| w.id().to_string())
            .collect()
    }

    /// Per-worker counters, oldest first
    pub(crate) async fn worker_stats(&self) -> Vec<(String, Arc<WorkerStats>)> {
        self.workers
            .lock()
            .await
            .iter()
            .map(|w| (w.id().to_string(), w.stats()))
            .collect()
    }
}
