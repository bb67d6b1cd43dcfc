//! In-memory implementation of TaskQueue
//!
//! Suitable for tests and single-process hosts. Processing times are
//! measured from claim (or the previous verdict) to the next verdict.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{IngestTask, QueueHealth, QueueStats, TaskQueue};
use crate::error::QueueError;

/// Processing times retained for stats
const PROCESSING_TIME_WINDOW: usize = 100;

/// Consecutive failures on one worker that count as a breaker trip
const DEFAULT_BREAKER_THRESHOLD: u32 = 5;

/// A task that exhausted its retries
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub task: IngestTask,
    pub reason: String,
    pub dead_at: DateTime<Utc>,
}

struct InFlight {
    task: IngestTask,
    worker_id: String,
    attempt_started: Instant,
    failures: u32,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<IngestTask>,
    in_flight: HashMap<Uuid, InFlight>,
    dead_letters: Vec<DeadLetter>,
    stats: QueueStats,
    consecutive_failures: HashMap<String, u32>,
}

impl QueueState {
    fn record_time(&mut self, seconds: f64) {
        let times = &mut self.stats.processing_times;
        times.push(seconds);
        if times.len() > PROCESSING_TIME_WINDOW {
            let excess = times.len() - PROCESSING_TIME_WINDOW;
            times.drain(..excess);
        }
    }

    fn take_claimed(&mut self, task_id: Uuid, worker_id: &str) -> Result<InFlight, QueueError> {
        match self.in_flight.get(&task_id) {
            Some(entry) if entry.worker_id == worker_id => {}
            _ => return Err(QueueError::TaskNotFound(task_id)),
        }
        self.in_flight
            .remove(&task_id)
            .ok_or(QueueError::TaskNotFound(task_id))
    }
}

/// In-memory implementation of TaskQueue
///
/// # Example
///
/// ```
/// use ingest_reliability::InMemoryTaskQueue;
///
/// let queue = InMemoryTaskQueue::new(1_000);
/// assert_eq!(queue.pending_count(), 0);
/// ```
pub struct InMemoryTaskQueue {
    capacity: usize,
    breaker_threshold: u32,
    available: AtomicBool,
    state: Mutex<QueueState>,
}

impl InMemoryTaskQueue {
    /// Create a queue holding at most `capacity` pending tasks
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            breaker_threshold: DEFAULT_BREAKER_THRESHOLD,
            available: AtomicBool::new(true),
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Set how many consecutive failures on one worker trip its breaker
    pub fn with_breaker_threshold(mut self, threshold: u32) -> Self {
        self.breaker_threshold = threshold.max(1);
        self
    }

    /// Add a task to the back of the queue
    pub fn enqueue(&self, task: IngestTask) -> Result<Uuid, QueueError> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        if state.pending.len() >= self.capacity {
            return Err(QueueError::Backend(format!(
                "queue full ({} pending)",
                self.capacity
            )));
        }
        let id = task.id;
        state.pending.push_back(task);
        Ok(id)
    }

    /// Simulate the backend going away (every call fails) or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.state.lock().dead_letters.len()
    }

    /// Snapshot of dead-lettered tasks
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().dead_letters.clone()
    }

    fn ensure_available(&self) -> Result<(), QueueError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(QueueError::Unavailable("in-memory queue marked unavailable".into()))
        }
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn dequeue(
        &self,
        worker_id: &str,
        accepted_types: &[String],
    ) -> Result<Option<IngestTask>, QueueError> {
        self.ensure_available()?;
        let mut state = self.state.lock();

        let position = state
            .pending
            .iter()
            .position(|t| accepted_types.is_empty() || accepted_types.contains(&t.task_type));
        let Some(task) = position.and_then(|i| state.pending.remove(i)) else {
            return Ok(None);
        };

        state.in_flight.insert(
            task.id,
            InFlight {
                task: task.clone(),
                worker_id: worker_id.to_string(),
                attempt_started: Instant::now(),
                failures: 0,
            },
        );
        debug!(task_id = %task.id, worker_id, "Task claimed");
        Ok(Some(task))
    }

    async fn complete(&self, task_id: Uuid, worker_id: &str) -> Result<(), QueueError> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        let entry = state.take_claimed(task_id, worker_id)?;

        state.stats.total_processed += 1;
        state.stats.succeeded += 1;
        if entry.failures > 0 {
            state.stats.retry_count += 1;
        }
        state.record_time(entry.attempt_started.elapsed().as_secs_f64());
        state.consecutive_failures.remove(worker_id);
        Ok(())
    }

    async fn fail(&self, task_id: Uuid, worker_id: &str, reason: &str) -> Result<(), QueueError> {
        self.ensure_available()?;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let elapsed = match state.in_flight.get_mut(&task_id) {
            Some(entry) if entry.worker_id == worker_id => {
                let elapsed = entry.attempt_started.elapsed().as_secs_f64();
                if entry.failures > 0 {
                    state.stats.retry_count += 1;
                }
                entry.failures += 1;
                entry.attempt_started = Instant::now();
                elapsed
            }
            _ => return Err(QueueError::TaskNotFound(task_id)),
        };

        state.stats.total_processed += 1;
        state.stats.failed += 1;
        state.record_time(elapsed);

        let threshold = self.breaker_threshold;
        let streak = state
            .consecutive_failures
            .entry(worker_id.to_string())
            .or_insert(0);
        *streak += 1;
        if *streak >= threshold {
            *streak = 0;
            state.stats.circuit_breaker_trips += 1;
            warn!(worker_id, threshold, "Worker circuit breaker tripped");
        }

        debug!(%task_id, worker_id, reason, "Task attempt failed");
        Ok(())
    }

    async fn move_to_dead_letter(&self, task: &IngestTask, reason: &str) -> Result<(), QueueError> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        state.in_flight.remove(&task.id);
        state.dead_letters.push(DeadLetter {
            task: task.clone(),
            reason: reason.to_string(),
            dead_at: Utc::now(),
        });
        warn!(task_id = %task.id, reason, "Task moved to dead letter");
        Ok(())
    }

    async fn queue_health(&self) -> Result<QueueHealth, QueueError> {
        self.ensure_available()?;
        let state = self.state.lock();
        let depth_ratio = (state.pending.len() as f64 / self.capacity as f64).min(1.0);
        Ok(QueueHealth {
            depth_ratio,
            healthy: state.pending.len() < self.capacity,
        })
    }

    async fn queue_stats(&self) -> Result<QueueStats, QueueError> {
        self.ensure_available()?;
        Ok(self.state.lock().stats.clone())
    }

    async fn release(&self, task_id: Uuid, worker_id: &str) -> Result<(), QueueError> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        let entry = state.take_claimed(task_id, worker_id)?;
        state.pending.push_front(entry.task);
        debug!(%task_id, worker_id, "Task released back to queue");
        Ok(())
    }
}
