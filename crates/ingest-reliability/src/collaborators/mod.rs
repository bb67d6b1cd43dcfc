//! External collaborator contracts
//!
//! The controller never owns queue storage or health data sources. Hosts
//! inject implementations of these traits:
//! - [`TaskQueue`] - work queue with dead-letter sink and aggregate stats
//! - [`ResourceMonitor`] - memory and CPU usage
//! - [`ServiceHealthMonitor`] - aggregate service health
//! - [`TaskProcessor`] - the ingestion work performed per task
//!
//! Implementations must be thread-safe; every method may be called
//! concurrently from workers and background loops.

mod memory;
mod system;

pub use memory::{DeadLetter, InMemoryTaskQueue};
pub use system::{StaticServiceHealth, SystemResourceMonitor};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CollaboratorError, QueueError};

/// A unit of ingestion work handed out by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestTask {
    pub id: Uuid,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

impl IngestTask {
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_type: task_type.into(),
            payload,
            enqueued_at: Utc::now(),
        }
    }
}

/// Queue pressure signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueHealth {
    /// Pending tasks relative to queue capacity (0.0-1.0)
    pub depth_ratio: f64,
    pub healthy: bool,
}

/// Aggregate counters kept by the queue backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retry_count: u64,
    pub circuit_breaker_trips: u64,
    /// Recent processing times in seconds
    pub processing_times: Vec<f64>,
}

/// Host resource usage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceHealth {
    pub memory_usage_percent: f64,
    pub cpu_usage_percent: f64,
    pub healthy: bool,
}

/// Aggregate service health as reported by the host's monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub overall_health: String,
}

impl ServiceHealth {
    pub fn healthy() -> Self {
        Self {
            overall_health: "healthy".to_string(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.overall_health.eq_ignore_ascii_case("healthy")
    }
}

/// Work queue consumed by the worker pool
#[async_trait]
pub trait TaskQueue: Send + Sync + 'static {
    /// Claim the next task whose type is accepted (empty slice accepts any)
    async fn dequeue(
        &self,
        worker_id: &str,
        accepted_types: &[String],
    ) -> Result<Option<IngestTask>, QueueError>;

    /// Acknowledge a successful attempt
    async fn complete(&self, task_id: Uuid, worker_id: &str) -> Result<(), QueueError>;

    /// Record a failed attempt; the worker keeps the task and decides on retries
    async fn fail(&self, task_id: Uuid, worker_id: &str, reason: &str) -> Result<(), QueueError>;

    /// Park a permanently failed task for manual inspection
    async fn move_to_dead_letter(&self, task: &IngestTask, reason: &str) -> Result<(), QueueError>;

    /// Current queue pressure
    async fn queue_health(&self) -> Result<QueueHealth, QueueError>;

    /// Aggregate counters
    async fn queue_stats(&self) -> Result<QueueStats, QueueError>;

    /// Hand a claimed task back without a verdict (worker shutting down)
    ///
    /// Default is a no-op for backends that redeliver unacknowledged tasks
    /// on their own.
    async fn release(&self, _task_id: Uuid, _worker_id: &str) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Source of memory and CPU readings
#[async_trait]
pub trait ResourceMonitor: Send + Sync + 'static {
    async fn resource_health(&self) -> Result<ResourceHealth, CollaboratorError>;
}

/// Aggregate service-health signal
#[async_trait]
pub trait ServiceHealthMonitor: Send + Sync + 'static {
    async fn overall_health(&self) -> Result<ServiceHealth, CollaboratorError>;
}

/// The ingestion work performed for a task
///
/// An `Err` carries a human-readable reason and makes the attempt eligible
/// for retry.
#[async_trait]
pub trait TaskProcessor: Send + Sync + 'static {
    async fn process(&self, task: &IngestTask) -> Result<(), String>;
}

#[async_trait]
impl<F> TaskProcessor for F
where
    F: Fn(&IngestTask) -> Result<(), String> + Send + Sync + 'static,
{
    async fn process(&self, task: &IngestTask) -> Result<(), String> {
        (self)(task)
    }
}
