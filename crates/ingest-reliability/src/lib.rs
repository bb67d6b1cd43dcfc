//! # Adaptive Ingestion Reliability Controller
//!
//! Supervises a pool of ingestion workers pulling from an external work queue.
//!
//! ## Features
//!
//! - **Admission control**: Token bucket whose ceiling follows system health
//! - **Health-driven rate control**: Queue, memory, CPU and service signals
//!   classified into four levels, each with its own rate adjustment
//! - **Bounded retries**: Exponential backoff per task, dead-lettering after
//!   the last attempt, plus a retry budget shared by every worker
//! - **Predictive scaling**: Trend over recent processing times resizes the
//!   worker pool
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ReliabilityController                       │
//! │   start / stop / status        health · metrics · scaling    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ControllerCore                           │
//! │  (TokenBucketLimiter, TrendScalingEstimator, RetryBudget,   │
//! │   ReliabilityMetrics)                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkerPool                              │
//! │  (dequeue, process, retry, dead-letter)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!      TaskQueue · ResourceMonitor · ServiceHealthMonitor · TaskProcessor
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use ingest_reliability::prelude::*;
//!
//! let controller = ReliabilityController::new(
//!     ControllerConfig::load(),
//!     Collaborators {
//!         queue: Arc::new(InMemoryTaskQueue::default()),
//!         resources: Arc::new(SystemResourceMonitor::new()),
//!         service_health: Arc::new(StaticServiceHealth::healthy()),
//!         processor: Arc::new(MyFeedFetcher::new()),
//!     },
//! );
//!
//! controller.start().await?;
//! println!("{:?}", controller.status());
//! controller.stop().await?;
//! ```

pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod reliability;
pub mod scaling;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::collaborators::{
        InMemoryTaskQueue, IngestTask, ResourceMonitor, ServiceHealthMonitor,
        StaticServiceHealth, SystemResourceMonitor, TaskProcessor, TaskQueue,
    };
    pub use crate::config::{ControllerConfig, HealthThresholds, LoopIntervals};
    pub use crate::engine::{
        Collaborators, ControllerStatus, ProcessOutcome, ReliabilityController,
    };
    pub use crate::error::{CollaboratorError, ControllerError, QueueError};
    pub use crate::reliability::{HealthStatus, RetryPolicy};
}

// Re-export key types at crate root
pub use collaborators::{
    DeadLetter, InMemoryTaskQueue, IngestTask, QueueHealth, QueueStats, ResourceHealth,
    ResourceMonitor, ServiceHealth, ServiceHealthMonitor, StaticServiceHealth,
    SystemResourceMonitor, TaskProcessor, TaskQueue,
};
pub use config::{ControllerConfig, HealthThresholds, LoopIntervals};
pub use engine::{
    Collaborators, ControllerStatus, ProcessOutcome, ReliabilityController, ReliabilityMetrics,
    ScalingDecision,
};
pub use error::{CollaboratorError, ConfigError, ControllerError, QueueError};
pub use reliability::{HealthStatus, HealthTally, RetryBudget, RetryPolicy, TokenBucketLimiter};
pub use scaling::{ProcessingSample, TrendScalingEstimator};
pub use worker::{WorkerStats, BUDGET_EXHAUSTED_REASON, MAX_RETRIES_REASON};
