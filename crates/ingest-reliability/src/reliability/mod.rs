//! Reliability primitives for the ingestion controller
//!
//! This module provides:
//! - [`TokenBucketLimiter`] - Non-blocking admission control with an adjustable ceiling
//! - [`RetryPolicy`] - Per-task retry with exponential backoff
//! - [`RetryBudget`] - Process-wide ceiling on total retries
//! - [`HealthStatus`] - Health classification and the rate control law

mod budget;
mod health;
mod limiter;
mod retry;

pub use budget::RetryBudget;
pub use health::{HealthStatus, HealthTally};
pub use limiter::TokenBucketLimiter;
pub use retry::RetryPolicy;
