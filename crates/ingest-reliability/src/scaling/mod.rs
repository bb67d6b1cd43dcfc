//! Predictive scaling
//!
//! [`TrendScalingEstimator`] keeps a bounded history of task processing
//! times and turns it into a worker-count recommendation.

mod estimator;

pub use estimator::{ProcessingSample, TrendScalingEstimator};
