//! Reliability controller engine
//!
//! The [`ReliabilityController`] owns the shared core (limiter, estimator,
//! retry budget, metrics), the worker pool and three periodic loops:
//!
//! | loop    | default period | action                                   |
//! |---------|----------------|------------------------------------------|
//! | health  | 30s            | poll signals, classify, re-tune limiter  |
//! | metrics | 60s            | overwrite counters from queue stats      |
//! | scaling | 300s           | resize the pool from the load prediction |

mod controller;
mod core;
mod loops;
mod metrics;

pub use self::controller::ReliabilityController;
pub use self::core::Collaborators;
pub(crate) use self::core::ControllerCore;
pub use self::metrics::{ControllerStatus, ProcessOutcome, ReliabilityMetrics, ScalingDecision};
