//! Worker pool for task execution
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                             │
//! │   add_workers(n) ──► spawn      remove_workers(n) ──► LIFO   │
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────┐       ┌──────────────┐  │
//! │  │ ingest-w-1   │  │ ingest-w-2   │  ...  │ ingest-w-N   │  │
//! │  └──────┬───────┘  └──────┬───────┘       └──────┬───────┘  │
//! └─────────┼─────────────────┼──────────────────────┼──────────┘
//!           ▼                 ▼                      ▼
//!   dequeue ─► process_task (limiter ─► processor ─► ack) ─► retry
//!                                                    └─► dead-letter
//! ```
//!
//! Each worker holds a child of the controller's cancellation token, so a
//! single `cancel()` reaches every worker while removal can still stop them
//! one at a time.

mod ingest_worker;
mod pool;

pub use ingest_worker::{WorkerStats, BUDGET_EXHAUSTED_REASON, MAX_RETRIES_REASON};
pub(crate) use pool::WorkerPool;
