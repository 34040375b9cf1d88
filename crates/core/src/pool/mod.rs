//! Bounded worker pool and per-job task sets.

mod task_set;
mod types;
mod worker_pool;

pub use task_set::{TaskFailure, TaskSet, TaskSetListener};
pub use types::{PoolError, PoolStatus};
pub use worker_pool::{Work, WorkHandle, WorkerPool};
