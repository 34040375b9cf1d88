//! Types for the pool module.

use serde::{Deserialize, Serialize};

/// Error type for pool operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool no longer accepts work.
    #[error("Worker pool is shut down")]
    ShutDown,

    /// Work was discarded before it ran.
    #[error("Work {0} was dropped before completion")]
    Dropped(u64),
}

/// Status of a processing pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Pool name.
    pub name: String,
    /// Number of active jobs.
    pub active_jobs: usize,
    /// Maximum concurrent jobs.
    pub max_concurrent: usize,
    /// Number of queued jobs.
    pub queued_jobs: usize,
    /// Total jobs processed since startup.
    pub total_processed: u64,
    /// Total jobs that panicked since startup.
    pub total_failed: u64,
    /// Whether new work is accepted.
    pub accepting: bool,
}
