//! Engine-wide counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Counters owned by one engine instance and handed to the parts that update them.
#[derive(Debug, Default)]
pub struct EngineStats {
    jobs_submitted: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_cleaned: AtomicU64,
    jobs_evicted: AtomicU64,
    tasks_submitted: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_skipped: AtomicU64,
    tasks_running: AtomicI64,
    callbacks_failed: AtomicU64,
}

/// Serializable view of [`EngineStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_failed: u64,
    pub jobs_cleaned: u64,
    pub jobs_evicted: u64,
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_skipped: u64,
    pub tasks_running: i64,
    pub callbacks_failed: u64,
}

impl EngineStats {
    pub fn job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn jobs_cleaned(&self, count: u64) {
        self.jobs_cleaned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn jobs_evicted(&self, count: u64) {
        self.jobs_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn task_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_started(&self) {
        self.tasks_running.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_completed(&self) {
        self.tasks_running.fetch_sub(1, Ordering::Relaxed);
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_failed(&self) {
        self.tasks_running.fetch_sub(1, Ordering::Relaxed);
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_skipped(&self) {
        self.tasks_running.fetch_sub(1, Ordering::Relaxed);
        self.tasks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn callback_failed(&self) {
        self.callbacks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_cleaned: self.jobs_cleaned.load(Ordering::Relaxed),
            jobs_evicted: self.jobs_evicted.load(Ordering::Relaxed),
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_skipped: self.tasks_skipped.load(Ordering::Relaxed),
            tasks_running: self.tasks_running.load(Ordering::Relaxed),
            callbacks_failed: self.callbacks_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_counters_balance_running() {
        let stats = EngineStats::default();
        stats.task_submitted();
        stats.task_submitted();
        stats.task_started();
        stats.task_started();
        stats.task_completed();
        stats.task_skipped();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.tasks_submitted, 2);
        assert_eq!(snapshot.tasks_completed, 1);
        assert_eq!(snapshot.tasks_skipped, 1);
        assert_eq!(snapshot.tasks_running, 0);
    }
}
