//! Concurrent map of live jobs keyed by job id.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::model::Job;

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, job_id: &str) -> Option<Arc<Job>> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Registers `job`, returning whatever it displaced.
    pub async fn replace(&self, job: Arc<Job>) -> Option<Arc<Job>> {
        self.jobs.write().await.insert(job.id().to_string(), job)
    }

    pub async fn remove(&self, job_id: &str) -> Option<Arc<Job>> {
        self.jobs.write().await.remove(job_id)
    }

    /// Snapshot of every job, oldest first.
    pub async fn list(&self) -> Vec<Arc<Job>> {
        let mut jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at());
        jobs
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}
