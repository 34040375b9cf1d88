//! Engine facade: the operations the HTTP layer calls.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::callback::{CallbackError, CallbackNotifier, HttpCallbackNotifier};
use crate::config::{Config, PublishMode};
use crate::context::EngineContext;
use crate::job::{
    Job, JobError, JobRegistry, JobRequest, JobSummary, RawJobRequest, RequestError,
    StorageLayout, TaskRequest, TaskSummary, VideoSource,
};
use crate::media::{FfmpegTool, MediaError, MediaListing, MediaTool};
use crate::pool::{PoolError, PoolStatus, WorkerPool};
use crate::reaper::Reaper;
use crate::stats::{EngineStats, StatsSnapshot};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job {0} still has work in progress")]
    JobBusy(String),

    #[error("job {0} no longer accepts work")]
    JobClosed(String),

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("media tool error: {0}")]
    Media(#[from] MediaError),

    #[error("callback client error: {0}")]
    Callback(#[from] CallbackError),
}

impl From<JobError> for EngineError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Closed(id) | JobError::NoSource(id) | JobError::SourceExists(id) => {
                EngineError::JobClosed(id)
            }
            JobError::Busy(id) => EngineError::JobBusy(id),
            JobError::Pool(e) => EngineError::Pool(e),
            JobError::Io(e) => EngineError::Io(e),
        }
    }
}

/// Outcome of a submission.
#[derive(Debug, Clone)]
pub enum Submission {
    /// A task was added to the job.
    Task { job: JobSummary, task: TaskSummary },
    /// The request only flagged the job complete.
    Completed(JobSummary),
}

pub struct TranscodeEngine {
    config: Config,
    ctx: Arc<EngineContext>,
    registry: Arc<JobRegistry>,
    /// Serializes the lookup-or-register step of submissions. Staging the
    /// source happens after it is released.
    admission: Mutex<()>,
}

impl TranscodeEngine {
    pub fn new(
        config: Config,
        media: Arc<dyn MediaTool>,
        notifier: Arc<dyn CallbackNotifier>,
    ) -> Self {
        let pool = Arc::new(WorkerPool::from_config(&config.engine));
        let ctx = Arc::new(EngineContext {
            layout: StorageLayout::new(config.storage.clone()),
            media,
            notifier,
            pool,
            stats: Arc::new(EngineStats::default()),
            http: reqwest::Client::new(),
            expiry: config.reaper.clone(),
        });

        info!(
            max_tasks = config.engine.max_tasks,
            working_dir = %config.storage.working_dir.display(),
            mode = ?config.storage.mode,
            "Transcode engine ready"
        );

        Self {
            config,
            ctx,
            registry: Arc::new(JobRegistry::new()),
            admission: Mutex::new(()),
        }
    }

    /// Builds an engine around the real encoder and an HTTP callback client.
    pub fn from_config(config: Config) -> Result<Self, EngineError> {
        let media: Arc<dyn MediaTool> = Arc::new(FfmpegTool::new(config.media.clone()));
        let notifier: Arc<dyn CallbackNotifier> =
            Arc::new(HttpCallbackNotifier::new(&config.callback)?);
        Ok(Self::new(config, media, notifier))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// A reaper sweeping this engine's registry.
    pub fn reaper(&self) -> Reaper {
        Reaper::new(
            self.config.reaper.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.ctx.stats),
        )
    }

    /// Validates and applies a submission.
    ///
    /// A staged upload that ends up unused is deleted.
    pub async fn submit(&self, raw: RawJobRequest) -> Result<Submission, EngineError> {
        let upload = raw.upload.clone();
        let request = match raw.validate() {
            Ok(request) => request,
            Err(e) => {
                if let Some(path) = upload {
                    discard_upload(&VideoSource::Staged { path }).await;
                }
                return Err(e.into());
            }
        };

        match request {
            JobRequest::Complete { job_id } => {
                self.complete_job(&job_id).await.map(Submission::Completed)
            }
            JobRequest::Task(task) => self.submit_task(task).await,
        }
    }

    async fn submit_task(&self, task: TaskRequest) -> Result<Submission, EngineError> {
        let layout = &self.ctx.layout;

        let (job, replaced) = {
            let admission = self.admission.lock().await;
            match self.registry.get(&task.job_id).await {
                Some(existing)
                    if !(existing.is_complete()
                        && (existing.can_expire() || existing.is_failed())) =>
                {
                    drop(admission);
                    discard_upload(&task.source).await;
                    // A job still staging its source is not ready for tasks.
                    existing.wait_started().await;
                    let result = existing.add_task(&task)?;
                    return Ok(Submission::Task {
                        job: existing.summary(),
                        task: result.summary(layout),
                    });
                }
                _ => {
                    let job = Job::new(&task.job_id, Arc::clone(&self.ctx));
                    let replaced = self.registry.replace(Arc::clone(&job)).await;
                    (job, replaced)
                }
            }
        };
        self.ctx.stats.job_submitted();

        // The replaced job shares the working directory, so it goes first.
        if let Some(previous) = replaced {
            info!(job_id = %task.job_id, "Replacing finished job");
            if let Err(e) = previous.clean_up().await {
                debug!(job_id = %task.job_id, error = %e, "Previous job not cleaned");
            }
        }

        match job.start(&task).await {
            Ok(result) => {
                info!(job_id = %task.job_id, task_id = %task.task_id, "Job created");
                Ok(Submission::Task {
                    job: job.summary(),
                    task: result.summary(layout),
                })
            }
            Err(e) => {
                warn!(job_id = %task.job_id, error = %e, "Job could not be started");
                if job.download().is_none() {
                    let registered = self.registry.get(&task.job_id).await;
                    if registered.is_some_and(|r| Arc::ptr_eq(&r, &job)) {
                        self.registry.remove(&task.job_id).await;
                    }
                    discard_upload(&task.source).await;
                }
                Err(e.into())
            }
        }
    }

    async fn require(&self, job_id: &str) -> Result<Arc<Job>, EngineError> {
        self.registry
            .get(job_id)
            .await
            .ok_or_else(|| EngineError::NotFound(job_id.to_string()))
    }

    /// Flags a job complete.
    pub async fn complete_job(&self, job_id: &str) -> Result<JobSummary, EngineError> {
        let job = self.require(job_id).await?;
        job.mark_complete();
        Ok(job.summary())
    }

    pub async fn job(&self, job_id: &str) -> Result<JobSummary, EngineError> {
        Ok(self.require(job_id).await?.summary())
    }

    pub async fn jobs(&self) -> Vec<JobSummary> {
        self.registry
            .list()
            .await
            .iter()
            .map(|job| job.summary())
            .collect()
    }

    /// Cleans up a job, drops it from the registry and removes its public files.
    pub async fn delete_job(&self, job_id: &str) -> Result<JobSummary, EngineError> {
        let job = self.require(job_id).await?;
        job.clean_up().await?;
        self.registry.remove(job_id).await;

        let layout = &self.ctx.layout;
        if layout.mode() == PublishMode::Move {
            for dir in [layout.public_video_dir(job_id), layout.public_thumb_dir(job_id)] {
                match tokio::fs::remove_dir_all(&dir).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(job_id = %job_id, dir = %dir.display(), error = %e, "Failed to remove public files"),
                }
            }
        }

        info!(job_id = %job_id, "Job deleted");
        Ok(job.summary())
    }

    /// Adaptive master playlist of a job.
    pub async fn playlist(&self, job_id: &str) -> Result<String, EngineError> {
        Ok(self.require(job_id).await?.adaptive_playlist())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.ctx.pool.status()
    }

    pub async fn job_count(&self) -> usize {
        self.registry.len().await
    }

    /// Raw capability listing from the encoder.
    pub async fn media_info(&self, listing: MediaListing) -> Result<String, EngineError> {
        let output = self.ctx.media.exec(&listing.args(), None).await?;
        Ok(output.output)
    }

    /// Stops intake and waits for running stages within the configured timeout.
    pub async fn shutdown(&self) -> bool {
        self.ctx
            .pool
            .shutdown(self.config.engine.shutdown_timeout())
            .await
    }
}

async fn discard_upload(source: &VideoSource) {
    if let VideoSource::Staged { path } = source {
        if let Err(e) = tokio::fs::remove_file(path).await {
            debug!(path = %path.display(), error = %e, "Could not discard upload");
        }
    }
}
