//! The job record and its state machine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::layout;
use super::manifest::{self, Variant};
use super::request::{TaskRequest, VideoSource};
use super::result::TranscodeResult;
use super::types::{JobStatus, JobSummary, TaskStatus};
use crate::config::PublishMode;
use crate::context::EngineContext;
use crate::metrics;
use crate::pool::{PoolError, TaskSet, TaskSetListener};
use crate::stages::{
    move_file, Download, FirstPass, ReadySignal, StageError, StageOutcome, ThumbnailStage,
    TranscodeStage,
};

/// Errors from job operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job failed or was cleaned up.
    #[error("job {0} no longer accepts work")]
    Closed(String),

    /// A download was added to a job that already has its source.
    #[error("job {0} already has a source video")]
    SourceExists(String),

    /// Cleanup was requested while stages are still running.
    #[error("job {0} still has work in progress")]
    Busy(String),

    /// A first pass or task was added before any source.
    #[error("job {0} has no source video")]
    NoSource(String),

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

struct JobState {
    status: JobStatus,
    failed: bool,
    message: Option<String>,
    tag: Option<String>,
    callback: Option<String>,
    ended_at: Option<DateTime<Utc>>,
    flagged_complete: bool,
    download: Option<Arc<Download>>,
    thumbnails: Option<Arc<ThumbnailStage>>,
    thumbnail_files: Vec<String>,
    passes: HashMap<String, Arc<FirstPass>>,
    results: Vec<Arc<TranscodeResult>>,
}

impl JobState {
    fn thumbnails_done(&self) -> bool {
        self.thumbnails.as_ref().map_or(true, |t| t.is_complete())
    }

    fn closed(&self) -> bool {
        self.failed
    }
}

/// A caller's job: one source, any number of transcode tasks.
///
/// Stages hold only a [`Weak`] reference back to the job. Every mutation
/// of the state goes through a short synchronous lock that is never held
/// across an await.
pub struct Job {
    id: String,
    created_at: DateTime<Utc>,
    working_dir: PathBuf,
    ctx: Arc<EngineContext>,
    tasks: TaskSet<StageOutcome, StageError>,
    state: Mutex<JobState>,
    submitted: AtomicUsize,
    acknowledged: AtomicUsize,
    cleaned: AtomicBool,
    started: ReadySignal,
}

impl Job {
    pub fn new(id: &str, ctx: Arc<EngineContext>) -> Arc<Self> {
        Self::new_at(id, ctx, Utc::now())
    }

    /// Creates a job with an explicit creation time.
    pub fn new_at(id: &str, ctx: Arc<EngineContext>, created_at: DateTime<Utc>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Job>| {
            let listener: Weak<dyn TaskSetListener<StageOutcome, StageError>> = weak.clone();
            Self {
                id: id.to_string(),
                created_at,
                working_dir: ctx.layout.job_dir(id),
                tasks: TaskSet::new(id, Arc::clone(&ctx.pool), listener),
                ctx,
                state: Mutex::new(JobState {
                    status: JobStatus::Created,
                    failed: false,
                    message: None,
                    tag: None,
                    callback: None,
                    ended_at: None,
                    flagged_complete: false,
                    download: None,
                    thumbnails: None,
                    thumbnail_files: Vec::new(),
                    passes: HashMap::new(),
                    results: Vec::new(),
                }),
                submitted: AtomicUsize::new(0),
                acknowledged: AtomicUsize::new(0),
                cleaned: AtomicBool::new(false),
                started: ReadySignal::new(),
            }
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn status(&self) -> JobStatus {
        self.state.lock().status
    }

    pub fn message(&self) -> Option<String> {
        self.state.lock().message.clone()
    }

    pub fn is_failed(&self) -> bool {
        self.state.lock().failed
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned.load(Ordering::SeqCst)
    }

    pub fn submitted_tasks(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn acknowledged_tasks(&self) -> usize {
        self.acknowledged.load(Ordering::SeqCst)
    }

    /// Whether the task set has nothing outstanding.
    pub fn tasks_complete(&self) -> bool {
        self.tasks.is_complete()
    }

    pub fn download(&self) -> Option<Arc<Download>> {
        self.state.lock().download.clone()
    }

    /// First pass registered for a multipass output extension.
    pub fn first_pass(&self, extension: &str) -> Option<Arc<FirstPass>> {
        self.state.lock().passes.get(extension).cloned()
    }

    pub fn results(&self) -> Vec<Arc<TranscodeResult>> {
        self.state.lock().results.clone()
    }

    /// Creates the working directory and stages the source into it.
    async fn prepare_download(self: &Arc<Self>, source: VideoSource) -> Result<Arc<Download>, JobError> {
        if self.is_cleaned() {
            return Err(JobError::Closed(self.id.clone()));
        }
        tokio::fs::create_dir_all(&self.working_dir).await?;

        let download = Arc::new(Download::new(
            Arc::downgrade(self),
            &self.id,
            source,
            &self.working_dir,
        ));
        download.stage().await?;
        Ok(download)
    }

    /// Brings in the source video and schedules its download/probe.
    ///
    /// A job has one source; a second download is refused.
    pub async fn add_download(self: &Arc<Self>, source: VideoSource) -> Result<Arc<Download>, JobError> {
        if self.state.lock().download.is_some() {
            return Err(JobError::SourceExists(self.id.clone()));
        }
        let download = self.prepare_download(source).await?;
        let mut state = self.state.lock();
        self.schedule_download(&mut state, Arc::clone(&download))?;
        Ok(download)
    }

    /// Schedules the download, thumbnails and first task of a fresh job in
    /// one step, so no stage can settle the job half-built.
    ///
    /// Waiters on [`wait_started`](Self::wait_started) are released once
    /// this returns, whatever the outcome.
    pub async fn start(self: &Arc<Self>, request: &TaskRequest) -> Result<Arc<TranscodeResult>, JobError> {
        let scheduled = async {
            let download = self.prepare_download(request.source.clone()).await?;
            let mut state = self.state.lock();
            self.schedule_download(&mut state, download)?;
            self.schedule_thumbnails(&mut state)?;
            self.schedule_task(&mut state, request)
        }
        .await;
        self.started.mark_ready();
        scheduled
    }

    /// Resolves once [`start`](Self::start) has run.
    pub async fn wait_started(&self) {
        self.started.wait().await
    }

    /// Schedules thumbnail extraction. Only the first call has an effect.
    pub fn generate_thumbnails(self: &Arc<Self>) -> Result<(), JobError> {
        let mut state = self.state.lock();
        self.schedule_thumbnails(&mut state)
    }

    /// Registers the analysis pass for `extension`, reusing an existing one.
    pub fn add_first_pass(
        self: &Arc<Self>,
        extension: &str,
        options: &str,
    ) -> Result<Arc<FirstPass>, JobError> {
        let mut state = self.state.lock();
        self.schedule_first_pass(&mut state, extension, options)
    }

    /// Adds one transcode task (and its first pass when multipass).
    pub fn add_task(self: &Arc<Self>, request: &TaskRequest) -> Result<Arc<TranscodeResult>, JobError> {
        let mut state = self.state.lock();
        self.schedule_task(&mut state, request)
    }

    fn ensure_open(&self, state: &JobState) -> Result<(), JobError> {
        if self.is_cleaned() || state.closed() {
            return Err(JobError::Closed(self.id.clone()));
        }
        Ok(())
    }

    fn schedule_download(
        self: &Arc<Self>,
        state: &mut JobState,
        download: Arc<Download>,
    ) -> Result<(), JobError> {
        self.ensure_open(state)?;
        if state.download.is_some() {
            return Err(JobError::SourceExists(self.id.clone()));
        }
        self.tasks.enqueue(
            "download",
            metrics::timed_stage("download", Arc::clone(&download).run()),
        )?;
        debug!(job_id = %self.id, file = %download.destination(), "Download scheduled");
        state.download = Some(download);
        state.status = JobStatus::Downloading;
        Ok(())
    }

    fn schedule_thumbnails(self: &Arc<Self>, state: &mut JobState) -> Result<(), JobError> {
        self.ensure_open(state)?;
        if state.thumbnails.is_some() {
            return Ok(());
        }

        let stage = Arc::new(ThumbnailStage::new(Arc::downgrade(self), &self.id));
        self.tasks.enqueue(
            "thumbnails",
            metrics::timed_stage("thumbnails", Arc::clone(&stage).run()),
        )?;
        state.thumbnails = Some(stage);
        state.status = JobStatus::Working;
        Ok(())
    }

    fn schedule_first_pass(
        self: &Arc<Self>,
        state: &mut JobState,
        extension: &str,
        options: &str,
    ) -> Result<Arc<FirstPass>, JobError> {
        self.ensure_open(state)?;
        if let Some(existing) = state.passes.get(extension) {
            return Ok(Arc::clone(existing));
        }
        let source = state
            .download
            .as_ref()
            .map(|d| d.destination().to_string())
            .ok_or_else(|| JobError::NoSource(self.id.clone()))?;

        let pass = Arc::new(FirstPass::new(
            Arc::downgrade(self),
            &self.id,
            &self.working_dir,
            &source,
            extension,
            options,
        ));
        self.tasks.enqueue(
            format!("first-pass:{}", extension),
            metrics::timed_stage("first_pass", Arc::clone(&pass).run()),
        )?;
        state.passes.insert(extension.to_string(), Arc::clone(&pass));
        state.status = JobStatus::Working;
        Ok(pass)
    }

    fn schedule_task(
        self: &Arc<Self>,
        state: &mut JobState,
        request: &TaskRequest,
    ) -> Result<Arc<TranscodeResult>, JobError> {
        self.ensure_open(state)?;
        if state.download.is_none() {
            return Err(JobError::NoSource(self.id.clone()));
        }

        let pass_extension = match &request.multipass {
            Some(multipass) => {
                self.schedule_first_pass(state, &multipass.extension, &multipass.options)?;
                Some(multipass.extension.clone())
            }
            None => None,
        };

        let result = Arc::new(TranscodeResult::new(
            &self.id,
            &request.task_id,
            &request.extension,
            request.segment.is_some(),
        ));
        let stage = Arc::new(TranscodeStage::new(
            Arc::downgrade(self),
            Arc::clone(&result),
            &request.options,
            pass_extension,
        ));
        self.tasks.enqueue(
            format!("transcode:{}", request.task_id),
            metrics::timed_stage("transcode", stage.run()),
        )?;

        if let Some(tag) = &request.tag {
            state.tag = Some(tag.clone());
        }
        if let Some(callback) = &request.callback {
            state.callback = Some(callback.clone());
        }
        state.results.push(Arc::clone(&result));
        // A completed job reopens; it completes again once this task drains.
        state.status = JobStatus::Working;
        state.ended_at = None;
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.ctx.stats.task_submitted();

        info!(job_id = %self.id, task_id = %request.task_id, "Task submitted");
        Ok(result)
    }

    /// Flags the job complete. The status follows once every stage is done.
    pub fn mark_complete(&self) {
        let mut state = self.state.lock();
        state.flagged_complete = true;
        self.settle(&mut state);
    }

    /// Completes a job stuck in `Waiting`, regardless of callback acknowledgements.
    ///
    /// Returns whether the job moved.
    pub fn force_complete(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != JobStatus::Waiting
            || state.failed
            || !self.tasks.is_complete()
            || !state.thumbnails_done()
        {
            return false;
        }
        state.flagged_complete = true;
        state.status = JobStatus::Complete;
        state.ended_at = Some(Utc::now());
        info!(job_id = %self.id, "Waiting job forced to complete");
        true
    }

    /// Moves to `Complete` when flagged and everything has drained,
    /// otherwise parks a non-terminal job in `Waiting`.
    fn settle(&self, state: &mut JobState) {
        if state.failed || state.status.is_terminal() {
            return;
        }
        if !self.tasks.is_complete() || !state.thumbnails_done() {
            return;
        }

        let acknowledged = state.callback.is_none()
            || self.acknowledged.load(Ordering::SeqCst) >= self.submitted.load(Ordering::SeqCst);
        if state.flagged_complete && acknowledged {
            state.status = JobStatus::Complete;
            state.ended_at = Some(Utc::now());
            info!(job_id = %self.id, "Job complete");
        } else {
            state.status = JobStatus::Waiting;
        }
    }

    /// Cleaned, or flagged complete with every stage drained.
    pub fn is_complete(&self) -> bool {
        if self.is_cleaned() {
            return true;
        }
        let state = self.state.lock();
        state.flagged_complete && self.tasks.is_complete() && state.thumbnails_done()
    }

    /// Old enough to reap, or complete with every callback acknowledged.
    pub fn can_expire(&self) -> bool {
        self.can_expire_at(Utc::now())
    }

    pub fn can_expire_at(&self, now: DateTime<Utc>) -> bool {
        if now - self.created_at > self.ctx.expiry.expire_after() {
            return true;
        }
        self.status() == JobStatus::Complete
            && self.acknowledged.load(Ordering::SeqCst) == self.submitted.load(Ordering::SeqCst)
    }

    /// Deletes the working directory and drops stage references, once.
    ///
    /// Returns `Ok(false)` when already cleaned and [`JobError::Busy`]
    /// while the task set has outstanding work.
    pub async fn clean_up(&self) -> Result<bool, JobError> {
        {
            let mut state = self.state.lock();
            if !self.tasks.is_complete() {
                return Err(JobError::Busy(self.id.clone()));
            }
            if self
                .cleaned
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return Ok(false);
            }
            state.download = None;
            state.thumbnails = None;
            state.passes.clear();
        }

        match tokio::fs::remove_dir_all(&self.working_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(job_id = %self.id, error = %e, "Failed to remove working directory");
            }
        }
        self.ctx.stats.jobs_cleaned(1);
        info!(job_id = %self.id, "Job cleaned up");
        Ok(true)
    }

    /// Marks the job failed, notifies once, and cleans up as soon as no
    /// stage is left running.
    async fn fail(&self, message: String) {
        let first = {
            let mut state = self.state.lock();
            let first = !state.failed;
            if first {
                state.failed = true;
                state.status = JobStatus::Failed;
                state.message = Some(message);
                state.ended_at = Some(Utc::now());
            }
            first
        };

        if first {
            self.ctx.stats.job_failed();
            metrics::JOBS_FAILED.inc();
            self.notify(|job| serde_json::to_value(job.summary())).await;
        }

        match self.clean_up().await {
            Ok(_) => {}
            Err(JobError::Busy(_)) => {
                debug!(job_id = %self.id, "Stages still running, cleanup deferred");
            }
            Err(e) => warn!(job_id = %self.id, error = %e, "Cleanup after failure failed"),
        }
    }

    pub fn summary(&self) -> JobSummary {
        let layout = &self.ctx.layout;
        let state = self.state.lock();
        JobSummary {
            job_id: self.id.clone(),
            status: state.status,
            message: state.message.clone(),
            tag: state.tag.clone(),
            created_at: self.created_at,
            ended_at: state.ended_at,
            failed: state.failed,
            cleaned: self.is_cleaned(),
            is_complete: self.is_cleaned()
                || (state.flagged_complete && self.tasks.is_complete() && state.thumbnails_done()),
            submitted_tasks: self.submitted.load(Ordering::SeqCst),
            acknowledged_tasks: self.acknowledged.load(Ordering::SeqCst),
            tasks: state.results.iter().map(|r| r.summary(layout)).collect(),
            thumbnails: state
                .thumbnail_files
                .iter()
                .map(|f| layout.thumb_url(&self.id, f))
                .collect(),
            adaptive: state
                .results
                .iter()
                .any(|r| r.variant(layout).is_some())
                .then(|| layout.adaptive_url(&self.id)),
        }
    }

    fn variants(&self) -> Vec<Variant> {
        let layout = &self.ctx.layout;
        self.state
            .lock()
            .results
            .iter()
            .filter_map(|r| r.variant(layout))
            .collect()
    }

    /// Master playlist over every completed, segmented task.
    pub fn adaptive_playlist(&self) -> String {
        manifest::adaptive_playlist(&self.variants())
    }

    /// Posts a payload to the callback target, counting the attempt as
    /// acknowledged either way.
    async fn notify<F>(&self, payload: F)
    where
        F: FnOnce(&Self) -> Result<serde_json::Value, serde_json::Error>,
    {
        let callback = self.state.lock().callback.clone();
        let Some(url) = callback else {
            return;
        };

        match payload(self) {
            Ok(payload) => {
                match self.ctx.notifier.notify(&url, &payload).await {
                    Ok(()) => {
                        metrics::CALLBACKS_TOTAL.with_label_values(&["delivered"]).inc();
                    }
                    Err(e) => {
                        warn!(job_id = %self.id, url = %url, error = %e, "Callback delivery failed");
                        metrics::CALLBACKS_TOTAL.with_label_values(&["failed"]).inc();
                        self.ctx.stats.callback_failed();
                    }
                }
            }
            Err(e) => {
                warn!(job_id = %self.id, error = %e, "Callback payload could not be encoded");
                self.ctx.stats.callback_failed();
            }
        }
        self.acknowledged.fetch_add(1, Ordering::SeqCst);
    }

    /// Moves a finished output into the public directory (move mode) and
    /// rewrites the adaptive manifest.
    async fn publish(&self, result: &TranscodeResult) {
        if result.status() != TaskStatus::Complete {
            return;
        }
        let layout = &self.ctx.layout;

        if layout.mode() == PublishMode::Move {
            let public_dir = layout.public_video_dir(&self.id);
            let files = result
                .output_file()
                .into_iter()
                .chain(result.playlist_file())
                .chain(result.segment_files());
            for file in files {
                let from = self.working_dir.join(&file);
                if let Err(e) = move_file(&from, &public_dir.join(&file)).await {
                    warn!(job_id = %self.id, file = %file, error = %e, "Failed to publish output");
                }
            }
        }

        if result.is_segmented() {
            let dir = layout.video_publish_dir(&self.id);
            let contents = self.adaptive_playlist();
            let written = async {
                tokio::fs::create_dir_all(&dir).await?;
                tokio::fs::write(dir.join(layout::ADAPTIVE_MANIFEST), contents).await
            };
            if let Err(e) = written.await {
                warn!(job_id = %self.id, error = %e, "Failed to write adaptive manifest");
            }
        }
    }
}

#[async_trait]
impl TaskSetListener<StageOutcome, StageError> for Job {
    async fn on_result(&self, result: &Result<StageOutcome, StageError>) {
        match result {
            Ok(StageOutcome::Thumbnails { files }) => {
                self.state.lock().thumbnail_files = files.clone();
            }
            Ok(StageOutcome::Transcoded(task)) => {
                self.publish(task).await;
                let layout = &self.ctx.layout;
                self.notify(|_| serde_json::to_value(task.summary(layout)))
                    .await;
            }
            Ok(_) => {}
            Err(e) => debug!(job_id = %self.id, error = %e, "Stage finished with error"),
        }
    }

    async fn on_all_complete(&self, _last: StageOutcome) {
        let failed = {
            let mut state = self.state.lock();
            self.settle(&mut state);
            debug!(job_id = %self.id, status = ?state.status, "Job drained");
            state.failed
        };

        // A failure that landed while later stages were still queued.
        if failed {
            if let Err(e) = self.clean_up().await {
                debug!(job_id = %self.id, error = %e, "Deferred cleanup refused");
            }
        }
    }

    async fn on_failure(&self, error: StageError) {
        match error {
            StageError::JobFailure(message) => {
                error!(job_id = %self.id, error = %message, "Job failed");
                self.fail(message).await;
            }
            StageError::Aborted(message) => {
                warn!(job_id = %self.id, error = %message, "Stage aborted");
                let mut state = self.state.lock();
                if state.failed || state.status.is_terminal() {
                    return;
                }
                state.message = Some(message);
                state.status = if state.flagged_complete {
                    state.ended_at = Some(Utc::now());
                    JobStatus::Incomplete
                } else {
                    JobStatus::Waiting
                };
            }
        }
    }
}
