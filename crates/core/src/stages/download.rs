//! Source acquisition and probing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use super::{move_file, ReadySignal, StageError, StageOutcome};
use crate::context::EngineContext;
use crate::job::{layout, Job, VideoSource};
use crate::media::probe::probe_args;
use crate::media::ProbeInfo;

const PROBE_FAILED: &str = "Failed to probe information from video file";

/// Brings the source video into the job working directory and probes it.
pub struct Download {
    job: Weak<Job>,
    job_id: String,
    source: VideoSource,
    destination: String,
    working_dir: PathBuf,
    ready: ReadySignal,
    failed: AtomicBool,
    probe: OnceLock<ProbeInfo>,
}

impl Download {
    pub fn new(job: Weak<Job>, job_id: &str, source: VideoSource, working_dir: &Path) -> Self {
        let destination = match &source {
            VideoSource::Staged { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| layout::remote_download_name(job_id)),
            VideoSource::Remote { .. } => layout::remote_download_name(job_id),
        };

        Self {
            job,
            job_id: job_id.to_string(),
            source,
            destination,
            working_dir: working_dir.to_path_buf(),
            ready: ReadySignal::new(),
            failed: AtomicBool::new(false),
            probe: OnceLock::new(),
        }
    }

    /// File name of the source inside the working directory.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn path(&self) -> PathBuf {
        self.working_dir.join(&self.destination)
    }

    pub fn is_complete(&self) -> bool {
        self.ready.is_ready()
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn probe_info(&self) -> Option<&ProbeInfo> {
        self.probe.get()
    }

    /// Waits until the download has finished, successfully or not.
    pub async fn wait(&self) {
        self.ready.wait().await
    }

    /// Moves a staged upload into the working directory.
    pub async fn stage(&self) -> std::io::Result<()> {
        if let VideoSource::Staged { path } = &self.source {
            let target = self.path();
            if path != &target {
                move_file(path, &target).await?;
            }
        }
        Ok(())
    }

    pub async fn run(self: Arc<Self>) -> Result<StageOutcome, StageError> {
        let result = match self.job.upgrade() {
            Some(job) => self.fetch_and_probe(job.context()).await,
            None => Err(StageError::orphaned()),
        };

        if let Err(e) = &result {
            error!(job_id = %self.job_id, error = %e, "Download failed");
            self.failed.store(true, Ordering::SeqCst);
        }
        self.ready.mark_ready();
        result
    }

    async fn fetch_and_probe(&self, ctx: &EngineContext) -> Result<StageOutcome, StageError> {
        let path = self.path();

        if let VideoSource::Remote { url } = &self.source {
            info!(job_id = %self.job_id, url = %url, "Fetching source");
            fetch(&ctx.http, url, &path).await.map_err(|e| {
                StageError::job_failure(format!("Failed to download source video: {}", e))
            })?;
        } else {
            debug!(job_id = %self.job_id, file = %self.destination, "Using staged source");
        }

        let output = ctx
            .media
            .probe(&probe_args(&path))
            .await
            .map_err(|e| {
                debug!(job_id = %self.job_id, error = %e, "Prober invocation failed");
                StageError::job_failure(PROBE_FAILED)
            })?;
        let info = ProbeInfo::parse(&output).map_err(|e| {
            debug!(job_id = %self.job_id, error = %e, "Prober output unusable");
            StageError::job_failure(PROBE_FAILED)
        })?;

        debug!(
            job_id = %self.job_id,
            duration = ?info.duration_secs(),
            width = info.video_width(),
            "Source probed"
        );
        let _ = self.probe.set(info);
        Ok(StageOutcome::Downloaded)
    }
}

async fn fetch(client: &reqwest::Client, url: &str, path: &Path) -> Result<(), FetchError> {
    let mut response = client.get(url).send().await?.error_for_status()?;
    let mut file = tokio::fs::File::create(path).await?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
