//! Preview frame extraction.

use std::path::Path;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::{move_file, ReadySignal, StageError, StageOutcome};
use crate::config::PublishMode;
use crate::job::{layout, Job};
use crate::media::{MediaError, MediaTool};

/// Sources at most this long (seconds) use scene detection instead of even sampling.
const SHORT_SOURCE_SECS: u64 = 10;
const SCENE_FILTER: &str = "select=gt(scene\\,0.4)";
const LOOSE_SCENE_FILTER: &str = "select=gt(scene\\,0.05)";
const EMPTY_OUTPUT_MARKER: &str = "Output file is empty";

/// Sampling filter for a source of `duration_secs`.
pub(crate) fn sampling_filter(duration_secs: u64) -> String {
    if duration_secs > SHORT_SOURCE_SECS {
        format!("fps=fps=1/{}", duration_secs / layout::MAX_THUMBNAILS as u64)
    } else {
        SCENE_FILTER.to_string()
    }
}

fn extraction_args(source: &Path, filter: &str, pattern: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        source.to_string_lossy().into_owned(),
        "-y".to_string(),
        "-vf".to_string(),
        filter.to_string(),
        "-frames:v".to_string(),
        layout::MAX_THUMBNAILS.to_string(),
        "-vsync".to_string(),
        "vfr".to_string(),
        pattern.to_string_lossy().into_owned(),
    ]
}

/// Extracts up to five frames once the download is in.
pub struct ThumbnailStage {
    job: Weak<Job>,
    job_id: String,
    ready: ReadySignal,
}

impl ThumbnailStage {
    pub fn new(job: Weak<Job>, job_id: &str) -> Self {
        Self {
            job,
            job_id: job_id.to_string(),
            ready: ReadySignal::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.ready.is_ready()
    }

    pub async fn run(self: Arc<Self>) -> Result<StageOutcome, StageError> {
        let result = self.extract().await;
        self.ready.mark_ready();
        result
    }

    async fn extract(&self) -> Result<StageOutcome, StageError> {
        let job = self.job.upgrade().ok_or_else(StageError::orphaned)?;
        let none = StageOutcome::Thumbnails { files: Vec::new() };

        let Some(download) = job.download() else {
            return Ok(none);
        };
        download.wait().await;
        if download.is_failed() {
            debug!(job_id = %self.job_id, "Download failed, skipping thumbnails");
            return Ok(none);
        }

        let duration = download
            .probe_info()
            .and_then(|p| p.duration_secs())
            .unwrap_or(0.0) as u64;
        let ctx = job.context();
        let working_dir = job.working_dir();
        let pattern = working_dir.join(layout::thumbnail_pattern(&self.job_id));
        let source = download.path();

        if let Err(e) = run_extraction(ctx.media.as_ref(), &source, duration, &pattern).await {
            warn!(job_id = %self.job_id, error = %e, "Thumbnail extraction failed");
        }

        let mut files = Vec::new();
        for index in 1..=layout::MAX_THUMBNAILS {
            let name = layout::thumbnail_name(&self.job_id, index);
            if tokio::fs::try_exists(working_dir.join(&name))
                .await
                .unwrap_or(false)
            {
                files.push(name);
            }
        }

        if ctx.layout.mode() == PublishMode::Move {
            let public_dir = ctx.layout.public_thumb_dir(&self.job_id);
            for name in &files {
                if let Err(e) = move_file(&working_dir.join(name), &public_dir.join(name)).await {
                    warn!(job_id = %self.job_id, file = %name, error = %e, "Failed to publish thumbnail");
                }
            }
        }

        debug!(job_id = %self.job_id, count = files.len(), "Thumbnails extracted");
        Ok(StageOutcome::Thumbnails { files })
    }
}

/// Runs the extraction, retrying once with a looser scene threshold when
/// the first attempt produced nothing.
async fn run_extraction(
    media: &dyn MediaTool,
    source: &Path,
    duration_secs: u64,
    pattern: &Path,
) -> Result<(), MediaError> {
    let filter = sampling_filter(duration_secs);
    let output = media
        .exec(&extraction_args(source, &filter, pattern), None)
        .await?;

    if output.output.contains(EMPTY_OUTPUT_MARKER) {
        media
            .exec(&extraction_args(source, LOOSE_SCENE_FILTER, pattern), None)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_filter() {
        assert_eq!(sampling_filter(125), "fps=fps=1/25");
        assert_eq!(sampling_filter(11), "fps=fps=1/2");
        assert_eq!(sampling_filter(10), "select=gt(scene\\,0.4)");
        assert_eq!(sampling_filter(0), "select=gt(scene\\,0.4)");
    }

    #[test]
    fn test_extraction_args() {
        let args = extraction_args(
            Path::new("/w/j/src.mp4"),
            "fps=fps=1/25",
            Path::new("/w/j/thumbnail-j_%04d.jpg"),
        );
        assert_eq!(
            args,
            vec![
                "-i",
                "/w/j/src.mp4",
                "-y",
                "-vf",
                "fps=fps=1/25",
                "-frames:v",
                "5",
                "-vsync",
                "vfr",
                "/w/j/thumbnail-j_%04d.jpg"
            ]
        );
    }
}
