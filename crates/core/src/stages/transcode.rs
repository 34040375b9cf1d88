//! The encode itself, optionally followed by HLS segmenting.

use std::path::Path;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{FirstPass, StageError, StageOutcome};
use crate::job::{layout, manifest, Job, TaskStatus, TranscodeResult};
use crate::media::args::{self, Placeholders};
use crate::media::probe::probe_args;
use crate::media::progress::{parse_progress_time, percent_for};
use crate::media::{MediaTool, ProbeInfo};
use crate::metrics;

const MISSING_PROBE: &str = "Missing probe information for source video";
const MISSING_FIRST_PASS: &str = "Multipass task has no first pass configured";

/// Arguments for the encode. `pass_log` switches on the second pass.
pub(crate) fn encode_args(
    source: &Path,
    options: &str,
    pass_log: Option<&Path>,
    output: &Path,
) -> Vec<String> {
    let mut command = vec![
        "-i".to_string(),
        source.to_string_lossy().into_owned(),
        "-y".to_string(),
    ];
    command.extend(args::split(options));
    if let Some(log) = pass_log {
        command.extend([
            "-pass".to_string(),
            "2".to_string(),
            "-passlogfile".to_string(),
            log.to_string_lossy().into_owned(),
        ]);
    }
    command.push(output.to_string_lossy().into_owned());
    command
}

/// Arguments that repackage `input` into an HLS manifest plus numbered chunks.
pub(crate) fn segment_args(input: &Path, chunk_pattern: &Path, manifest: &Path) -> Vec<String> {
    [
        "-i",
        &input.to_string_lossy(),
        "-y",
        "-vcodec",
        "copy",
        "-acodec",
        "copy",
        "-bsf:v",
        "h264_mp4toannexb",
        "-hls_list_size",
        "0",
        "-hls_segment_filename",
        &chunk_pattern.to_string_lossy(),
        &manifest.to_string_lossy(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Feeds encoder output lines into the result's percent-complete.
async fn track_progress(
    mut lines: mpsc::UnboundedReceiver<String>,
    result: &TranscodeResult,
    duration_secs: f64,
    segmenting: bool,
) {
    while let Some(line) = lines.recv().await {
        if let Some(elapsed) = parse_progress_time(&line) {
            result.advance_percent(percent_for(elapsed, duration_secs, segmenting));
        }
    }
}

/// One requested output of a job.
pub struct TranscodeStage {
    job: Weak<Job>,
    result: Arc<TranscodeResult>,
    options: String,
    /// Extension of the paired first pass, when multipass.
    pass_extension: Option<String>,
}

impl TranscodeStage {
    pub fn new(
        job: Weak<Job>,
        result: Arc<TranscodeResult>,
        options: &str,
        pass_extension: Option<String>,
    ) -> Self {
        Self {
            job,
            result,
            options: options.to_string(),
            pass_extension,
        }
    }

    pub async fn run(self: Arc<Self>) -> Result<StageOutcome, StageError> {
        let job = self.job.upgrade().ok_or_else(StageError::orphaned)?;
        let stats = Arc::clone(&job.context().stats);

        stats.task_started();
        let outcome = self.transcode(&job).await;
        let label = match &outcome {
            Ok(TaskStatus::Complete) => {
                stats.task_completed();
                "complete"
            }
            Ok(TaskStatus::Skipped) => {
                stats.task_skipped();
                "skipped"
            }
            _ => {
                stats.task_failed();
                "failed"
            }
        };
        metrics::TASKS_FINISHED.with_label_values(&[label]).inc();

        info!(
            job_id = %self.result.job_id(),
            task_id = %self.result.task_id(),
            status = ?self.result.status(),
            "Transcode finished"
        );
        outcome.map(|_| StageOutcome::Transcoded(Arc::clone(&self.result)))
    }

    fn fail(&self, status: TaskStatus) -> Result<TaskStatus, StageError> {
        self.result.finish(status);
        Ok(status)
    }

    fn fail_job(&self, reason: &str) -> Result<TaskStatus, StageError> {
        self.result.finish(TaskStatus::Failed);
        Err(StageError::job_failure(reason))
    }

    async fn transcode(&self, job: &Job) -> Result<TaskStatus, StageError> {
        let result = &self.result;
        let Some(download) = job.download() else {
            return self.fail_job(MISSING_PROBE);
        };

        result.mark_started();
        download.wait().await;

        let first_pass: Option<Arc<FirstPass>> = match &self.pass_extension {
            Some(extension) => {
                result.set_status(TaskStatus::WaitingOnFirstPass);
                let Some(pass) = job.first_pass(extension) else {
                    return self.fail_job(MISSING_FIRST_PASS);
                };
                pass.wait().await;
                if pass.is_failed() {
                    debug!(task_id = %result.task_id(), "First pass failed, not encoding");
                    return self.fail(TaskStatus::Failed);
                }
                Some(pass)
            }
            None => None,
        };

        result.set_status(TaskStatus::Processing);

        let probe = match download.probe_info() {
            Some(probe) if !download.is_failed() => probe,
            _ => return self.fail_job(MISSING_PROBE),
        };

        if !args::source_supports(&self.options, probe.video_width()) {
            info!(
                task_id = %result.task_id(),
                source_width = probe.video_width(),
                "Requested resolution exceeds source, skipping"
            );
            return self.fail(TaskStatus::Skipped);
        }

        let placeholders = Placeholders {
            bitrate: args::requested_bitrate(&self.options).unwrap_or_default(),
            fps: probe.frame_rate(),
            resolution: args::requested_resolution(&self.options).unwrap_or_default(),
        };
        let options = args::substitute(&self.options, &placeholders);

        let working_dir = job.working_dir();
        let output_name = result.output_name();
        let output_path = working_dir.join(&output_name);
        if let Err(e) = tokio::fs::remove_file(&output_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %output_path.display(), error = %e, "Could not remove stale output");
            }
        }

        let command = encode_args(
            &download.path(),
            &options,
            first_pass.as_ref().map(|p| p.log_file()),
            &output_path,
        );

        let media = job.context().media.as_ref();
        let exec = match probe.duration_secs().filter(|d| *d > 0.0) {
            Some(duration) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let (exec, ()) = tokio::join!(
                    media.exec(&command, Some(tx)),
                    track_progress(rx, result, duration, result.is_segmented())
                );
                exec
            }
            None => media.exec(&command, None).await,
        };

        match exec {
            Ok(output) if output.success() => {}
            Ok(output) => {
                warn!(task_id = %result.task_id(), exit_code = output.exit_code, "Encoder exited non-zero");
                return self.fail(TaskStatus::Failed);
            }
            Err(e) => {
                warn!(task_id = %result.task_id(), error = %e, "Encoder invocation failed");
                return self.fail(TaskStatus::Failed);
            }
        }

        if let Some(manifest_name) = result.manifest_name() {
            if !self.segment(media, working_dir, &output_path, &manifest_name).await {
                return self.fail(TaskStatus::Failed);
            }
        }

        if !self.record_output(media, &output_path, &output_name).await {
            return self.fail(TaskStatus::Failed);
        }

        result.finish(TaskStatus::Complete);
        Ok(TaskStatus::Complete)
    }

    async fn segment(
        &self,
        media: &dyn MediaTool,
        working_dir: &Path,
        output_path: &Path,
        manifest_name: &str,
    ) -> bool {
        let result = &self.result;
        let manifest_path = working_dir.join(manifest_name);
        let chunk_pattern =
            working_dir.join(layout::segment_pattern(result.job_id(), result.task_id()));

        match media
            .exec(&segment_args(output_path, &chunk_pattern, &manifest_path), None)
            .await
        {
            Ok(output) if output.success() => {}
            Ok(output) => {
                warn!(task_id = %result.task_id(), exit_code = output.exit_code, "Segmenter exited non-zero");
                return false;
            }
            Err(e) => {
                warn!(task_id = %result.task_id(), error = %e, "Segmenter invocation failed");
                return false;
            }
        }

        match tokio::fs::read_to_string(&manifest_path).await {
            Ok(contents) => {
                result.record_segments(manifest_name, manifest::segment_files(&contents));
                true
            }
            Err(e) => {
                warn!(task_id = %result.task_id(), error = %e, "Segment manifest unreadable");
                false
            }
        }
    }

    /// Re-probes the produced file. A missing file fails the task.
    async fn record_output(&self, media: &dyn MediaTool, path: &Path, name: &str) -> bool {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(task_id = %self.result.task_id(), error = %e, "Encoder produced no output file");
                return false;
            }
        };

        let probe = match media.probe(&probe_args(path)).await {
            Ok(output) => ProbeInfo::parse(&output).ok(),
            Err(e) => {
                debug!(task_id = %self.result.task_id(), error = %e, "Could not re-probe output");
                None
            }
        };
        self.result.record_output(name, size, probe.as_ref());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_args_second_pass() {
        let args = encode_args(
            Path::new("/w/src.mp4"),
            "-c:v libx264 -b:v 1M",
            Some(Path::new("/w/fastpass_src.mp4.mp4-multipass")),
            Path::new("/w/j_t.mp4"),
        );
        assert_eq!(
            args,
            vec![
                "-i",
                "/w/src.mp4",
                "-y",
                "-c:v",
                "libx264",
                "-b:v",
                "1M",
                "-pass",
                "2",
                "-passlogfile",
                "/w/fastpass_src.mp4.mp4-multipass",
                "/w/j_t.mp4"
            ]
        );
    }

    #[test]
    fn test_segment_args() {
        let args = segment_args(
            Path::new("/w/j_t.ts"),
            Path::new("/w/j_t_%03d.ts"),
            Path::new("/w/j_t.ts.m3u8"),
        );
        assert_eq!(args.first().map(String::as_str), Some("-i"));
        assert!(args.windows(2).any(|w| w == ["-bsf:v", "h264_mp4toannexb"]));
        assert!(args.windows(2).any(|w| w == ["-hls_segment_filename", "/w/j_t_%03d.ts"]));
        assert_eq!(args.last().map(String::as_str), Some("/w/j_t.ts.m3u8"));
    }

    #[tokio::test]
    async fn test_track_progress_is_monotonic() {
        let result = TranscodeResult::new("j", "t", "mp4", true);
        let (tx, rx) = mpsc::unbounded_channel();
        for line in [
            "frame=10 time=00:00:30.00 bitrate=1k",
            "frame=5 time=00:00:10.00 bitrate=1k",
            "noise",
            "frame=99 time=00:02:00.00 bitrate=1k",
        ] {
            tx.send(line.to_string()).unwrap();
        }
        drop(tx);

        track_progress(rx, &result, 60.0, true).await;
        assert_eq!(result.percent(), 90);
    }
}
