//! Analysis pass for two-pass encodes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info};

use super::{ReadySignal, StageError, StageOutcome};
use crate::job::{layout, Job};
use crate::media::args::{self, Placeholders};

/// First pass of a multipass encode, keyed by its output extension.
///
/// Produces the pass log the paired transcode reads in its second pass.
pub struct FirstPass {
    job: Weak<Job>,
    job_id: String,
    extension: String,
    options: String,
    source: PathBuf,
    output: PathBuf,
    log_file: PathBuf,
    ready: ReadySignal,
    failed: AtomicBool,
}

impl FirstPass {
    pub fn new(
        job: Weak<Job>,
        job_id: &str,
        working_dir: &Path,
        source_name: &str,
        extension: &str,
        options: &str,
    ) -> Self {
        let output = working_dir.join(layout::first_pass_output_name(source_name, extension));
        let mut log_file = output.clone().into_os_string();
        log_file.push("-multipass");

        Self {
            job,
            job_id: job_id.to_string(),
            extension: extension.to_string(),
            options: options.to_string(),
            source: working_dir.join(source_name),
            output,
            log_file: PathBuf::from(log_file),
            ready: ReadySignal::new(),
            failed: AtomicBool::new(false),
        }
    }

    /// Pass log consumed by the second pass.
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn is_complete(&self) -> bool {
        self.ready.is_ready()
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        self.ready.wait().await
    }

    pub async fn run(self: Arc<Self>) -> Result<StageOutcome, StageError> {
        let result = self.analyze().await;
        if let Err(e) = &result {
            error!(job_id = %self.job_id, extension = %self.extension, error = %e, "First pass failed");
            self.failed.store(true, Ordering::SeqCst);
        }
        self.ready.mark_ready();
        result
    }

    fn command(&self, fps: u32) -> Vec<String> {
        let options = args::substitute(&self.options, &Placeholders::frame_rate(fps));
        let mut command = vec![
            "-i".to_string(),
            self.source.to_string_lossy().into_owned(),
            "-y".to_string(),
        ];
        command.extend(args::split(&options));
        command.extend([
            "-pass".to_string(),
            "1".to_string(),
            "-passlogfile".to_string(),
            self.log_file.to_string_lossy().into_owned(),
            self.output.to_string_lossy().into_owned(),
        ]);
        command
    }

    async fn analyze(&self) -> Result<StageOutcome, StageError> {
        let job = self.job.upgrade().ok_or_else(StageError::orphaned)?;
        let download = job.download().ok_or_else(|| {
            StageError::job_failure("Failed to perform fast pass of data missing probe info")
        })?;
        download.wait().await;

        let probe = download.probe_info().ok_or_else(|| {
            StageError::job_failure("Failed to perform fast pass of data missing probe info")
        })?;
        if self.options.trim().is_empty() {
            return Err(StageError::job_failure("No multi pass options provided"));
        }

        info!(job_id = %self.job_id, extension = %self.extension, "Running first pass");
        let output = job
            .context()
            .media
            .exec(&self.command(probe.frame_rate()), None)
            .await
            .map_err(|e| {
                debug!(job_id = %self.job_id, error = %e, "First pass invocation failed");
                StageError::job_failure("Failed to perform fast pass of data")
            })?;

        if !output.success() {
            debug!(job_id = %self.job_id, exit_code = output.exit_code, "First pass exited non-zero");
            return Err(StageError::job_failure("Failed to perform fast pass of data"));
        }

        Ok(StageOutcome::FirstPass {
            extension: self.extension.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_layout() {
        let pass = FirstPass::new(
            Weak::new(),
            "j1",
            Path::new("/w/j1"),
            "j1.vod",
            "mp4",
            "-c:v libx264 -r '{{fps}}' -g {{fps2x}}",
        );

        assert_eq!(pass.log_file(), Path::new("/w/j1/fastpass_j1.vod.mp4-multipass"));
        assert_eq!(
            pass.command(24),
            vec![
                "-i",
                "/w/j1/j1.vod",
                "-y",
                "-c:v",
                "libx264",
                "-r",
                "24",
                "-g",
                "48",
                "-pass",
                "1",
                "-passlogfile",
                "/w/j1/fastpass_j1.vod.mp4-multipass",
                "/w/j1/fastpass_j1.vod.mp4"
            ]
        );
    }
}
