//! Pipeline stages run on the worker pool.
//!
//! Download/probe comes first; thumbnail extraction, the analysis pass and
//! every transcode wait on its [`ReadySignal`] before doing any work. A
//! transcode using multipass additionally waits on its paired first pass.

mod download;
mod first_pass;
mod signal;
mod thumbnail;
mod transcode;

pub use download::Download;
pub use first_pass::FirstPass;
pub use signal::ReadySignal;
pub use thumbnail::ThumbnailStage;
pub use transcode::TranscodeStage;

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::job::TranscodeResult;
use crate::pool::TaskFailure;

/// What a finished stage hands back to its job.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Downloaded,
    Thumbnails { files: Vec<String> },
    FirstPass { extension: String },
    Transcoded(Arc<TranscodeResult>),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    /// Unrecoverable for the whole job.
    #[error("{0}")]
    JobFailure(String),

    /// The stage could not finish, the job itself may still complete.
    #[error("Stage aborted: {0}")]
    Aborted(String),
}

impl StageError {
    pub fn job_failure(reason: impl Into<String>) -> Self {
        Self::JobFailure(reason.into())
    }

    pub(crate) fn orphaned() -> Self {
        Self::Aborted("job no longer exists".to_string())
    }
}

impl TaskFailure for StageError {
    fn is_fatal(&self) -> bool {
        matches!(self, StageError::JobFailure(_))
    }

    fn panicked(label: &str) -> Self {
        StageError::Aborted(format!("{} panicked", label))
    }
}

/// Renames `from` to `to`, falling back to copy + delete across filesystems.
pub(crate) async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_job_failure_is_fatal() {
        assert!(StageError::job_failure("probe").is_fatal());
        assert!(!StageError::orphaned().is_fatal());
        assert_eq!(
            StageError::panicked("transcode"),
            StageError::Aborted("transcode panicked".to_string())
        );
    }

    #[tokio::test]
    async fn test_move_file_creates_parent() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("nested/deeper/b.txt");
        tokio::fs::write(&from, b"hello").await.unwrap();

        move_file(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(tokio::fs::read(&to).await.unwrap(), b"hello");
    }
}
