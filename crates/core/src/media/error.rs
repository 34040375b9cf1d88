//! Error types for the media module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while driving the external media tool.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Tool binary not found.
    #[error("Media tool not found at path: {path}")]
    ToolNotFound { path: PathBuf },

    /// Invocation exceeded the configured timeout.
    #[error("Media tool timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The prober produced no usable output.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// I/O error talking to the subprocess.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    pub(crate) fn from_spawn(err: std::io::Error, path: &std::path::Path) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::ToolNotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io(err)
        }
    }
}
