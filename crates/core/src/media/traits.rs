//! Trait definitions for the media module.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::MediaError;

/// Result of one encoder invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Process exit code, `-1` when killed by a signal.
    pub exit_code: i32,
    /// Combined stdout and stderr text.
    pub output: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// An external media tool that can encode and probe files.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Returns the name of this tool implementation.
    fn name(&self) -> &str;

    /// Runs the encoder with `args`.
    ///
    /// Every output line is forwarded to `progress_tx` as it arrives. If the
    /// receiver is dropped the run continues without forwarding.
    async fn exec(
        &self,
        args: &[String],
        progress_tx: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<ToolOutput, MediaError>;

    /// Runs the prober with `args` and returns its stdout text.
    async fn probe(&self, args: &[String]) -> Result<String, MediaError>;
}
