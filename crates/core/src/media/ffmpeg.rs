//! Subprocess-backed media tool.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

use super::error::MediaError;
use super::progress::LineSplitter;
use super::traits::{MediaTool, ToolOutput};
use crate::config::MediaConfig;
use crate::metrics;

/// Media tool that shells out to the `ffmpeg` and `ffprobe` binaries.
pub struct FfmpegTool {
    config: MediaConfig,
}

impl FfmpegTool {
    /// Creates a new tool with the given configuration.
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Creates a tool with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MediaConfig::default())
    }
}

/// Reads a pipe to the end, splitting on `\n` and `\r` so in-place progress
/// updates come through as separate lines.
async fn drain<R>(
    mut reader: R,
    progress_tx: Option<mpsc::UnboundedSender<String>>,
) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::default();
    let mut collected = String::new();
    let mut buf = [0u8; 4096];

    let mut emit = |line: String| {
        collected.push_str(&line);
        collected.push('\n');
        if let Some(tx) = &progress_tx {
            let _ = tx.send(line);
        }
    };

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        for line in splitter.push(&buf[..n]) {
            emit(line);
        }
    }
    if let Some(line) = splitter.finish() {
        emit(line);
    }

    Ok(collected)
}

#[async_trait]
impl MediaTool for FfmpegTool {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn exec(
        &self,
        args: &[String],
        progress_tx: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<ToolOutput, MediaError> {
        debug!(
            tool = %self.config.ffmpeg_path.display(),
            args = %args.join(" "),
            "Running media tool"
        );

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::from_spawn(e, &self.config.ffmpeg_path))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

        let run = async {
            let (out, err) =
                tokio::try_join!(drain(stdout, progress_tx.clone()), drain(stderr, progress_tx))?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out, err))
        };

        let started = Instant::now();
        let outcome = timeout(self.config.timeout(), run).await;
        metrics::MEDIA_TOOL_DURATION
            .with_label_values(&["exec"])
            .observe(started.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok((status, out, err))) => Ok(ToolOutput {
                exit_code: status.code().unwrap_or(-1),
                output: out + &err,
            }),
            Ok(Err(e)) => Err(MediaError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                Err(MediaError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
        }
    }

    async fn probe(&self, args: &[String]) -> Result<String, MediaError> {
        debug!(
            tool = %self.config.ffprobe_path.display(),
            args = %args.join(" "),
            "Probing media"
        );

        let started = Instant::now();
        let output = timeout(
            self.config.timeout(),
            Command::new(&self.config.ffprobe_path)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| MediaError::Timeout {
            timeout_secs: self.config.timeout_secs,
        })?
        .map_err(|e| MediaError::from_spawn(e, &self.config.ffprobe_path))?;
        metrics::MEDIA_TOOL_DURATION
            .with_label_values(&["probe"])
            .observe(started.elapsed().as_secs_f64());

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_drain_splits_carriage_returns() {
        let input: &[u8] = b"header\nframe=1 time=00:00:01.00\rframe=2 time=00:00:02.00\rtail";
        let (tx, mut rx) = mpsc::unbounded_channel();

        let collected = drain(input, Some(tx)).await.unwrap();

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert_eq!(
            lines,
            vec![
                "header",
                "frame=1 time=00:00:01.00",
                "frame=2 time=00:00:02.00",
                "tail"
            ]
        );
        assert!(collected.ends_with("tail\n"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let tool = FfmpegTool::new(MediaConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ..Default::default()
        });

        let result = tool.exec(&["-version".to_string()], None).await;
        assert!(matches!(result, Err(MediaError::ToolNotFound { .. })));
    }
}
