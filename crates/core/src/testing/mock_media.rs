//! Scripted stand-in for the external encoder/prober.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::media::{MediaError, MediaTool, ToolOutput};

/// Which entry point was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    Probe,
    Exec,
}

/// A recorded call. `started` and `finished` come from one shared counter,
/// so calls can be ordered against each other.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub kind: InvocationKind,
    pub args: Vec<String>,
    pub started: usize,
    pub finished: usize,
}

impl Invocation {
    pub fn contains(&self, needle: &str) -> bool {
        self.args.iter().any(|arg| arg.contains(needle))
    }
}

/// Behaviour for exec calls whose output (last argument) contains `pattern`.
#[derive(Debug, Clone)]
pub struct ExecRule {
    pub pattern: String,
    pub exit_code: i32,
    pub output: String,
    pub progress: Vec<String>,
    pub delay: Duration,
    /// Whether the files the invocation names get created.
    pub produce_files: bool,
}

impl ExecRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            exit_code: 0,
            output: String::new(),
            progress: Vec::new(),
            delay: Duration::ZERO,
            produce_files: true,
        }
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self.produce_files = exit_code == 0;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_progress(mut self, lines: &[&str]) -> Self {
        self.progress = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn without_files(mut self) -> Self {
        self.produce_files = false;
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    default_probe: Option<String>,
    probes: Vec<(String, String)>,
    rules: Vec<ExecRule>,
    thumbnails: usize,
    segments: usize,
    invocations: Vec<Invocation>,
}

/// Mock [`MediaTool`].
///
/// - probe output per path substring, with a default
/// - exec rules matched against the output argument (first match wins)
/// - produces the files an invocation names: encode outputs, thumbnails,
///   segment manifests and chunks
/// - records every call in order
///
/// Unmatched exec calls succeed immediately.
#[derive(Debug, Clone)]
pub struct MockMediaTool {
    state: Arc<RwLock<MockState>>,
    clock: Arc<AtomicUsize>,
}

impl Default for MockMediaTool {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMediaTool {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState {
                thumbnails: 3,
                segments: 3,
                ..MockState::default()
            })),
            clock: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Probe output for any path without a specific entry.
    pub async fn set_default_probe(&self, json: impl Into<String>) {
        self.state.write().await.default_probe = Some(json.into());
    }

    /// Probe output for paths containing `pattern`.
    pub async fn set_probe_for(&self, pattern: impl Into<String>, json: impl Into<String>) {
        self.state
            .write()
            .await
            .probes
            .push((pattern.into(), json.into()));
    }

    pub async fn add_exec_rule(&self, rule: ExecRule) {
        self.state.write().await.rules.push(rule);
    }

    /// Number of thumbnail frames written per extraction.
    pub async fn set_thumbnail_count(&self, count: usize) {
        self.state.write().await.thumbnails = count;
    }

    pub async fn invocations(&self) -> Vec<Invocation> {
        self.state.read().await.invocations.clone()
    }

    /// Exec calls whose arguments contain `needle`.
    pub async fn execs_matching(&self, needle: &str) -> Vec<Invocation> {
        self.state
            .read()
            .await
            .invocations
            .iter()
            .filter(|i| i.kind == InvocationKind::Exec && i.contains(needle))
            .cloned()
            .collect()
    }

    pub async fn exec_count(&self) -> usize {
        self.state
            .read()
            .await
            .invocations
            .iter()
            .filter(|i| i.kind == InvocationKind::Exec)
            .count()
    }

    fn tick(&self) -> usize {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    async fn record(&self, kind: InvocationKind, args: &[String], started: usize) {
        let finished = self.tick();
        self.state.write().await.invocations.push(Invocation {
            kind,
            args: args.to_vec(),
            started,
            finished,
        });
    }

    async fn produce(&self, args: &[String]) -> std::io::Result<()> {
        let (thumbnails, segments) = {
            let state = self.state.read().await;
            (state.thumbnails, state.segments)
        };
        let Some(last) = args.last() else {
            return Ok(());
        };

        if args.iter().any(|a| a == "-frames:v") {
            for index in 1..=thumbnails {
                let path = last.replace("%04d", &format!("{:04}", index));
                write_file(Path::new(&path), b"jpeg").await?;
            }
            return Ok(());
        }

        if let Some(pos) = args.iter().position(|a| a == "-hls_segment_filename") {
            let pattern = args.get(pos + 1).cloned().unwrap_or_default();
            let mut manifest = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n");
            for index in 0..segments {
                let path = pattern.replace("%03d", &format!("{:03}", index));
                write_file(Path::new(&path), b"ts").await?;
                let name = Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                manifest.push_str(&format!("#EXTINF:10.0,\n{}\n", name));
            }
            manifest.push_str("#EXT-X-ENDLIST\n");
            return write_file(Path::new(last), manifest.as_bytes()).await;
        }

        write_file(Path::new(last), b"encoded").await
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            return Ok(());
        }
    }
    tokio::fs::write(path, contents).await
}

#[async_trait]
impl MediaTool for MockMediaTool {
    fn name(&self) -> &str {
        "mock"
    }

    async fn exec(
        &self,
        args: &[String],
        progress_tx: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<ToolOutput, MediaError> {
        let started = self.tick();
        let rule = self
            .state
            .read()
            .await
            .rules
            .iter()
            .find(|rule| args.last().is_some_and(|a| a.contains(&rule.pattern)))
            .cloned()
            .unwrap_or_else(|| ExecRule::new(""));

        if let Some(tx) = &progress_tx {
            for line in &rule.progress {
                let _ = tx.send(line.clone());
            }
        }
        if !rule.delay.is_zero() {
            tokio::time::sleep(rule.delay).await;
        }
        if rule.produce_files {
            self.produce(args).await?;
        }

        self.record(InvocationKind::Exec, args, started).await;
        Ok(ToolOutput {
            exit_code: rule.exit_code,
            output: rule.output,
        })
    }

    async fn probe(&self, args: &[String]) -> Result<String, MediaError> {
        let started = self.tick();
        let output = {
            let state = self.state.read().await;
            state
                .probes
                .iter()
                .find(|(pattern, _)| args.iter().any(|a| a.contains(pattern.as_str())))
                .map(|(_, json)| json.clone())
                .or_else(|| state.default_probe.clone())
                .unwrap_or_default()
        };
        self.record(InvocationKind::Probe, args, started).await;
        Ok(output)
    }
}
