//! Shared harness for engine integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use transcoder_core::testing::{fixtures, MockMediaTool, RecordingNotifier};
use transcoder_core::{
    Config, EngineConfig, JobSummary, PublishMode, RawJobRequest, StorageConfig, Submission,
    TranscodeEngine, WaitStrategy,
};

pub const SIMPLE_OPTIONS: &str = "-c:v libx264 -b:v 1M -c:a aac";

pub struct TestHarness {
    pub engine: TranscodeEngine,
    pub media: MockMediaTool,
    pub notifier: RecordingNotifier,
    pub temp_dir: TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_mode(PublishMode::Local).await
    }

    pub async fn with_mode(mode: PublishMode) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut storage = StorageConfig::default()
            .with_working_dir(temp_dir.path().join("work"))
            .with_file_root(temp_dir.path().join("public"))
            .with_mode(mode);
        if mode == PublishMode::Move {
            storage = storage.with_serve_url("http://cdn.test");
        }

        let config = Config {
            engine: EngineConfig::default()
                .with_max_tasks(4)
                .with_wait_strategy(WaitStrategy::Blocking),
            storage,
            ..Config::default()
        };

        let media = MockMediaTool::new();
        media
            .set_default_probe(fixtures::probe_json(1920, 1080, 60.0, 4_000_000))
            .await;
        let notifier = RecordingNotifier::new();

        let engine = TranscodeEngine::new(
            config,
            Arc::new(media.clone()),
            Arc::new(notifier.clone()),
        );

        Self {
            engine,
            media,
            notifier,
            temp_dir,
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        let dir = self.temp_dir.path().join("uploads");
        std::fs::create_dir_all(&dir).expect("Failed to create uploads dir");
        dir
    }

    pub fn working_dir(&self, job_id: &str) -> PathBuf {
        self.temp_dir.path().join("work").join(job_id)
    }

    /// An upload-backed request with simple encode options.
    pub fn request(&self, job_id: &str, task_id: &str) -> RawJobRequest {
        fixtures::upload_request(&self.uploads_dir(), job_id, task_id, SIMPLE_OPTIONS)
    }

    pub async fn submit(&self, request: RawJobRequest) -> Submission {
        self.engine
            .submit(request)
            .await
            .expect("Submission should be accepted")
    }

    /// Polls the job summary until `done` holds.
    pub async fn wait_for<F>(&self, job_id: &str, done: F) -> JobSummary
    where
        F: Fn(&JobSummary) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let summary = self.engine.job(job_id).await.expect("Job should exist");
            if done(&summary) {
                return summary;
            }
            assert!(
                Instant::now() < deadline,
                "Job {} did not settle, last summary: {:?}",
                job_id,
                summary
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Waits until every task has finished and the job has settled.
    pub async fn wait_until_drained(&self, job_id: &str) -> JobSummary {
        self.wait_for(job_id, |s| {
            s.status.is_terminal() || s.status == transcoder_core::JobStatus::Waiting
        })
        .await
    }
}
