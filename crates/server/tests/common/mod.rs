//! Common test utilities for in-process API testing with mocks.
//!
//! The fixture builds the real router over an engine whose media tool and
//! callback notifier are test doubles, so no encoder binary is needed.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use transcoder_core::testing::{fixtures, MockMediaTool, RecordingNotifier};
use transcoder_core::{Config, EngineConfig, StorageConfig, TranscodeEngine, WaitStrategy};
use transcoder_server::state::AppState;

const BOUNDARY: &str = "transcoder-test-boundary";

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_job_submission() {
///     let fixture = TestFixture::new().await;
///
///     let form = MultipartForm::new()
///         .text("jobid", "job1")
///         .file("video", "clip.mp4", b"data");
///     let response = fixture.post_form("/api/v1/jobs", form).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub engine: Arc<TranscodeEngine>,
    /// Mock media tool - scripted probe output and exec behaviour
    pub media: MockMediaTool,
    /// Captured callback posts
    pub notifier: RecordingNotifier,
    /// Temporary directory holding the working root
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub text: String,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let config = Config {
            engine: EngineConfig::default()
                .with_max_tasks(2)
                .with_wait_strategy(WaitStrategy::Blocking),
            storage: StorageConfig::default()
                .with_working_dir(temp_dir.path().join("work"))
                .with_file_root(temp_dir.path().join("public")),
            ..Config::default()
        };

        let media = MockMediaTool::new();
        media
            .set_default_probe(fixtures::probe_json(1920, 1080, 60.0, 4_000_000))
            .await;
        let notifier = RecordingNotifier::new();

        let engine = Arc::new(TranscodeEngine::new(
            config.clone(),
            Arc::new(media.clone()),
            Arc::new(notifier.clone()),
        ));
        let state = Arc::new(AppState::new(config, Arc::clone(&engine)));
        let router = transcoder_server::api::create_router(state);

        Self {
            router,
            engine,
            media,
            notifier,
            temp_dir,
        }
    }

    pub fn working_dir(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("work")
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Request::builder().method("GET").uri(path).body(Body::empty()).unwrap())
            .await
    }

    /// Send a POST request without a body.
    pub async fn post(&self, path: &str) -> TestResponse {
        self.send(Request::builder().method("POST").uri(path).body(Body::empty()).unwrap())
            .await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(Request::builder().method("DELETE").uri(path).body(Body::empty()).unwrap())
            .await
    }

    /// Send a POST request with a multipart form body.
    pub async fn post_form(&self, path: &str, form: MultipartForm) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(form.finish()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            content_type,
            text,
            body,
        }
    }

    /// Polls `GET /api/v1/jobs/{id}` until `done` holds.
    pub async fn wait_for_job<F>(&self, job_id: &str, done: F) -> Value
    where
        F: Fn(&Value) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let response = self.get(&format!("/api/v1/jobs/{}", job_id)).await;
            if response.status == StatusCode::OK && done(&response.body) {
                return response.body;
            }
            assert!(
                Instant::now() < deadline,
                "Job {} did not reach the expected state: {}",
                job_id,
                response.text
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Builder for `multipart/form-data` request bodies.
#[derive(Debug, Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, contents: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, file_name
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(contents);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// A task submission uploading a small placeholder video.
    pub fn upload_task(job_id: &str, task_id: &str) -> Self {
        Self::new()
            .text("jobid", job_id)
            .text("taskid", task_id)
            .text("extension", "mp4")
            .text("encoding-options", "-c:v libx264 -b:v 1M")
            .file("video", "clip.mp4", b"source video")
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}
