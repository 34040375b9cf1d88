//! Test doubles for the external collaborators of the engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use transcoder_core::testing::{fixtures, MockMediaTool, RecordingNotifier};
//!
//! let media = MockMediaTool::new();
//! media.set_default_probe(fixtures::probe_json(1920, 1080, 60.0, 4_000_000)).await;
//! let notifier = RecordingNotifier::new();
//!
//! let engine = TranscodeEngine::new(config, Arc::new(media.clone()), Arc::new(notifier.clone()));
//! ```

mod mock_media;
mod recording_notifier;

pub use mock_media::{ExecRule, Invocation, InvocationKind, MockMediaTool};
pub use recording_notifier::{RecordedCallback, RecordingNotifier};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::job::RawJobRequest;

    /// Prober JSON for a single h264 video stream plus an audio stream.
    pub fn probe_json(width: u32, height: u32, duration_secs: f64, bit_rate: u64) -> String {
        serde_json::json!({
            "streams": [
                {
                    "index": 0,
                    "codec_name": "h264",
                    "codec_type": "video",
                    "width": width,
                    "height": height,
                    "avg_frame_rate": "30000/1001",
                    "bit_rate": bit_rate.to_string()
                },
                {
                    "index": 1,
                    "codec_name": "aac",
                    "codec_type": "audio"
                }
            ],
            "format": {
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": format!("{:.6}", duration_secs),
                "bit_rate": bit_rate.to_string(),
                "size": "1048576"
            }
        })
        .to_string()
    }

    /// Writes a placeholder upload under `dir` and returns a request for it.
    pub fn upload_request(dir: &Path, job_id: &str, task_id: &str, options: &str) -> RawJobRequest {
        let upload = dir.join(format!("upload-{}-{}.mp4", job_id, task_id));
        if let Err(e) = std::fs::write(&upload, b"source") {
            panic!("failed to write fixture upload {}: {}", upload.display(), e);
        }
        RawJobRequest {
            job_id: Some(job_id.to_string()),
            task_id: Some(task_id.to_string()),
            upload: Some(upload),
            encoding_options: Some(options.to_string()),
            extension: Some("mp4".to_string()),
            ..RawJobRequest::default()
        }
    }

    /// A request fetching its source from `url`.
    pub fn remote_request(job_id: &str, task_id: &str, url: &str, options: &str) -> RawJobRequest {
        RawJobRequest {
            job_id: Some(job_id.to_string()),
            task_id: Some(task_id.to_string()),
            video_url: Some(url.to_string()),
            encoding_options: Some(options.to_string()),
            extension: Some("mp4".to_string()),
            ..RawJobRequest::default()
        }
    }
}
