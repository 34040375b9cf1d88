//! Per-task transcode result, shared between the job and its transcode stage.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

use super::layout::{self, StorageLayout};
use super::manifest::Variant;
use super::types::{TaskStatus, TaskSummary};
use crate::media::ProbeInfo;

#[derive(Debug)]
struct ResultState {
    status: TaskStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    output_file: Option<String>,
    playlist_file: Option<String>,
    segments: Vec<String>,
    bit_rate: u64,
    width: u32,
    height: u32,
    duration_secs: f64,
    file_size: u64,
}

/// Outcome of one submitted task.
///
/// Percent-complete only ever moves forward.
#[derive(Debug)]
pub struct TranscodeResult {
    job_id: String,
    task_id: String,
    extension: String,
    segmented: bool,
    percent: AtomicU8,
    state: Mutex<ResultState>,
}

impl TranscodeResult {
    pub fn new(
        job_id: impl Into<String>,
        task_id: impl Into<String>,
        extension: impl Into<String>,
        segmented: bool,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            task_id: task_id.into(),
            extension: extension.into(),
            segmented,
            percent: AtomicU8::new(0),
            state: Mutex::new(ResultState {
                status: TaskStatus::Queued,
                started_at: None,
                finished_at: None,
                output_file: None,
                playlist_file: None,
                segments: Vec::new(),
                bit_rate: 0,
                width: 0,
                height: 0,
                duration_secs: 0.0,
                file_size: 0,
            }),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn is_segmented(&self) -> bool {
        self.segmented
    }

    /// File name the encoder writes to.
    pub fn output_name(&self) -> String {
        layout::output_name(&self.job_id, &self.task_id, &self.extension)
    }

    /// Segment manifest name, when segmenting.
    pub fn manifest_name(&self) -> Option<String> {
        self.segmented
            .then(|| layout::segment_manifest_name(&self.output_name()))
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    pub fn set_status(&self, status: TaskStatus) {
        self.state.lock().status = status;
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }

    /// Raises percent-complete to `percent` (capped at 100). Lower values are ignored.
    pub fn advance_percent(&self, percent: u8) -> u8 {
        let percent = percent.min(100);
        self.percent.fetch_max(percent, Ordering::SeqCst).max(percent)
    }

    pub fn mark_started(&self) {
        let mut state = self.state.lock();
        if state.started_at.is_none() {
            state.started_at = Some(Utc::now());
        }
    }

    /// Moves to a finished status. Completion pins progress at 100.
    pub fn finish(&self, status: TaskStatus) {
        {
            let mut state = self.state.lock();
            state.status = status;
            state.finished_at = Some(Utc::now());
        }
        if status == TaskStatus::Complete {
            self.advance_percent(100);
        }
    }

    /// Records the produced file and the metadata re-probed from it.
    pub fn record_output(&self, file_name: &str, file_size: u64, probe: Option<&ProbeInfo>) {
        let mut state = self.state.lock();
        state.output_file = Some(file_name.to_string());
        state.file_size = file_size;
        if let Some(probe) = probe {
            if let Some((width, height)) = probe.dimensions() {
                state.width = width;
                state.height = height;
            }
            state.bit_rate = probe.bit_rate().unwrap_or(0);
            state.duration_secs = probe.duration_secs().unwrap_or(0.0);
        }
    }

    pub fn record_segments(&self, manifest_file: &str, segments: Vec<String>) {
        let mut state = self.state.lock();
        state.playlist_file = Some(manifest_file.to_string());
        state.segments = segments;
    }

    pub fn output_file(&self) -> Option<String> {
        self.state.lock().output_file.clone()
    }

    pub fn playlist_file(&self) -> Option<String> {
        self.state.lock().playlist_file.clone()
    }

    pub fn segment_files(&self) -> Vec<String> {
        self.state.lock().segments.clone()
    }

    pub fn bit_rate(&self) -> u64 {
        self.state.lock().bit_rate
    }

    /// Entry for the adaptive manifest: completed, segmented results only.
    pub fn variant(&self, layout: &StorageLayout) -> Option<Variant> {
        let state = self.state.lock();
        if state.status != TaskStatus::Complete || state.segments.is_empty() {
            return None;
        }
        let playlist = state.playlist_file.as_deref()?;
        Some(Variant {
            bit_rate: state.bit_rate,
            playlist: layout.video_url(&self.job_id, playlist),
        })
    }

    pub fn summary(&self, layout: &StorageLayout) -> TaskSummary {
        let state = self.state.lock();
        TaskSummary {
            job_id: self.job_id.clone(),
            task_id: self.task_id.clone(),
            status: state.status,
            percent_complete: self.percent(),
            started_at: state.started_at,
            finished_at: state.finished_at,
            output_file: state.output_file.clone(),
            result_video: state
                .output_file
                .as_deref()
                .map(|f| layout.video_url(&self.job_id, f)),
            playlist: state
                .playlist_file
                .as_deref()
                .map(|f| layout.video_url(&self.job_id, f)),
            segments: state.segments.clone(),
            bit_rate: state.bit_rate,
            width: state.width,
            height: state.height,
            duration_secs: state.duration_secs,
            file_size: state.file_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    #[test]
    fn test_percent_is_monotonic() {
        let result = TranscodeResult::new("j", "t", "mp4", false);
        for (input, expected) in [(10, 10), (5, 10), (40, 40), (39, 40), (250, 100), (90, 100)] {
            assert_eq!(result.advance_percent(input), expected);
            assert_eq!(result.percent(), expected);
        }
    }

    #[test]
    fn test_finish_complete_pins_percent() {
        let result = TranscodeResult::new("j", "t", "mp4", true);
        result.advance_percent(42);
        result.finish(TaskStatus::Complete);
        assert_eq!(result.percent(), 100);
        assert_eq!(result.status(), TaskStatus::Complete);

        let failed = TranscodeResult::new("j", "t2", "mp4", false);
        failed.advance_percent(42);
        failed.finish(TaskStatus::Failed);
        assert_eq!(failed.percent(), 42);
    }

    #[test]
    fn test_record_output_from_probe() {
        let result = TranscodeResult::new("j", "t", "mp4", false);
        let probe = ProbeInfo::parse(
            r#"{"streams":[{"codec_type":"video","width":1280,"height":720,"bit_rate":"900000"}],
                "format":{"duration":"12.5","bit_rate":"1000000"}}"#,
        )
        .unwrap();
        result.record_output("j_t.mp4", 4096, Some(&probe));

        let layout = StorageLayout::new(StorageConfig::default());
        let summary = result.summary(&layout);
        assert_eq!(summary.width, 1280);
        assert_eq!(summary.height, 720);
        assert_eq!(summary.bit_rate, 1_000_000);
        assert_eq!(summary.duration_secs, 12.5);
        assert_eq!(summary.file_size, 4096);
        assert_eq!(summary.result_video.as_deref(), Some("/videos/j/j_t.mp4"));
    }

    #[test]
    fn test_variant_requires_completed_segments() {
        let layout = StorageLayout::new(StorageConfig::default());
        let result = TranscodeResult::new("j", "t", "ts", true);
        assert_eq!(result.manifest_name().as_deref(), Some("j_t.ts.m3u8"));
        result.record_segments("j_t.ts.m3u8", vec!["j_t_000.ts".to_string()]);
        assert!(result.variant(&layout).is_none());

        result.finish(TaskStatus::Complete);
        let variant = result.variant(&layout).unwrap();
        assert_eq!(variant.playlist, "/videos/j/j_t.ts.m3u8");
    }
}
