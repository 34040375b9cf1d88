//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Pipeline stages (durations, task outcomes)
//! - Callback delivery
//! - The reaper
//! - The external media tool

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};
use std::future::Future;
use std::time::Instant;

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Stage run time in seconds by stage and result.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "transcoder_stage_duration_seconds",
            "Duration of pipeline stages",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]),
        &["stage", "result"], // result: "ok", "error"
    )
    .expect("metric definition is valid")
});

/// Finished transcode tasks by final status.
pub static TASKS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("transcoder_tasks_finished_total", "Finished transcode tasks"),
        &["status"], // "complete", "failed", "skipped"
    )
    .expect("metric definition is valid")
});

/// Jobs that ended in failure.
pub static JOBS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("transcoder_jobs_failed_total", "Total failed jobs")
        .expect("metric definition is valid")
});

// =============================================================================
// Callback Metrics
// =============================================================================

/// Callback deliveries by result.
pub static CALLBACKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("transcoder_callbacks_total", "Callback delivery attempts"),
        &["result"], // "delivered", "failed"
    )
    .expect("metric definition is valid")
});

// =============================================================================
// Reaper Metrics
// =============================================================================

/// Jobs touched by the reaper by action.
pub static REAPER_ACTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("transcoder_reaper_actions_total", "Reaper actions on jobs"),
        &["action"], // "cleaned", "evicted", "forced_complete"
    )
    .expect("metric definition is valid")
});

/// Completed reaper sweeps.
pub static REAPER_SWEEPS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("transcoder_reaper_sweeps_total", "Completed reaper sweeps")
        .expect("metric definition is valid")
});

// =============================================================================
// Media Tool Metrics
// =============================================================================

/// Media tool invocation time by kind.
pub static MEDIA_TOOL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "transcoder_media_tool_duration_seconds",
            "Duration of media tool invocations",
        )
        .buckets(vec![0.05, 0.25, 1.0, 5.0, 30.0, 120.0, 600.0, 3600.0, 21600.0]),
        &["kind"], // "exec", "probe"
    )
    .expect("metric definition is valid")
});

// =============================================================================
// Helper functions
// =============================================================================

/// Runs a stage future and records its duration under `stage`.
pub async fn timed_stage<F, T, E>(stage: &'static str, work: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = work.await;
    let outcome = if result.is_ok() { "ok" } else { "error" };
    STAGE_DURATION
        .with_label_values(&[stage, outcome])
        .observe(start.elapsed().as_secs_f64());
    result
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Pipeline
        Box::new(STAGE_DURATION.clone()),
        Box::new(TASKS_FINISHED.clone()),
        Box::new(JOBS_FAILED.clone()),
        // Callbacks
        Box::new(CALLBACKS_TOTAL.clone()),
        // Reaper
        Box::new(REAPER_ACTIONS.clone()),
        Box::new(REAPER_SWEEPS.clone()),
        // Media tool
        Box::new(MEDIA_TOOL_DURATION.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timed_stage_passes_result_through() {
        let before = STAGE_DURATION
            .with_label_values(&["unit-test", "error"])
            .get_sample_count();

        let result: Result<u8, &str> = timed_stage("unit-test", async { Err("boom") }).await;

        assert_eq!(result, Err("boom"));
        assert_eq!(
            STAGE_DURATION
                .with_label_values(&["unit-test", "error"])
                .get_sample_count(),
            before + 1
        );
    }
}
