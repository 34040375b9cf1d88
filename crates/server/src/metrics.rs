//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the transcoding server:
//! - HTTP request metrics (latency, counts)
//! - Engine state (jobs, pool occupancy, running tasks), collected at scrape time
//! - Core pipeline metrics re-exported from `transcoder_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;
use tracing::warn;
use transcoder_core::MediaListing;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "transcoder_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 60.0,
        ]),
        &["method", "path", "status"],
    )
    .expect("metric definition is valid")
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("transcoder_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .expect("metric definition is valid")
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "transcoder_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .expect("metric definition is valid")
});

// =============================================================================
// Engine Metrics (collected dynamically)
// =============================================================================

/// Jobs held by the registry.
pub static JOBS_REGISTERED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("transcoder_jobs_registered", "Jobs currently held in memory")
        .expect("metric definition is valid")
});

/// Worker pool stages currently executing.
pub static POOL_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("transcoder_pool_active", "Number of executing pipeline stages")
        .expect("metric definition is valid")
});

/// Worker pool stages waiting for a slot.
pub static POOL_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("transcoder_pool_queued", "Number of queued pipeline stages")
        .expect("metric definition is valid")
});

/// Transcode tasks currently encoding.
pub static TASKS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("transcoder_tasks_running", "Number of running transcode tasks")
        .expect("metric definition is valid")
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // HTTP
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        // Engine
        Box::new(JOBS_REGISTERED.clone()),
        Box::new(POOL_ACTIVE.clone()),
        Box::new(POOL_QUEUED.clone()),
        Box::new(TASKS_RUNNING.clone()),
    ];

    // Core metrics (stages, callbacks, reaper, media tool)
    for metric in collectors
        .into_iter()
        .chain(transcoder_core::metrics::all_metrics())
    {
        if let Err(e) = registry.register(metric) {
            warn!(error = %e, "Failed to register metric");
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the engine at scrape time.
pub async fn collect_dynamic_metrics(state: &AppState) {
    let engine = state.engine();

    JOBS_REGISTERED.set(engine.job_count().await as i64);

    let pool = engine.pool_status();
    POOL_ACTIVE.set(pool.active_jobs as i64);
    POOL_QUEUED.set(pool.queued_jobs as i64);

    TASKS_RUNNING.set(engine.stats().tasks_running);
}

fn uuid_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"[0-9a-fA-F]{8}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{12}",
        )
        .expect("uuid regex is valid")
    });
    &RE
}

/// Normalize a path for metric labels.
///
/// Job ids and file names are caller-chosen, so every segment after a known
/// collection is collapsed to a placeholder.
pub fn normalize_path(path: &str) -> String {
    let path = uuid_regex().replace_all(path, "{id}");
    let segments: Vec<&str> = path.split('/').collect();

    let mut out: Vec<String> = Vec::with_capacity(segments.len());
    let mut collection: Option<&str> = None;
    for segment in segments {
        match collection {
            Some("jobs") if !matches!(segment, "complete" | "adaptive.m3u8") => {
                out.push("{id}".to_string());
                collection = None;
            }
            Some("videos") | Some("thumbs") => {
                out.push("{file}".to_string());
                break;
            }
            Some("media") => {
                let kind = segment
                    .parse::<MediaListing>()
                    .map(|listing| listing.as_str())
                    .unwrap_or("{kind}");
                out.push(kind.to_string());
                collection = None;
            }
            _ => {
                out.push(segment.to_string());
                collection = match segment {
                    "jobs" | "videos" | "thumbs" | "media" => Some(segment),
                    _ => None,
                };
            }
        }
    }
    out.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_job_id() {
        assert_eq!(normalize_path("/api/v1/jobs/job_42"), "/api/v1/jobs/{id}");
        assert_eq!(
            normalize_path("/api/v1/jobs/job_42/complete"),
            "/api/v1/jobs/{id}/complete"
        );
        assert_eq!(
            normalize_path("/api/v1/jobs/abc/adaptive.m3u8"),
            "/api/v1/jobs/{id}/adaptive.m3u8"
        );
    }

    #[test]
    fn test_normalize_path_static_files() {
        assert_eq!(normalize_path("/videos/j1/j1_t1.mp4"), "/videos/{file}");
        assert_eq!(
            normalize_path("/thumbs/j1/thumbnail-j1_0001.jpg"),
            "/thumbs/{file}"
        );
    }

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/other/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/other/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
        assert_eq!(normalize_path("/api/v1/jobs"), "/api/v1/jobs");
        assert_eq!(normalize_path("/api/v1/media/codecs"), "/api/v1/media/codecs");
        assert_eq!(normalize_path("/api/v1/media/bogus"), "/api/v1/media/{kind}");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("transcoder_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_engine_metrics() {
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        JOBS_REGISTERED.set(0);
        POOL_ACTIVE.set(0);
        POOL_QUEUED.set(0);
        TASKS_RUNNING.set(0);
        transcoder_core::metrics::REAPER_SWEEPS.inc();

        let output = encode_metrics();
        assert!(output.contains("transcoder_http_request_duration_seconds"));
        assert!(output.contains("transcoder_jobs_registered"));
        assert!(output.contains("transcoder_pool_active"));
        assert!(output.contains("transcoder_pool_queued"));
        assert!(output.contains("transcoder_tasks_running"));
        assert!(output.contains("transcoder_reaper_sweeps_total"));
    }
}
