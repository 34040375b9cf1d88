//! Reaper sweeps over real jobs, driven with an explicit clock.

mod common;

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use common::TestHarness;
use transcoder_core::testing::ExecRule;
use transcoder_core::{JobStatus, SweepReport};

#[tokio::test]
async fn test_complete_job_cleaned_after_expiry_then_evicted() {
    let harness = TestHarness::new().await;
    harness.submit(harness.request("old", "t1")).await;
    harness.wait_until_drained("old").await;
    harness.engine.complete_job("old").await.unwrap();

    let reaper = harness.engine.reaper();
    let now = Utc::now();

    // Without a callback the acknowledgement count never catches up, so
    // only age expires the job.
    assert_eq!(reaper.sweep_at(now).await, SweepReport::default());
    assert!(harness.working_dir("old").exists());

    let report = reaper.sweep_at(now + ChronoDuration::hours(25)).await;
    assert_eq!(report.cleaned, 1);
    assert!(!harness.working_dir("old").exists());
    assert!(harness.engine.job("old").await.unwrap().cleaned);

    let report = reaper.sweep_at(now + ChronoDuration::days(31)).await;
    assert_eq!(report.evicted, 1);
    assert!(harness.engine.job("old").await.is_err());
    assert_eq!(harness.engine.stats().jobs_evicted, 1);
}

#[tokio::test]
async fn test_acknowledged_complete_job_cleaned_immediately() {
    let harness = TestHarness::new().await;
    let mut request = harness.request("acked", "t1");
    request.callback = Some("http://caller.test/hook".to_string());
    harness.submit(request).await;
    harness.wait_until_drained("acked").await;
    harness.engine.complete_job("acked").await.unwrap();

    let report = harness.engine.reaper().sweep_now().await;
    assert_eq!(report.cleaned, 1);
    assert!(harness.engine.job("acked").await.unwrap().cleaned);
}

#[tokio::test]
async fn test_stale_waiting_job_forced_complete() {
    let harness = TestHarness::new().await;
    harness.submit(harness.request("idle", "t1")).await;
    let summary = harness.wait_until_drained("idle").await;
    assert_eq!(summary.status, JobStatus::Waiting);

    let reaper = harness.engine.reaper();
    let now = Utc::now();

    let report = reaper.sweep_at(now + ChronoDuration::hours(9)).await;
    assert_eq!(report.forced_complete, 0);

    let report = reaper.sweep_at(now + ChronoDuration::hours(11)).await;
    assert_eq!(report.forced_complete, 1);

    let summary = harness.engine.job("idle").await.unwrap();
    assert_eq!(summary.status, JobStatus::Complete);
    assert!(summary.is_complete);
    assert!(!summary.cleaned);
}

#[tokio::test]
async fn test_busy_job_survives_sweep() {
    let harness = TestHarness::new().await;
    harness
        .media
        .add_exec_rule(ExecRule::new("slow_t1.mp4").with_delay(Duration::from_millis(300)))
        .await;
    harness.submit(harness.request("slow", "t1")).await;

    let reaper = harness.engine.reaper();
    let report = reaper
        .sweep_at(Utc::now() + ChronoDuration::hours(25))
        .await;
    assert_eq!(report.cleaned, 0);

    let summary = harness.wait_until_drained("slow").await;
    assert!(!summary.cleaned);

    let report = reaper
        .sweep_at(Utc::now() + ChronoDuration::hours(25))
        .await;
    assert_eq!(report.cleaned, 1);
}

#[tokio::test]
async fn test_background_reaper_cleans_acknowledged_jobs() {
    let harness = TestHarness::new().await;
    let mut request = harness.request("bg", "t1");
    request.callback = Some("http://caller.test/hook".to_string());
    harness.submit(request).await;
    harness.wait_until_drained("bg").await;
    harness.engine.complete_job("bg").await.unwrap();

    let reaper = harness.engine.reaper();
    reaper.start();
    assert!(reaper.is_running());

    harness.wait_for("bg", |s| s.cleaned).await;
    assert!(reaper.stop().await);
    assert!(!reaper.is_running());
}
