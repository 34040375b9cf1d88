//! Reaper loop.
//!
//! Each sweep walks every registered job:
//! - expirable and not yet cleaned: clean up its working directory
//! - cleaned and past the retention window: evict from the registry
//! - not expirable but parked in `Waiting` past the waiting timeout: force complete

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::ReaperConfig;
use crate::job::{JobError, JobRegistry, JobStatus};
use crate::metrics;
use crate::stats::EngineStats;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub cleaned: usize,
    pub evicted: usize,
    pub forced_complete: usize,
}

pub struct Reaper {
    config: ReaperConfig,
    registry: Arc<JobRegistry>,
    stats: Arc<EngineStats>,
    running: Arc<AtomicBool>,
    sweeping: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Reaper {
    pub fn new(config: ReaperConfig, registry: Arc<JobRegistry>, stats: Arc<EngineStats>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            registry,
            stats,
            running: Arc::new(AtomicBool::new(false)),
            sweeping: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawns the sweep loop. A second call while running is ignored.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Reaper already running");
            return;
        }

        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);
        let sweeping = Arc::clone(&self.sweeping);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(interval_secs = config.interval_secs, "Reaper loop started");
            let mut delay = config.initial_delay();
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Reaper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        sweeping.store(true, Ordering::SeqCst);
                        let report = contained(sweep(&registry, &config, &stats, Utc::now())).await;
                        sweeping.store(false, Ordering::SeqCst);
                        if let Some(report) = report.filter(|r| *r != SweepReport::default()) {
                            info!(
                                cleaned = report.cleaned,
                                evicted = report.evicted,
                                forced_complete = report.forced_complete,
                                "Reaper sweep finished"
                            );
                        }
                        delay = config.interval();
                    }
                }
            }
            info!("Reaper loop stopped");
        });
    }

    /// Signals the loop to stop and waits, within the configured number of
    /// polls, for an in-flight sweep to finish. Returns whether it did.
    pub async fn stop(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Reaper not running");
            return true;
        }
        let _ = self.shutdown_tx.send(());

        let poll = Duration::from_millis(self.config.shutdown_poll_interval_ms);
        for _ in 0..self.config.shutdown_poll_attempts {
            if !self.sweeping.load(Ordering::SeqCst) {
                info!("Reaper stopped");
                return true;
            }
            tokio::time::sleep(poll).await;
        }
        let idle = !self.sweeping.load(Ordering::SeqCst);
        if !idle {
            warn!("Reaper sweep still in flight at shutdown");
        }
        idle
    }

    /// Runs one sweep immediately.
    pub async fn sweep_now(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Runs one sweep as if the clock read `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        sweep(&self.registry, &self.config, &self.stats, now).await
    }
}

/// Runs a sweep, turning a panic into `None` so the schedule carries on.
async fn contained<F>(sweep: F) -> Option<SweepReport>
where
    F: Future<Output = SweepReport>,
{
    match AssertUnwindSafe(sweep).catch_unwind().await {
        Ok(report) => Some(report),
        Err(_) => {
            error!("Reaper sweep panicked");
            None
        }
    }
}

async fn sweep(
    registry: &JobRegistry,
    config: &ReaperConfig,
    stats: &EngineStats,
    now: DateTime<Utc>,
) -> SweepReport {
    let mut report = SweepReport::default();

    for job in registry.list().await {
        let age = now - job.created_at();

        if job.is_cleaned() {
            if age > config.retention() {
                registry.remove(job.id()).await;
                report.evicted += 1;
                debug!(job_id = %job.id(), "Evicted job past retention");
            }
            continue;
        }

        if job.can_expire_at(now) {
            match job.clean_up().await {
                Ok(true) => report.cleaned += 1,
                Ok(false) => {}
                Err(JobError::Busy(_)) => {
                    debug!(job_id = %job.id(), "Expired job still running, retrying next sweep");
                }
                Err(e) => warn!(job_id = %job.id(), error = %e, "Failed to clean expired job"),
            }
        } else if job.status() == JobStatus::Waiting
            && age > config.waiting_timeout()
            && job.force_complete()
        {
            report.forced_complete += 1;
        }
    }

    stats.jobs_evicted(report.evicted as u64);
    metrics::REAPER_SWEEPS.inc();
    for (action, count) in [
        ("cleaned", report.cleaned),
        ("evicted", report.evicted),
        ("forced_complete", report.forced_complete),
    ] {
        metrics::REAPER_ACTIONS
            .with_label_values(&[action])
            .inc_by(count as u64);
    }
    report
}
