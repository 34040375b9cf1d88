//! Fixed-size worker pool draining a shared FIFO queue.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::types::{PoolError, PoolStatus};
use crate::config::{EngineConfig, WaitStrategy};

/// A unit of work accepted by the pool.
pub type Work = BoxFuture<'static, ()>;

const MODERATE_MIN_BACKOFF: Duration = Duration::from_millis(1);
const MODERATE_MAX_BACKOFF: Duration = Duration::from_millis(25);
const BLOCKING_RECHECK: Duration = Duration::from_secs(1);

/// Handle to submitted work; resolves once the work has run.
#[derive(Debug)]
pub struct WorkHandle {
    /// Pool-assigned sequence number.
    pub id: u64,
    done: oneshot::Receiver<()>,
}

impl WorkHandle {
    /// Waits for the work to finish. Fails if the pool discarded it.
    pub async fn wait(self) -> Result<(), PoolError> {
        self.done.await.map_err(|_| PoolError::Dropped(self.id))
    }
}

struct Queued {
    id: u64,
    work: Work,
    done: oneshot::Sender<()>,
}

/// Tracks statistics for a processing pool.
#[derive(Default)]
struct PoolStats {
    active: AtomicU64,
    queued: AtomicU64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
}

struct Shared {
    name: String,
    strategy: WaitStrategy,
    queue: Mutex<VecDeque<Queued>>,
    /// Guarded by `queue` for writes so submit and shutdown cannot interleave.
    accepting: AtomicBool,
    stopping: AtomicBool,
    notify: Notify,
    next_id: AtomicU64,
    stats: PoolStats,
}

/// Bounded set of workers executing queued futures in FIFO order.
///
/// Panics inside submitted work are caught and counted; they never take a
/// worker down.
pub struct WorkerPool {
    shared: Arc<Shared>,
    size: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `size` workers on the current tokio runtime.
    pub fn new(name: impl Into<String>, size: usize, strategy: WaitStrategy) -> Self {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            name: name.into(),
            strategy,
            queue: Mutex::new(VecDeque::new()),
            accepting: AtomicBool::new(true),
            stopping: AtomicBool::new(false),
            notify: Notify::new(),
            next_id: AtomicU64::new(1),
            stats: PoolStats::default(),
        });

        let workers = (0..size)
            .map(|index| tokio::spawn(worker_loop(index, Arc::clone(&shared))))
            .collect();

        info!(pool = %shared.name, workers = size, strategy = ?strategy, "Worker pool started");

        Self {
            shared,
            size,
            workers: Mutex::new(workers),
        }
    }

    /// Creates the stage pool described by the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new("stages", config.max_tasks, config.wait_strategy)
    }

    /// Queues `work` for execution.
    pub fn submit(&self, work: Work) -> Result<WorkHandle, PoolError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();

        {
            let mut queue = self.shared.queue.lock();
            if !self.shared.accepting.load(Ordering::SeqCst) {
                return Err(PoolError::ShutDown);
            }
            self.shared.stats.queued.fetch_add(1, Ordering::Relaxed);
            queue.push_back(Queued {
                id,
                work,
                done: done_tx,
            });
        }
        self.shared.notify.notify_one();

        debug!(pool = %self.shared.name, work_id = id, "Work queued");
        Ok(WorkHandle { id, done: done_rx })
    }

    /// Whether new work is accepted.
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Current pool statistics.
    pub fn status(&self) -> PoolStatus {
        let stats = &self.shared.stats;
        PoolStatus {
            name: self.shared.name.clone(),
            active_jobs: stats.active.load(Ordering::Relaxed) as usize,
            max_concurrent: self.size,
            queued_jobs: stats.queued.load(Ordering::Relaxed) as usize,
            total_processed: stats.total_processed.load(Ordering::Relaxed),
            total_failed: stats.total_failed.load(Ordering::Relaxed),
            accepting: self.is_accepting(),
        }
    }

    /// Stops intake, discards queued work and waits up to `grace` for
    /// in-flight work to finish. Workers still busy after that are aborted.
    ///
    /// Returns `true` when every worker exited within the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let discarded: Vec<Queued> = {
            let mut queue = self.shared.queue.lock();
            self.shared.accepting.store(false, Ordering::SeqCst);
            queue.drain(..).collect()
        };
        self.shared
            .stats
            .queued
            .fetch_sub(discarded.len() as u64, Ordering::Relaxed);
        if !discarded.is_empty() {
            warn!(
                pool = %self.shared.name,
                discarded = discarded.len(),
                "Discarding queued work on shutdown"
            );
        }
        drop(discarded);

        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        match tokio::time::timeout(grace, futures::future::join_all(handles)).await {
            Ok(_) => {
                info!(pool = %self.shared.name, "Worker pool stopped");
                true
            }
            Err(_) => {
                warn!(
                    pool = %self.shared.name,
                    grace_ms = grace.as_millis() as u64,
                    "Workers still busy after grace period, aborting"
                );
                for abort in aborts {
                    abort.abort();
                }
                false
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }
}

async fn worker_loop(index: usize, shared: Arc<Shared>) {
    let mut backoff = MODERATE_MIN_BACKOFF;

    loop {
        let next = shared.queue.lock().pop_front();

        let Some(item) = next else {
            if shared.stopping.load(Ordering::SeqCst) {
                break;
            }
            match shared.strategy {
                WaitStrategy::Aggressive => tokio::task::yield_now().await,
                WaitStrategy::Moderate => {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MODERATE_MAX_BACKOFF);
                }
                WaitStrategy::Blocking => {
                    let _ = tokio::time::timeout(BLOCKING_RECHECK, shared.notify.notified()).await;
                }
            }
            continue;
        };

        backoff = MODERATE_MIN_BACKOFF;
        let stats = &shared.stats;
        stats.queued.fetch_sub(1, Ordering::Relaxed);
        stats.active.fetch_add(1, Ordering::Relaxed);

        let outcome = AssertUnwindSafe(item.work).catch_unwind().await;

        stats.active.fetch_sub(1, Ordering::Relaxed);
        match outcome {
            Ok(()) => {
                stats.total_processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                stats.total_failed.fetch_add(1, Ordering::Relaxed);
                error!(pool = %shared.name, worker = index, work_id = item.id, "Work panicked");
            }
        }
        let _ = item.done.send(());
    }

    debug!(pool = %shared.name, worker = index, "Worker exiting");
}
