//! Per-job grouping of pool work with a single completion signal.
//!
//! Every enqueued future bumps an outstanding counter. When the counter
//! drops back to zero the listener hears exactly one of
//! [`TaskSetListener::on_all_complete`] or [`TaskSetListener::on_failure`].
//! Work enqueued after a zero crossing re-arms the set, so a listener may
//! be signalled several times over its life.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

use super::types::PoolError;
use super::worker_pool::{WorkHandle, WorkerPool};

/// Error side of task-set work.
pub trait TaskFailure: Send + Sync + 'static {
    /// Fatal errors take precedence when several failures land before a zero crossing.
    fn is_fatal(&self) -> bool;

    /// Error reported for work that panicked.
    fn panicked(label: &str) -> Self;
}

/// Receiver of task-set signals, held weakly by the set.
#[async_trait]
pub trait TaskSetListener<T, E>: Send + Sync
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Called for every finished unit of work, before the counter drops.
    async fn on_result(&self, _result: &Result<T, E>) {}

    /// Called at a zero crossing when no failure was recorded since the last one.
    async fn on_all_complete(&self, last: T);

    /// Called at a zero crossing when work failed since the last one.
    async fn on_failure(&self, error: E);
}

struct Inner<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    label: String,
    outstanding: AtomicUsize,
    failure: Mutex<Option<E>>,
    listener: Weak<dyn TaskSetListener<T, E>>,
}

impl<T, E> Inner<T, E>
where
    T: Send + Sync + 'static,
    E: TaskFailure,
{
    fn record(&self, error: E) {
        let mut slot = self.failure.lock();
        let replace = match slot.as_ref() {
            None => true,
            Some(existing) => !existing.is_fatal() && error.is_fatal(),
        };
        if replace {
            *slot = Some(error);
        }
    }

    async fn finish(&self, result: Result<T, E>) {
        let listener = self.listener.upgrade();
        if let Some(listener) = &listener {
            listener.on_result(&result).await;
        }

        let last = match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.record(error);
                None
            }
        };

        if self.outstanding.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }

        let failure = self.failure.lock().take();
        let Some(listener) = listener else {
            debug!(task_set = %self.label, "Listener gone, dropping completion signal");
            return;
        };

        if let Some(error) = failure {
            listener.on_failure(error).await;
        } else if let Some(value) = last {
            listener.on_all_complete(value).await;
        }
    }
}

/// Work grouped under one listener and executed on a shared pool.
pub struct TaskSet<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pool: Arc<WorkerPool>,
    inner: Arc<Inner<T, E>>,
}

impl<T, E> TaskSet<T, E>
where
    T: Send + Sync + 'static,
    E: TaskFailure,
{
    pub fn new(
        label: impl Into<String>,
        pool: Arc<WorkerPool>,
        listener: Weak<dyn TaskSetListener<T, E>>,
    ) -> Self {
        Self {
            pool,
            inner: Arc::new(Inner {
                label: label.into(),
                outstanding: AtomicUsize::new(0),
                failure: Mutex::new(None),
                listener,
            }),
        }
    }

    /// Submits `work` to the pool under this set.
    pub fn enqueue<F>(&self, stage: impl Into<String>, work: F) -> Result<WorkHandle, PoolError>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let stage = stage.into();
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let wrapped = async move {
            let result = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    error!(task_set = %inner.label, stage = %stage, "Stage panicked");
                    Err(E::panicked(&stage))
                }
            };
            inner.finish(result).await;
        };

        match self.pool.submit(wrapped.boxed()) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.inner.outstanding.fetch_sub(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Whether no enqueued work is outstanding.
    pub fn is_complete(&self) -> bool {
        self.outstanding() == 0
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WaitStrategy;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Soft(String),
        Fatal(String),
    }

    impl TaskFailure for TestError {
        fn is_fatal(&self) -> bool {
            matches!(self, TestError::Fatal(_))
        }

        fn panicked(label: &str) -> Self {
            TestError::Soft(format!("{} panicked", label))
        }
    }

    #[derive(Debug, PartialEq)]
    enum Signal {
        Complete(u32),
        Failed(TestError),
    }

    #[derive(Default)]
    struct Recorder {
        results: Mutex<usize>,
        signals: Mutex<Vec<Signal>>,
    }

    #[async_trait]
    impl TaskSetListener<u32, TestError> for Recorder {
        async fn on_result(&self, _result: &Result<u32, TestError>) {
            *self.results.lock() += 1;
        }

        async fn on_all_complete(&self, last: u32) {
            self.signals.lock().push(Signal::Complete(last));
        }

        async fn on_failure(&self, error: TestError) {
            self.signals.lock().push(Signal::Failed(error));
        }
    }

    fn setup() -> (Arc<Recorder>, TaskSet<u32, TestError>) {
        let pool = Arc::new(WorkerPool::new("task-set-test", 2, WaitStrategy::Blocking));
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn TaskSetListener<u32, TestError>> = recorder.clone();
        let set = TaskSet::new("job-1", pool, Arc::downgrade(&listener));
        (recorder, set)
    }

    #[tokio::test]
    async fn test_single_signal_after_all_work() {
        let (recorder, set) = setup();
        let gate = Arc::new(Notify::new());

        let gate_clone = Arc::clone(&gate);
        let slow = set
            .enqueue("slow", async move {
                gate_clone.notified().await;
                Ok(2)
            })
            .unwrap();
        let fast = set.enqueue("fast", async { Ok(1) }).unwrap();

        fast.wait().await.unwrap();
        assert!(recorder.signals.lock().is_empty());
        assert!(!set.is_complete());

        gate.notify_one();
        slow.wait().await.unwrap();

        assert!(set.is_complete());
        assert_eq!(*recorder.signals.lock(), vec![Signal::Complete(2)]);
        assert_eq!(*recorder.results.lock(), 2);
    }

    #[tokio::test]
    async fn test_signal_rearms_after_zero_crossing() {
        let (recorder, set) = setup();

        set.enqueue("first", async { Ok(1) })
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(recorder.signals.lock().len(), 1);

        set.enqueue("second", async { Ok(7) })
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(
            *recorder.signals.lock(),
            vec![Signal::Complete(1), Signal::Complete(7)]
        );
    }

    #[tokio::test]
    async fn test_failure_replaces_completion() {
        let (recorder, set) = setup();
        let gate = Arc::new(Notify::new());

        let gate_clone = Arc::clone(&gate);
        let ok = set
            .enqueue("ok", async move {
                gate_clone.notified().await;
                Ok(1)
            })
            .unwrap();
        set.enqueue("soft", async { Err(TestError::Soft("io".into())) })
            .unwrap()
            .wait()
            .await
            .unwrap();
        set.enqueue("fatal", async { Err(TestError::Fatal("probe".into())) })
            .unwrap()
            .wait()
            .await
            .unwrap();

        gate.notify_one();
        ok.wait().await.unwrap();

        assert_eq!(
            *recorder.signals.lock(),
            vec![Signal::Failed(TestError::Fatal("probe".into()))]
        );
    }

    #[tokio::test]
    async fn test_failure_is_cleared_after_signal() {
        let (recorder, set) = setup();

        set.enqueue("bad", async { Err(TestError::Soft("x".into())) })
            .unwrap()
            .wait()
            .await
            .unwrap();
        set.enqueue("good", async { Ok(3) })
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(
            *recorder.signals.lock(),
            vec![
                Signal::Failed(TestError::Soft("x".into())),
                Signal::Complete(3)
            ]
        );
    }

    #[tokio::test]
    async fn test_panicking_work_reports_failure() {
        let (recorder, set) = setup();

        set.enqueue("boom", async {
            if true {
                panic!("boom");
            }
            Ok(0)
        })
        .unwrap()
        .wait()
        .await
        .unwrap();

        assert_eq!(
            *recorder.signals.lock(),
            vec![Signal::Failed(TestError::Soft("boom panicked".into()))]
        );
        assert!(set.is_complete());
    }

    #[tokio::test]
    async fn test_dropped_listener_is_tolerated() {
        let pool = Arc::new(WorkerPool::new("orphan", 1, WaitStrategy::Blocking));
        let listener: Arc<dyn TaskSetListener<u32, TestError>> = Arc::new(Recorder::default());
        let set = TaskSet::new("orphan", pool, Arc::downgrade(&listener));
        drop(listener);

        set.enqueue("work", async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(1)
        })
        .unwrap()
        .wait()
        .await
        .unwrap();
        assert!(set.is_complete());
    }
}
