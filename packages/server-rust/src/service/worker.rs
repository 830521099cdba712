//! Background worker for deferred tasks.
//!
//! Provides a generic `BackgroundWorker<R>` that processes tasks from a bounded
//! mpsc channel via a `BackgroundRunnable` implementation. Submission never
//! waits: a full queue is reported to the caller immediately.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Trait for task handlers executed by `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Process a single task. Returning applies backpressure: the next task
    /// is not taken from the queue until this completes.
    async fn run(&mut self, task: Self::Task);

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

/// Why a task was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("worker queue is full")]
    Full,
    #[error("worker is stopped")]
    Stopped,
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Generic background worker that processes tasks via an mpsc channel.
///
/// The worker spawns a tokio task that:
/// 1. Listens for tasks on the channel
/// 2. Calls `BackgroundRunnable::run()` for each task
/// 3. Calls `BackgroundRunnable::shutdown()` when stopped
///
/// Tasks still queued when the worker stops are dropped unprocessed, and a
/// `run()` still pending at that moment is dropped at its current await point.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: mpsc::Sender<R::Task>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Start the background worker with the given runnable and queue capacity.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(mut runnable: R, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(capacity.max(1));
        let cancel = CancellationToken::new();
        let stopped = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = stopped.cancelled() => break,
                    task = rx.recv() => match task {
                        Some(t) => tokio::select! {
                            biased;
                            () = stopped.cancelled() => break,
                            () = runnable.run(t) => {}
                        },
                        None => break, // All senders dropped.
                    },
                }
            }

            rx.close();
            runnable.shutdown().await;
        });

        Self {
            tx,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Queue a task without waiting.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::Full` when the queue is at capacity and
    /// `SubmitError::Stopped` once `stop()` has been called.
    pub fn try_submit(&self, task: R::Task) -> Result<(), SubmitError> {
        if self.cancel.is_cancelled() {
            return Err(SubmitError::Stopped);
        }
        self.tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Stopped,
        })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop the worker and wait for `shutdown()` to finish. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;

    struct CountingRunnable {
        run_count: Arc<AtomicU32>,
        shutdown_called: Arc<AtomicU32>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = String;

        async fn run(&mut self, _task: String) {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.run_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.shutdown_called.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(gate: Option<Arc<Notify>>) -> (CountingRunnable, Arc<AtomicU32>, Arc<AtomicU32>) {
        let run_count = Arc::new(AtomicU32::new(0));
        let shutdown_called = Arc::new(AtomicU32::new(0));
        let runnable = CountingRunnable {
            run_count: run_count.clone(),
            shutdown_called: shutdown_called.clone(),
            gate,
        };
        (runnable, run_count, shutdown_called)
    }

    #[tokio::test]
    async fn start_submit_and_stop() {
        let (runnable, run_count, shutdown_called) = counting(None);
        let worker = BackgroundWorker::start(runnable, 16);

        worker.try_submit("task-1".to_string()).unwrap();
        worker.try_submit("task-2".to_string()).unwrap();
        worker.try_submit("task-3".to_string()).unwrap();

        // Give the worker time to process tasks.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(run_count.load(Ordering::SeqCst), 3);

        worker.stop().await;
        assert_eq!(shutdown_called.load(Ordering::SeqCst), 1);
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn full_queue_is_reported_immediately() {
        let gate = Arc::new(Notify::new());
        let (runnable, _run_count, _shutdown) = counting(Some(gate.clone()));
        let worker = BackgroundWorker::start(runnable, 1);

        // First task is taken by the worker and parks on the gate.
        worker.try_submit("busy".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Second fills the single queue slot.
        worker.try_submit("queued".to_string()).unwrap();

        let err = worker.try_submit("refused".to_string()).unwrap_err();
        assert_eq!(err, SubmitError::Full);

        // One wakes the parked task, the second is stored for the queued one.
        gate.notify_one();
        gate.notify_one();
        worker.stop().await;
    }

    #[tokio::test]
    async fn submit_after_stop_returns_error() {
        let (runnable, _run_count, _shutdown) = counting(None);
        let worker = BackgroundWorker::start(runnable, 4);
        worker.stop().await;

        let result = worker.try_submit("late-task".to_string());
        assert_eq!(result, Err(SubmitError::Stopped));
    }

    #[tokio::test]
    async fn stop_twice_is_harmless() {
        let (runnable, _run_count, shutdown_called) = counting(None);
        let worker = BackgroundWorker::start(runnable, 4);
        worker.stop().await;
        worker.stop().await;
        assert_eq!(shutdown_called.load(Ordering::SeqCst), 1);
    }
}
