//! Deferred execution of domain restores.
//!
//! Restoring replays a saved-state file and can take arbitrarily long, so it
//! never runs on a request task. `RestorePool::submit` validates nothing and
//! returns at once with a [`RestoreTicket`]; the restore itself runs on the
//! blocking thread pool, at most `restore_workers` at a time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vmctl_core::{DomainHandle, DomainManager};

use super::config::ServiceConfig;
use super::operation::OperationError;
use super::worker::{BackgroundRunnable, BackgroundWorker, SubmitError};

type RestoreResult = Result<DomainHandle, OperationError>;

/// One queued restore.
#[derive(Debug)]
pub struct RestoreJob {
    id: Uuid,
    source: String,
    reply: oneshot::Sender<RestoreResult>,
}

// ---------------------------------------------------------------------------
// RestoreRunner
// ---------------------------------------------------------------------------

/// Runs queued restores against the domain manager with bounded concurrency.
pub struct RestoreRunner {
    manager: Arc<dyn DomainManager>,
    permits: Arc<Semaphore>,
    running: JoinSet<()>,
}

impl RestoreRunner {
    #[must_use]
    pub fn new(manager: Arc<dyn DomainManager>, workers: u32) -> Self {
        Self {
            manager,
            permits: Arc::new(Semaphore::new(workers.max(1) as usize)),
            running: JoinSet::new(),
        }
    }
}

#[async_trait]
impl BackgroundRunnable for RestoreRunner {
    type Task = RestoreJob;

    async fn run(&mut self, job: RestoreJob) {
        // Reap restores that already finished.
        while self.running.try_join_next().is_some() {}

        if job.reply.is_closed() {
            debug!(job_id = %job.id, "restore abandoned while queued, skipping");
            return;
        }

        // Waiting here keeps further jobs in the queue while all workers are busy.
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return;
        };
        let manager = Arc::clone(&self.manager);

        self.running.spawn(async move {
            let _permit = permit;
            let RestoreJob { id, source, reply } = job;
            if reply.is_closed() {
                debug!(job_id = %id, "restore abandoned before start, skipping");
                return;
            }

            info!(job_id = %id, source = %source, "restore started");
            let path = source.clone();
            let result = match tokio::task::spawn_blocking(move || manager.restore(&path)).await {
                Ok(Ok(handle)) => {
                    info!(job_id = %id, domain = %handle.name, domid = handle.domid, "restore finished");
                    Ok(handle)
                }
                Ok(Err(err)) => {
                    warn!(job_id = %id, source = %source, error = ?err, "restore failed");
                    Err(OperationError::RestoreFailed {
                        message: err.to_string(),
                    })
                }
                Err(join_err) => {
                    error!(job_id = %id, source = %source, error = %join_err, "restore task aborted");
                    Err(OperationError::RestoreFailed {
                        message: "restore aborted unexpectedly".to_string(),
                    })
                }
            };

            match reply.send(result) {
                Ok(()) => {}
                Err(Ok(handle)) => warn!(
                    job_id = %id,
                    domain = %handle.name,
                    domid = handle.domid,
                    "restore finished after its caller stopped waiting, domain is live"
                ),
                Err(Err(err)) => warn!(
                    job_id = %id,
                    error = %err,
                    "restore failed after its caller stopped waiting"
                ),
            }
        });
    }

    async fn shutdown(&mut self) {
        // Restores already handed to the hypervisor cannot be interrupted.
        while self.running.join_next().await.is_some() {}
    }
}

// ---------------------------------------------------------------------------
// RestorePool
// ---------------------------------------------------------------------------

/// Bounded pool that runs restores off the request path.
pub struct RestorePool {
    worker: BackgroundWorker<RestoreRunner>,
}

impl RestorePool {
    /// Starts the pool. Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(manager: Arc<dyn DomainManager>, config: &ServiceConfig) -> Self {
        let runner = RestoreRunner::new(manager, config.restore_workers);
        Self {
            worker: BackgroundWorker::start(runner, config.restore_queue_capacity),
        }
    }

    /// Queues a restore of `source` and returns without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns `Overloaded` when the queue is full and `Cancelled` when the
    /// pool has been stopped.
    pub fn submit(&self, source: &str) -> Result<RestoreTicket, OperationError> {
        let id = Uuid::new_v4();
        let (reply, rx) = oneshot::channel();
        let job = RestoreJob {
            id,
            source: source.to_string(),
            reply,
        };

        match self.worker.try_submit(job) {
            Ok(()) => {
                debug!(job_id = %id, source = %source, "restore queued");
                Ok(RestoreTicket { id, rx })
            }
            Err(SubmitError::Full) => {
                warn!(source = %source, "restore queue full, refusing restore");
                Err(OperationError::Overloaded)
            }
            Err(SubmitError::Stopped) => Err(OperationError::Cancelled),
        }
    }

    /// Stops taking restores, fails queued ones with `Cancelled`, and waits for
    /// running ones to finish.
    pub async fn stop(&self) {
        self.worker.stop().await;
    }
}

// ---------------------------------------------------------------------------
// RestoreTicket
// ---------------------------------------------------------------------------

/// Claim on the result of a queued restore.
///
/// Dropping the ticket abandons the restore: if it has not started yet it is
/// skipped.
#[derive(Debug)]
pub struct RestoreTicket {
    id: Uuid,
    rx: oneshot::Receiver<RestoreResult>,
}

impl RestoreTicket {
    /// Returns the result if the restore has already finished.
    pub fn try_result(&mut self) -> Option<RestoreResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(OperationError::Cancelled)),
        }
    }

    /// Waits for the restore to finish, at most `timeout` when one is given.
    ///
    /// A timeout only ends the wait. A restore that already started keeps
    /// running and its domain may appear afterwards.
    ///
    /// # Errors
    ///
    /// Returns the restore's own failure, `RestoreTimedOut` when the timeout
    /// expires first, or `Cancelled` when the pool stopped before running it.
    pub async fn wait(self, timeout: Option<Duration>) -> RestoreResult {
        let Self { id, rx } = self;
        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx).await.map_err(|_| {
                let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                warn!(job_id = %id, timeout_ms, "stopped waiting for restore, it may still finish");
                OperationError::RestoreTimedOut { timeout_ms }
            })?,
            None => rx.await,
        };
        received.map_err(|_| OperationError::Cancelled)?
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::service::operation::ErrorKind;
    use crate::test_support::FakeManager;

    fn config(workers: u32, capacity: usize) -> ServiceConfig {
        ServiceConfig {
            restore_workers: workers,
            restore_queue_capacity: capacity,
            restore_timeout: None,
        }
    }

    #[tokio::test]
    async fn submit_returns_before_restore_finishes() {
        let (manager, gate) = FakeManager::with_restore_gate();
        let manager = Arc::new(manager);
        let pool = RestorePool::start(manager.clone(), &config(2, 8));

        let mut ticket = pool.submit("/var/lib/saved/web1.chk").unwrap();
        assert!(ticket.try_result().is_none());

        gate.wait_until_entered(1).await;
        assert!(ticket.try_result().is_none(), "restore is still blocked");

        gate.release();
        let handle = ticket.wait(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(handle.name, "web1");
        assert_eq!(manager.restore_calls.load(Ordering::SeqCst), 1);

        pool.stop().await;
    }

    #[tokio::test]
    async fn manager_failure_becomes_restore_failed() {
        let manager = Arc::new(FakeManager::new().failing_restore("state file corrupt"));
        let pool = RestorePool::start(manager, &config(1, 4));

        let ticket = pool.submit("/tmp/bad.chk").unwrap();
        let err = ticket.wait(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RestoreFailed);
        assert_eq!(err.to_string(), "Error restoring domain: state file corrupt");

        pool.stop().await;
    }

    #[tokio::test]
    async fn timed_out_restore_still_completes() {
        let (manager, gate) = FakeManager::with_restore_gate();
        let manager = Arc::new(manager);
        let pool = RestorePool::start(manager.clone(), &config(1, 4));

        let ticket = pool.submit("/tmp/late.chk").unwrap();
        gate.wait_until_entered(1).await;
        let err = ticket
            .wait(Some(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert_eq!(err, OperationError::RestoreTimedOut { timeout_ms: 30 });
        assert_eq!(
            err.to_string(),
            "Error restoring domain: still running after 30ms, the domain may appear later"
        );
        assert!(manager.lookup_by_name("late").is_none());

        // The started restore is not undone by the caller giving up.
        gate.release();
        pool.stop().await;
        assert_eq!(manager.lookup_by_name("late").map(|d| d.name), Some("late".to_string()));
    }

    #[tokio::test]
    async fn abandoned_job_is_skipped() {
        let (manager, gate) = FakeManager::with_restore_gate();
        let manager = Arc::new(manager);
        let pool = RestorePool::start(manager.clone(), &config(1, 4));

        let running = pool.submit("/tmp/first.chk").unwrap();
        gate.wait_until_entered(1).await;

        // Queued behind the single worker, then abandoned by its caller.
        let abandoned = pool.submit("/tmp/second.chk").unwrap();
        drop(abandoned);

        gate.release();
        running.wait(Some(Duration::from_secs(5))).await.unwrap();
        pool.stop().await;

        assert_eq!(manager.restore_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn full_queue_is_overloaded() {
        let (manager, gate) = FakeManager::with_restore_gate();
        let pool = RestorePool::start(Arc::new(manager), &config(1, 1));

        let _running = pool.submit("/tmp/a.chk").unwrap();
        gate.wait_until_entered(1).await;
        // Worker loop now waits for a permit holding this one.
        let _waiting = pool.submit("/tmp/b.chk").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // This one sits in the single queue slot.
        let _queued = pool.submit("/tmp/c.chk").unwrap();

        let err = pool.submit("/tmp/d.chk").unwrap_err();
        assert_eq!(err, OperationError::Overloaded);

        gate.release();
        pool.stop().await;
    }

    #[tokio::test]
    async fn stopped_pool_cancels_new_restores() {
        let pool = RestorePool::start(Arc::new(FakeManager::new()), &config(1, 4));
        pool.stop().await;
        let err = pool.submit("/tmp/late.chk").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn queued_jobs_are_cancelled_on_stop() {
        let (manager, gate) = FakeManager::with_restore_gate();
        let pool = Arc::new(RestorePool::start(Arc::new(manager), &config(1, 4)));

        let first = pool.submit("/tmp/first.chk").unwrap();
        gate.wait_until_entered(1).await;
        let second = pool.submit("/tmp/second.chk").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let third = pool.submit("/tmp/third.chk").unwrap();

        let stopping = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.release();
        stopping.await.unwrap();

        assert!(first.wait(None).await.is_ok());
        // `second` was waiting for a permit and `third` was still queued.
        assert_eq!(second.wait(None).await.unwrap_err().kind(), ErrorKind::Cancelled);
        assert_eq!(third.wait(None).await.unwrap_err().kind(), ErrorKind::Cancelled);
    }
}
