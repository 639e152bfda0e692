//! Bounded pool hosting background job execution.
//!
//! Capacity is `max_concurrent + max_queued`. A submission takes a capacity
//! slot without waiting; if none is free the job is rejected. Inside its task
//! a job then waits for one of `max_concurrent` worker permits before running.

use std::future::Future;
use std::sync::Arc;

use flowmind_training::JobId;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("training capacity exhausted ({capacity} jobs already accepted), try again later")]
    Saturated { capacity: usize },
}

/// Worker pool for job execution tasks.
#[derive(Debug, Clone)]
pub struct JobPool {
    /// Accepted-but-unfinished jobs, running or waiting.
    slots: Arc<Semaphore>,
    /// Jobs allowed to run at once.
    workers: Arc<Semaphore>,
    capacity: usize,
    max_concurrent: usize,
}

impl JobPool {
    /// `max_concurrent` is clamped to at least one worker, and both sizes to
    /// what a semaphore can hold.
    #[must_use]
    pub fn new(max_concurrent: usize, max_queued: usize) -> Self {
        let max_concurrent = max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        let capacity = max_concurrent
            .checked_add(max_queued)
            .map_or(Semaphore::MAX_PERMITS, |c| c.min(Semaphore::MAX_PERMITS));
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            workers: Arc::new(Semaphore::new(max_concurrent)),
            capacity,
            max_concurrent,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Jobs accepted and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Schedule `job` without blocking, or reject it when the pool is full.
    ///
    /// Both permits are held by the task and released when it ends, including
    /// by panic.
    pub fn try_spawn<F>(&self, job_id: JobId, job: F) -> Result<JoinHandle<()>, PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let slot = Arc::clone(&self.slots)
            .try_acquire_owned()
            .map_err(|_| PoolError::Saturated { capacity: self.capacity })?;
        let workers = Arc::clone(&self.workers);

        Ok(tokio::spawn(async move {
            let _slot = slot;
            let Ok(_worker) = workers.acquire_owned().await else {
                error!(job_id = %job_id, "Worker semaphore closed, dropping job");
                return;
            };
            debug!(job_id = %job_id, "Worker acquired");
            job.await;
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_pool_rejects_when_full() {
        let pool = JobPool::new(1, 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = pool
            .try_spawn(JobId(1), async move {
                let _ = release_rx.await;
            })
            .unwrap();
        let second = pool.try_spawn(JobId(2), async {}).unwrap();
        assert_eq!(pool.in_flight(), 2);

        let err = pool.try_spawn(JobId(3), async {}).unwrap_err();
        assert_eq!(err, PoolError::Saturated { capacity: 2 });

        release_tx.send(()).unwrap();
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.try_spawn(JobId(4), async {}).is_ok());
    }

    #[tokio::test]
    async fn test_pool_without_queue_accepts_only_running_jobs() {
        let pool = JobPool::new(1, 0);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let running = pool
            .try_spawn(JobId(1), async move {
                let _ = release_rx.await;
            })
            .unwrap();
        assert!(pool.try_spawn(JobId(2), async {}).is_err());

        release_tx.send(()).unwrap();
        running.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_limits_concurrency() {
        let pool = JobPool::new(2, 6);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for id in 0..8 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let handle = pool
                .try_spawn(JobId(id), async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap();
            handles.push(handle);
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_job_releases_slot() {
        let pool = JobPool::new(1, 0);
        let handle = pool.try_spawn(JobId(1), async { panic!("boom") }).unwrap();

        let err = handle.await.unwrap_err();
        assert!(err.is_panic());
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.try_spawn(JobId(2), async {}).is_ok());
    }

    #[test]
    fn test_pool_clamps_zero_concurrency() {
        let pool = JobPool::new(0, 3);
        assert_eq!(pool.max_concurrent(), 1);
        assert_eq!(pool.capacity(), 4);
    }

    #[tokio::test]
    async fn test_pool_clamps_oversized_capacity() {
        let pool = JobPool::new(1, usize::MAX / 4);
        assert_eq!(pool.capacity(), Semaphore::MAX_PERMITS);
        assert_eq!(pool.in_flight(), 0);

        let pool = JobPool::new(usize::MAX, usize::MAX);
        assert_eq!(pool.max_concurrent(), Semaphore::MAX_PERMITS);
        assert_eq!(pool.capacity(), Semaphore::MAX_PERMITS);
        assert!(pool.try_spawn(JobId(1), async {}).is_ok());
    }
}
