//! Bounded-concurrency worker pool.
//!
//! A [`WorkerPool`] runs a work function over submitted items with at most
//! `max_workers` items executing at the same time. Items submitted while all
//! workers are busy wait for a free slot in submission order. A batch is
//! everything submitted since the pool was created or last reset, and is
//! collected with [`WorkerPool::await_all`].

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, trace};

/// Work function applied to every submitted item.
pub type WorkFn<I, R> = Arc<dyn Fn(I) -> BoxFuture<'static, R> + Send + Sync>;

/// A pool executing submitted items with bounded concurrency.
///
/// The work function is expected to turn failures into values of `R`; the
/// pool does not special-case them. A task that panics or is aborted yields
/// no result.
pub struct WorkerPool<I, R> {
    /// Pool name used in log output.
    name: String,
    /// Maximum concurrent workers.
    max_workers: usize,
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Work function.
    work: WorkFn<I, R>,
    /// Submitted, not yet collected tasks.
    tasks: JoinSet<R>,
}

impl<I, R> WorkerPool<I, R>
where
    I: Send + 'static,
    R: Send + 'static,
{
    /// Create a pool running `work` on at most `max_workers` items at once.
    ///
    /// A `max_workers` of 0 is treated as 1.
    pub fn new<F, Fut>(name: impl Into<String>, max_workers: usize, work: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let max_workers = max_workers.max(1);
        Self {
            name: name.into(),
            max_workers,
            semaphore: Arc::new(Semaphore::new(max_workers)),
            work: Arc::new(move |item: I| work(item).boxed()),
            tasks: JoinSet::new(),
        }
    }

    /// Submit an item. It starts as soon as a worker slot is free.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&mut self, item: I) {
        let semaphore = self.semaphore.clone();
        let work = self.work.clone();
        self.tasks.spawn(async move {
            // The semaphore is never closed, a failed acquire only happens on shutdown.
            let _permit = semaphore.acquire_owned().await.ok();
            work(item).await
        });
        trace!("{} pool: submitted item, {} pending", self.name, self.tasks.len());
    }

    /// Wait until every submitted item has completed and return the results
    /// in completion order.
    ///
    /// If this future is dropped before it completes (for example by a
    /// timeout), results collected so far are lost and the remaining tasks
    /// keep running until [`reset`](Self::reset) is called or the pool is dropped.
    pub async fn await_all(&mut self) -> Vec<R> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) if e.is_cancelled() => {
                    debug!("{} pool: task was aborted", self.name);
                }
                Err(e) => {
                    error!("{} pool: task panicked: {}", self.name, e);
                }
            }
        }
        results
    }

    /// Abort all outstanding work and return the pool to its empty state.
    pub fn reset(&mut self) {
        let outstanding = self.tasks.len();
        if outstanding > 0 {
            debug!(
                "{} pool: aborting {} outstanding tasks",
                self.name, outstanding
            );
        }
        self.tasks.abort_all();
        self.tasks = JoinSet::new();
        self.semaphore = Arc::new(Semaphore::new(self.max_workers));
    }

    /// Number of submitted items not yet collected.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Number of items currently executing.
    pub fn active_count(&self) -> usize {
        self.max_workers - self.semaphore.available_permits()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_await_all_empty() {
        let mut pool = WorkerPool::new("test", 2, |x: u32| async move { x });
        assert!(pool.await_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_results_collected() {
        let mut pool = WorkerPool::new("test", 3, |x: u32| async move { x * 2 });
        for i in 0..5 {
            pool.submit(i);
        }
        assert_eq!(pool.pending(), 5);

        let mut results = pool.await_all().await;
        results.sort();
        assert_eq!(results, vec![0, 2, 4, 6, 8]);
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_order() {
        let mut pool = WorkerPool::new("test", 3, |ms: u64| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            ms
        });
        pool.submit(300);
        pool.submit(100);
        pool.submit(200);

        assert_eq!(pool.await_all().await, vec![100, 200, 300]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut pool = {
            let running = running.clone();
            let peak = peak.clone();
            WorkerPool::new("test", 2, move |_: usize| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            })
        };

        let start = Instant::now();
        for i in 0..3 {
            pool.submit(i);
        }
        pool.await_all().await;
        let elapsed = start.elapsed();

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        // Two waves of 100ms each.
        assert!(elapsed >= Duration::from_millis(200), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(300), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_aborts_outstanding_work() {
        let completed = Arc::new(AtomicUsize::new(0));
        let mut pool = {
            let completed = completed.clone();
            WorkerPool::new("test", 1, move |_: usize| {
                let completed = completed.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        pool.submit(1);
        pool.submit(2);
        let timed_out = tokio::time::timeout(Duration::from_millis(50), pool.await_all()).await;
        assert!(timed_out.is_err());

        pool.reset();
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.active_count(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 0);

        // The pool is usable again after a reset.
        pool.submit(3);
        assert_eq!(pool.await_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_task_yields_no_result() {
        let mut pool = WorkerPool::new("test", 2, |x: u32| async move {
            if x == 1 {
                panic!("worker failure");
            }
            x
        });
        pool.submit(0);
        pool.submit(1);
        pool.submit(2);

        let mut results = pool.await_all().await;
        results.sort();
        assert_eq!(results, vec![0, 2]);
    }

    #[test]
    fn test_zero_workers_treated_as_one() {
        let pool = WorkerPool::new("test", 0, |x: u32| async move { x });
        assert_eq!(pool.max_workers(), 1);
        assert_eq!(pool.name(), "test");
    }
}
