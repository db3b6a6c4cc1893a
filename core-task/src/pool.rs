//! Fixed-size background execution pool.
//!
//! All ground-truth fetches and cache-ingestion tasks run on one shared pool.
//! The pool bounds how many units of work execute concurrently (a semaphore,
//! not a dedicated thread set — tasks run on the ambient tokio runtime) and
//! tracks every spawned task so that shutdown can drain them.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Configuration for a [`TaskPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of units of work executing at the same time.
    pub max_concurrent: usize,
}

impl PoolConfig {
    pub fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    /// Set the maximum number of concurrent units of work.
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_concurrent: 8 }
    }
}

/// Shared fixed-size background execution pool.
///
/// Cheap to clone; all clones refer to the same pool.
#[derive(Clone)]
pub struct TaskPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl TaskPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                tracker: TaskTracker::new(),
                permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Spawn a fire-and-forget task on the pool.
    ///
    /// Returns false (and drops the future unpolled) if the pool has already
    /// been shut down. The task is tracked and will be drained by
    /// [`TaskPool::shutdown`].
    pub fn spawn_detached<F>(&self, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.shutdown.is_cancelled() {
            debug!("pool is shut down, refusing detached task");
            return false;
        }
        self.inner.tracker.spawn(future);
        true
    }

    /// Whether the pool has stopped accepting new work.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop accepting new work and wait for all in-flight tasks to finish.
    ///
    /// Queued-but-unstarted units of work resolve as cancelled; work already
    /// executing runs to completion. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    pub(crate) fn permits(&self) -> Arc<Semaphore> {
        Arc::clone(&self.inner.permits)
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.inner.tracker
    }
}
