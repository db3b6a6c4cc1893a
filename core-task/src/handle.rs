//! Asynchronous result handle.
//!
//! An [`AsyncHandle`] is returned by manager read operations. It wraps either
//! a value that was already available (a cache hit) or a background unit of
//! work submitted to the shared [`TaskPool`](crate::TaskPool) at construction
//! time.
//!
//! Completion callbacks registered on a pending handle run on the pool task
//! that completes the work, not on the caller's thread. Consumers that need
//! thread affinity (UI updates) must redispatch inside their own callback.

use std::future::Future;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::trace;

use crate::pool::TaskPool;

/// Marker describing a unit of work that was cancelled before it started.
///
/// Error types used with [`AsyncHandle`] convert from this so a cancelled
/// handle can resolve to an ordinary error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

type Callback<T, E> = Box<dyn FnOnce(Result<T, E>) + Send + 'static>;

enum State<T, E> {
    Pending {
        callbacks: Vec<Callback<T, E>>,
        started: bool,
    },
    Resolved(Result<T, E>),
}

struct Inner<T, E> {
    state: Mutex<State<T, E>>,
    ready: Condvar,
}

impl<T, E> Inner<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn lock(&self) -> MutexGuard<'_, State<T, E>> {
        // A poisoned lock only means a callback panicked; the state itself
        // is still coherent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to the resolved state and fire callbacks. The first resolution
    /// wins; later calls are ignored.
    fn resolve(self: &Arc<Self>, outcome: Result<T, E>) {
        let callbacks = {
            let mut state = self.lock();
            match &mut *state {
                State::Resolved(_) => return,
                State::Pending { callbacks, .. } => {
                    let callbacks = std::mem::take(callbacks);
                    *state = State::Resolved(outcome.clone());
                    callbacks
                }
            }
        };
        self.ready.notify_all();
        for callback in callbacks {
            callback(outcome.clone());
        }
    }
}

/// A result from an adapter manager operation.
///
/// Resolves immediately if the data already exists; otherwise the wrapped
/// unit of work runs on the background pool and the handle resolves when it
/// completes. Cloning yields another view of the same pending result.
pub struct AsyncHandle<T, E> {
    inner: Arc<Inner<T, E>>,
    /// True when constructed from a plain value rather than a unit of work.
    immediate: bool,
}

impl<T, E> Clone for AsyncHandle<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            immediate: self.immediate,
        }
    }
}

impl<T, E> AsyncHandle<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Create a handle that is already resolved with `value`.
    pub fn ready(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Resolved(Ok(value))),
                ready: Condvar::new(),
            }),
            immediate: true,
        }
    }

    /// Create a handle that is already resolved with `error`.
    pub fn failed(error: E) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Resolved(Err(error))),
                ready: Condvar::new(),
            }),
            immediate: true,
        }
    }

    /// Submit `work` to the pool and return a pending handle for its result.
    ///
    /// Construction never blocks. If the pool has already been shut down the
    /// returned handle is resolved with a cancellation error.
    pub fn spawn<F>(pool: &TaskPool, work: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: From<Cancelled>,
    {
        if pool.is_shut_down() {
            return Self::resolved(Err(E::from(Cancelled)));
        }

        let inner = Arc::new(Inner {
            state: Mutex::new(State::Pending {
                callbacks: Vec::new(),
                started: false,
            }),
            ready: Condvar::new(),
        });

        let task_inner = Arc::clone(&inner);
        let permits = pool.permits();
        let shutdown = pool.shutdown_token();
        pool.tracker().spawn(async move {
            let _permit = tokio::select! {
                _ = shutdown.cancelled() => {
                    trace!("pool shut down before unit of work started");
                    task_inner.resolve(Err(E::from(Cancelled)));
                    return;
                }
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        task_inner.resolve(Err(E::from(Cancelled)));
                        return;
                    }
                },
            };

            {
                let mut state = task_inner.lock();
                match &mut *state {
                    // Cancelled while still queued.
                    State::Resolved(_) => return,
                    State::Pending { started, .. } => *started = true,
                }
            }

            let outcome = work.await;
            task_inner.resolve(outcome);
        });

        Self {
            inner,
            immediate: false,
        }
    }

    fn resolved(outcome: Result<T, E>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Resolved(outcome)),
                ready: Condvar::new(),
            }),
            immediate: false,
        }
    }

    /// Whether the value can be read without blocking.
    ///
    /// Lets a consumer choose between a synchronous and an asynchronous
    /// continuation strategy.
    pub fn is_available(&self) -> bool {
        matches!(&*self.inner.lock(), State::Resolved(_))
    }

    /// Retrieve the result, blocking the calling thread until the unit of
    /// work completes.
    ///
    /// Propagates whatever error the unit of work produced. Must not be
    /// called from a runtime thread; async callers use [`wait`](Self::wait).
    pub fn result(&self) -> Result<T, E> {
        let mut state = self.inner.lock();
        loop {
            if let State::Resolved(outcome) = &*state {
                return outcome.clone();
            }
            state = self
                .inner
                .ready
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Await the result without blocking a thread.
    pub async fn wait(&self) -> Result<T, E>
    where
        E: From<Cancelled>,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.add_done_callback(move |outcome| {
            let _ = tx.send(outcome);
        });
        // The sender is dropped unfired only if the pool was torn down
        // before the unit of work could resolve.
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(E::from(Cancelled)),
        }
    }

    /// Register `callback` to run once the value is available.
    ///
    /// If the value is already available the callback runs synchronously on
    /// the calling thread before this method returns. Otherwise it runs on
    /// the pool task that completes the work.
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        let outcome = {
            let mut state = self.inner.lock();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    callbacks.push(Box::new(callback));
                    return;
                }
                State::Resolved(outcome) => outcome.clone(),
            }
        };
        callback(outcome);
    }

    /// Best-effort cancellation.
    ///
    /// Returns true if the handle was constructed from a plain value or if a
    /// queued-but-unstarted unit of work was cancelled (the handle then
    /// resolves with a cancellation error). Returns false once the work has
    /// started or finished.
    pub fn cancel(&self) -> bool
    where
        E: From<Cancelled>,
    {
        let callbacks = {
            let mut state = self.inner.lock();
            match &mut *state {
                State::Resolved(_) => return self.immediate,
                State::Pending { started: true, .. } => return false,
                State::Pending { callbacks, .. } => {
                    let callbacks = std::mem::take(callbacks);
                    *state = State::Resolved(Err(E::from(Cancelled)));
                    callbacks
                }
            }
        };
        self.inner.ready.notify_all();
        let outcome: Result<T, E> = Err(E::from(Cancelled));
        for callback in callbacks {
            callback(outcome.clone());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Cancelled,
    }

    impl From<Cancelled> for TestError {
        fn from(_: Cancelled) -> Self {
            TestError::Cancelled
        }
    }

    type Handle<T> = AsyncHandle<T, TestError>;

    #[tokio::test]
    async fn ready_handle_is_immediately_available() {
        let handle: Handle<i32> = AsyncHandle::ready(42);
        assert!(handle.is_available());
        assert_eq!(handle.result(), Ok(42));
    }

    #[tokio::test]
    async fn failed_handle_is_immediately_available() {
        let handle: Handle<i32> = AsyncHandle::failed(TestError::Cancelled);
        assert!(handle.is_available());
        assert_eq!(handle.result(), Err(TestError::Cancelled));
    }

    #[tokio::test]
    async fn ready_handle_runs_callback_synchronously() {
        let handle: Handle<i32> = AsyncHandle::ready(7);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        handle.add_done_callback(move |outcome| {
            assert_eq!(outcome, Ok(7));
            flag.store(true, Ordering::SeqCst);
        });
        // Must have run before add_done_callback returned.
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn spawned_handle_resolves_to_work_output() {
        let pool = TaskPool::new(PoolConfig::default());
        let handle: Handle<i32> = AsyncHandle::spawn(&pool, async { Ok(41 + 1) });
        assert_eq!(handle.wait().await, Ok(42));
        assert!(handle.is_available());
    }

    #[tokio::test]
    async fn spawned_handle_is_pending_until_work_completes() {
        let pool = TaskPool::new(PoolConfig::default());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle: Handle<&'static str> = AsyncHandle::spawn(&pool, async move {
            let _ = rx.await;
            Ok("done")
        });

        assert!(!handle.is_available());
        tx.send(()).expect("receiver alive");
        assert_eq!(handle.wait().await, Ok("done"));
    }

    #[tokio::test]
    async fn callback_receives_value_result_returns_same() {
        let pool = TaskPool::new(PoolConfig::default());
        let handle: Handle<i32> = AsyncHandle::spawn(&pool, async { Ok(5) });

        let (tx, rx) = tokio::sync::oneshot::channel();
        handle.add_done_callback(move |outcome| {
            let _ = tx.send(outcome);
        });
        let from_callback = rx.await.expect("callback fires");
        assert_eq!(from_callback, Ok(5));
        assert_eq!(handle.wait().await, Ok(5));
    }

    #[tokio::test]
    async fn result_blocks_calling_thread_until_completion() {
        let pool = TaskPool::new(PoolConfig::default());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle: Handle<i32> = AsyncHandle::spawn(&pool, async move {
            let _ = rx.await;
            Ok(9)
        });

        let blocking = {
            let handle = handle.clone();
            tokio::task::spawn_blocking(move || handle.result())
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(()).expect("receiver alive");
        assert_eq!(blocking.await.expect("no panic"), Ok(9));
    }

    #[tokio::test]
    async fn cancel_is_trivially_true_for_ready_handles() {
        let handle: Handle<i32> = AsyncHandle::ready(1);
        assert!(handle.cancel());
        // Still resolved with the original value.
        assert_eq!(handle.result(), Ok(1));
    }

    #[tokio::test]
    async fn cancel_queued_work_resolves_with_cancellation() {
        let pool = TaskPool::new(PoolConfig::new(1));
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        // Occupies the single permit.
        let first: Handle<i32> = AsyncHandle::spawn(&pool, async move {
            let _ = started_tx.send(());
            let _ = gate_rx.await;
            Ok(1)
        });
        started_rx.await.expect("first unit of work starts");

        // Queued behind the first, never gets a permit before cancel.
        let second: Handle<i32> = AsyncHandle::spawn(&pool, async { Ok(2) });
        assert!(second.cancel());
        assert_eq!(second.wait().await, Err(TestError::Cancelled));

        gate_tx.send(()).expect("receiver alive");
        assert_eq!(first.wait().await, Ok(1));
    }

    #[tokio::test]
    async fn cancel_running_or_finished_work_returns_false() {
        let pool = TaskPool::new(PoolConfig::default());
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        let running: Handle<i32> = AsyncHandle::spawn(&pool, async move {
            let _ = started_tx.send(());
            let _ = gate_rx.await;
            Ok(3)
        });
        started_rx.await.expect("unit of work starts");
        assert!(!running.cancel());

        gate_tx.send(()).expect("receiver alive");
        assert_eq!(running.wait().await, Ok(3));
        assert!(!running.cancel());
    }

    #[tokio::test]
    async fn spawn_on_shut_down_pool_resolves_cancelled() {
        let pool = TaskPool::new(PoolConfig::default());
        pool.shutdown().await;

        let handle: Handle<i32> = AsyncHandle::spawn(&pool, async { Ok(1) });
        assert!(handle.is_available());
        assert_eq!(handle.result(), Err(TestError::Cancelled));
    }

    #[tokio::test]
    async fn pool_bounds_concurrent_units_of_work() {
        let pool = TaskPool::new(PoolConfig::new(2));
        let third_started = Arc::new(AtomicBool::new(false));

        let mut gates = Vec::new();
        let mut handles: Vec<Handle<i32>> = Vec::new();
        for _ in 0..2 {
            let (tx, rx) = tokio::sync::oneshot::channel::<()>();
            gates.push(tx);
            handles.push(AsyncHandle::spawn(&pool, async move {
                let _ = rx.await;
                Ok(0)
            }));
        }

        let started = Arc::clone(&third_started);
        let third: Handle<i32> = AsyncHandle::spawn(&pool, async move {
            started.store(true, Ordering::SeqCst);
            Ok(0)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!third_started.load(Ordering::SeqCst));

        for gate in gates {
            let _ = gate.send(());
        }
        assert_eq!(third.wait().await, Ok(0));
        assert!(third_started.load(Ordering::SeqCst));
    }
}
