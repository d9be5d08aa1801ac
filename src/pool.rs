//! Bounded worker pool for CPU-bound transforms.
//!
//! The event loop runs on a single thread and must never decode, filter or
//! encode an image inline. [`WorkerPool::submit`] hands a closure to a
//! dedicated [rayon](https://docs.rs/rayon) pool of `N` threads and returns a
//! future that resolves once the closure has run.
//!
//! ## Guarantees
//!
//! - At most `N` task bodies execute at once; the rest wait in rayon's global
//!   injector queue, which is FIFO for tasks spawned from outside the pool.
//! - `submit` never blocks: it only enqueues.
//! - Dropping the returned future (e.g. a deadline fired) does not cancel the
//!   task. It runs to completion and its result is discarded when the
//!   completion channel finds no receiver.
//! - A panicking task is reported as [`PoolError::WorkerLost`] to its awaiter;
//!   the pool keeps serving.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool could not be built: {0}")]
    Build(String),
    #[error("transform task ended without a result")]
    WorkerLost,
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    size: usize,
    in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter however the task ends.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerPool {
    /// Build a pool with `size` worker threads (at least one).
    pub fn new(size: usize) -> Result<Self, PoolError> {
        let size = size.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("transform-{i}"))
            .panic_handler(|_| tracing::error!("transform task panicked"))
            .build()
            .map_err(|e| PoolError::Build(e.to_string()))?;
        Ok(Self {
            pool,
            size,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks submitted and not yet finished (queued or running).
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Queue `task` and return a future for its result.
    ///
    /// The task is enqueued before this returns, whether or not the future is
    /// ever polled.
    pub fn submit<F, T>(
        &self,
        task: F,
    ) -> impl Future<Output = Result<T, PoolError>> + Send + 'static
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(Arc::clone(&self.in_flight));

        self.pool.spawn_fifo(move || {
            let result = task();
            drop(guard);
            if tx.send(result).is_err() {
                tracing::debug!("transform result discarded, awaiting side gave up");
            }
        });

        async move { rx.await.map_err(|_| PoolError::WorkerLost) }
    }
}
