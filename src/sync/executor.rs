//! Fixed-size parallel-for executor.
//!
//! [`ParallelExecutor`] runs a unit of work for every index in `0..n` on a
//! dedicated rayon thread pool and blocks until all invocations have returned.
//! Results come back in index order regardless of which worker ran what.
//!
//! # Guarantees
//!
//! - Each index is processed exactly once, by exactly one worker.
//! - No cancellation: every dispatched unit runs to completion. Failures are
//!   returned as values in the result vector, never raised from a worker.
//! - With one thread the work runs inline on the caller, in index order, and
//!   produces the same results as the multi-threaded path.
//!
//! ```
//! use fuseshard::sync::ParallelExecutor;
//!
//! let executor = ParallelExecutor::new(4).unwrap();
//! let squares = executor.run(8, |i, _worker| i * i);
//! assert_eq!(squares, vec![0, 1, 4, 9, 16, 25, 36, 49]);
//! ```

use crate::error::{FuseShardError, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a caller and running work.
///
/// Cloning shares the same flag. Work already in progress is never interrupted;
/// callers check [`is_cancelled`](Self::is_cancelled) before starting each unit.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Parallel-for over an index range with a fixed number of workers.
pub struct ParallelExecutor {
    threads: usize,
    pool: Option<ThreadPool>,
}

impl std::fmt::Debug for ParallelExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelExecutor")
            .field("threads", &self.threads)
            .field("inline", &self.pool.is_none())
            .finish()
    }
}

impl ParallelExecutor {
    /// Create an executor with `threads` workers.
    ///
    /// # Errors
    ///
    /// - [`FuseShardError::Configuration`] if `threads == 0`
    /// - [`FuseShardError::Executor`] if the worker threads cannot be spawned
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(FuseShardError::configuration(
                "thread count must be greater than 0",
            ));
        }

        let pool = if threads == 1 {
            None
        } else {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("fuseshard-worker-{}", i))
                .build()
                .map_err(|e| FuseShardError::executor(e.to_string()))?;
            Some(pool)
        };

        Ok(Self { threads, pool })
    }

    /// Number of workers.
    #[inline]
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Run `f(index, worker_id)` for every index in `0..n`.
    ///
    /// Blocks until all `n` invocations complete. `worker_id` is in
    /// `0..thread_count()`; work must not depend on it for correctness.
    pub fn run<R, F>(&self, n: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize, usize) -> R + Sync + Send,
    {
        match &self.pool {
            None => (0..n).map(|i| f(i, 0)).collect(),
            Some(pool) => pool.install(|| {
                (0..n)
                    .into_par_iter()
                    .with_max_len(1)
                    .map(|i| f(i, worker_id()))
                    .collect()
            }),
        }
    }

    /// Run `f(index, &mut items[index], worker_id)` for every element.
    ///
    /// Each element is borrowed mutably by exactly one worker, so elements need
    /// no synchronization of their own.
    pub fn run_mut<T, R, F>(&self, items: &mut [T], f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(usize, &mut T, usize) -> R + Sync + Send,
    {
        match &self.pool {
            None => items
                .iter_mut()
                .enumerate()
                .map(|(i, item)| f(i, item, 0))
                .collect(),
            Some(pool) => pool.install(|| {
                items
                    .par_iter_mut()
                    .with_max_len(1)
                    .enumerate()
                    .map(|(i, item)| f(i, item, worker_id()))
                    .collect()
            }),
        }
    }
}

#[inline]
fn worker_id() -> usize {
    rayon::current_thread_index().unwrap_or(0)
}
