//! The render worker pool.
//!
//! The pool is an owned resource injected into the [`crate::Canvas`] at
//! construction, never a process-wide singleton: tests substitute a
//! one-thread pool and get deterministic, sequential row execution.

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

pub struct RenderPool {
    pool: ThreadPool,
}

impl RenderPool {
    /// Build a pool with the given worker count; 0 picks one worker per
    /// available core.
    pub fn threaded(num_threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;
        log::info!("render pool: {} worker(s)", pool.current_num_threads());
        Ok(Self { pool })
    }

    /// One worker: row tasks run sequentially in submission order.
    pub fn single_threaded() -> Result<Self, ThreadPoolBuildError> {
        Self::threaded(1)
    }

    /// Run a parallel section on this pool. Rayon constructs inside the
    /// closure (par_iter etc.) are serviced by this pool's workers, not the
    /// global one.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}
