//! Rayon thread pool configuration for per-location update runs.
//!
//! Each location's update touches only its own series file, so locations can
//! be processed on any number of threads without coordination.

use rayon::ThreadPoolBuilder;

use crate::error::{Error, Result};

/// Configures how many worker threads process locations in parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerPool {
    /// Number of worker threads. If 0, use Rayon default (num_cpus).
    pub workers: usize,
}

impl WorkerPool {
    /// Use exactly `n` worker threads.
    pub fn with_workers(n: usize) -> Self {
        Self { workers: n }
    }

    /// Run a closure on a thread pool with this worker count. If [workers](WorkerPool::workers) is 0,
    /// uses the global Rayon pool (all cores). Otherwise builds a temporary pool with that many threads.
    pub fn install<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        if self.workers == 0 {
            return Ok(f());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|index| format!("vaxseries-worker-{index}"))
            .build()
            .map_err(|err| Error::Config(format!("unable to build worker pool: {err}")))?;
        Ok(pool.install(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_pool_runs_closure_on_its_threads() {
        let pool = WorkerPool::with_workers(2);
        let threads = pool.install(rayon::current_num_threads).unwrap();
        assert_eq!(threads, 2);
    }

    #[test]
    fn default_pool_runs_inline() {
        assert_eq!(WorkerPool::default().install(|| 7).unwrap(), 7);
    }
}
