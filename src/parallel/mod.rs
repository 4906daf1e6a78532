//! Parallel execution helpers shared by the ensembles and the grid search

use rayon::prelude::*;

use crate::error::{Error, Result};

/// Number of worker threads for an `n_jobs` setting: 0 means every core
pub fn resolve_n_jobs(n_jobs: usize) -> usize {
    if n_jobs == 0 {
        num_cpus::get().max(1)
    } else {
        n_jobs
    }
}

/// Applies `f` to every item, in parallel when more than one job is
/// requested. Output order always matches input order, so results do not
/// depend on `n_jobs`. A dedicated pool is built only for an explicit job
/// count requested outside any rayon pool.
pub fn par_map_jobs<T, R, F>(n_jobs: usize, items: &[T], f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Send + Sync,
{
    let threads = resolve_n_jobs(n_jobs);
    if threads == 1 || items.len() < 2 {
        return Ok(items.iter().map(f).collect());
    }
    // n_jobs = 0 runs on the global pool; nested calls stay on the pool
    // they are already running in
    if n_jobs == 0 || rayon::current_thread_index().is_some() {
        return Ok(items.par_iter().map(f).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::ComputationError(format!("failed to start thread pool: {}", e)))?;
    Ok(pool.install(|| items.par_iter().map(f).collect()))
}
