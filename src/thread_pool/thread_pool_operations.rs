//! Sort Worker Pool Operations - Pure DOP Functions

use super::thread_pool_data::{SortThreadPoolConfig, SortWorkerPool, WorkerCounters, WorkerStats};
use crate::error::EngineResult;
use rayon::ThreadPoolBuilder;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Worker count used when the config leaves it at 0
pub fn default_sort_threads() -> usize {
    // Leave a core for the render thread
    num_cpus::get().saturating_sub(1).max(1)
}

/// Build the dedicated sort pool
pub fn create_sort_worker_pool(config: &SortThreadPoolConfig) -> EngineResult<SortWorkerPool> {
    let threads = if config.threads == 0 {
        default_sort_threads()
    } else {
        config.threads
    };

    let prefix = config.thread_name_prefix.clone();
    let mut builder = ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |idx| format!("{}-{}", prefix, idx));

    if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    let pool = builder.build()?;
    log::info!(
        "[SortWorkerPool::create] {} worker threads ({}-*)",
        threads,
        config.thread_name_prefix
    );

    Ok(SortWorkerPool {
        pool: Arc::new(pool),
        counters: Arc::new(WorkerCounters::default()),
        threads,
    })
}

/// Run `job` on the pool without waiting for it
///
/// A panicking job is caught and handed to `on_panic` so the caller can
/// report the failure instead of losing the job silently.
pub fn spawn_job<F, P>(workers: &SortWorkerPool, job: F, on_panic: P)
where
    F: FnOnce() + Send + 'static,
    P: FnOnce(String) + Send + 'static,
{
    let counters = Arc::clone(&workers.counters);
    counters.jobs_submitted.fetch_add(1, Ordering::Relaxed);

    workers.pool.spawn(move || {
        counters.active_jobs.fetch_add(1, Ordering::Relaxed);
        let outcome = catch_unwind(AssertUnwindSafe(job));
        counters.active_jobs.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Ok(()) => {
                counters.jobs_completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                counters.jobs_panicked.fetch_add(1, Ordering::Relaxed);
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "sort job panicked".to_string());
                log::error!("[SortWorkerPool::spawn_job] Job panicked: {}", message);
                on_panic(message);
            }
        }
    });
}

pub fn worker_stats(workers: &SortWorkerPool) -> WorkerStats {
    let counters = &workers.counters;
    WorkerStats {
        threads: workers.threads,
        jobs_submitted: counters.jobs_submitted.load(Ordering::Relaxed),
        jobs_completed: counters.jobs_completed.load(Ordering::Relaxed),
        jobs_panicked: counters.jobs_panicked.load(Ordering::Relaxed),
        active_jobs: counters.active_jobs.load(Ordering::Relaxed),
    }
}
