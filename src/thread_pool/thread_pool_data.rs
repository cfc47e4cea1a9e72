//! Sort Worker Pool Data - Pure DOP
//!
//! NO METHODS. Just data.

use std::sync::atomic::{AtomicU64, AtomicUsize};
use std::sync::Arc;

/// Configuration for the dedicated sort pool
#[derive(Debug, Clone)]
pub struct SortThreadPoolConfig {
    /// Worker threads; 0 picks a default from the CPU count
    pub threads: usize,
    /// Worker names are `{prefix}-{index}`
    pub thread_name_prefix: String,
    /// Stack size for worker threads (in bytes)
    pub stack_size: Option<usize>,
}

/// Lock-free job counters
#[derive(Debug, Default)]
pub struct WorkerCounters {
    pub jobs_submitted: AtomicU64,
    pub jobs_completed: AtomicU64,
    pub jobs_panicked: AtomicU64,
    pub active_jobs: AtomicUsize,
}

/// Rayon pool the asynchronous sort jobs run on
#[derive(Clone)]
pub struct SortWorkerPool {
    pub pool: Arc<rayon::ThreadPool>,
    pub counters: Arc<WorkerCounters>,
    pub threads: usize,
}

/// Snapshot of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub threads: usize,
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_panicked: u64,
    pub active_jobs: usize,
}

impl Default for SortThreadPoolConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            thread_name_prefix: "splat-sort".to_string(),
            stack_size: Some(2 * 1024 * 1024), // 2MB stack per thread
        }
    }
}
