//! Sort Worker Pool - dedicated rayon pool for asynchronous sort jobs

pub mod thread_pool_data;
pub mod thread_pool_operations;

pub use thread_pool_data::{SortThreadPoolConfig, SortWorkerPool, WorkerCounters, WorkerStats};
pub use thread_pool_operations::{
    create_sort_worker_pool, default_sort_threads, spawn_job, worker_stats,
};
