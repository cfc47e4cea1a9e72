//! Buffer Pool - reusable scratch allocations for per-frame sort work
//!
//! - pool_data.rs: Pool state, leases and reports
//! - pool_operations.rs: Acquire, release, trim and diagnostics

pub mod pool_data;
pub mod pool_operations;

pub use pool_data::{
    BufferPoolData, BufferPurpose, MemoryPressure, PoolEntry, PoolOccupancy, PooledBuffer,
    SharedBufferPool, TrimReport,
};
pub use pool_operations::{
    acquire_buffer, advance_frame, create_buffer_pool, on_memory_pressure, pool_occupancy,
    release_buffer, rounded_capacity, trim_idle,
};
