//! Buffer Pool Data - Pure DOP
//!
//! NO METHODS beyond slice access on the lease. All pool transformations
//! happen in pool_operations.rs

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::{Arc, Weak};

/// What a scratch buffer is used for; buffers are only reused within a purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BufferPurpose {
    /// Raw per-point distances
    Distances,
    /// Sort keys (order-preserving u32)
    SortKeys,
    /// Ping-pong key storage for radix passes
    SortKeysAlt,
    /// Index permutation being built
    SortIndices,
    /// Ping-pong index storage for radix passes
    SortIndicesAlt,
}

/// An idle allocation waiting in the pool
#[derive(Debug)]
pub struct PoolEntry {
    pub id: u64,
    pub storage: Vec<u32>,
    /// Frame in which the buffer was last returned
    pub last_used_frame: u64,
}

/// Pool state shared by every thread that acquires scratch
#[derive(Debug)]
pub struct BufferPoolData {
    /// Idle buffers per purpose
    pub idle: FxHashMap<BufferPurpose, Vec<PoolEntry>>,

    /// Buffers currently handed out
    pub leased_buffers: usize,
    pub leased_bytes: u64,

    /// Sum of idle buffer sizes
    pub idle_bytes: u64,

    /// Capacities are rounded up to a multiple of this (elements)
    pub growth_quantum: usize,

    /// Byte budget across idle and leased buffers
    pub max_bytes: u64,

    /// Frame counter used to age idle buffers
    pub frame: u64,

    /// Allocations performed since creation
    pub total_allocations: u64,

    /// Buffers freed by trimming or replacement
    pub total_freed: u64,

    pub next_id: u64,
}

/// Shared pool handle
pub type SharedBufferPool = Arc<Mutex<BufferPoolData>>;

/// A leased scratch buffer
///
/// The buffer goes back to its pool when dropped (or passed to
/// `release_buffer`), so it can never be visible to two jobs at once.
#[derive(Debug)]
pub struct PooledBuffer {
    pub(crate) id: u64,
    pub(crate) purpose: BufferPurpose,
    pub(crate) storage: Option<Vec<u32>>,
    pub(crate) pool: Weak<Mutex<BufferPoolData>>,
}

/// Point-in-time pool occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PoolOccupancy {
    pub idle_buffers: usize,
    pub idle_bytes: u64,
    pub leased_buffers: usize,
    pub leased_bytes: u64,
    pub total_allocations: u64,
    pub total_freed: u64,
}

/// Outcome of a trim pass
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrimReport {
    pub buffers_freed: usize,
    pub bytes_freed: u64,
}

/// Severity of an external memory-pressure notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    /// Free buffers idle longer than the configured age
    Moderate,
    /// Free every idle buffer
    Critical,
}

impl PooledBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn purpose(&self) -> BufferPurpose {
        self.purpose
    }

    /// Capacity in 4-byte elements
    pub fn capacity(&self) -> usize {
        self.storage.as_ref().map_or(0, Vec::len)
    }

    /// First `len` elements as u32
    pub fn as_u32(&self, len: usize) -> &[u32] {
        &self.words()[..len]
    }

    /// First `len` elements as mutable u32
    pub fn as_u32_mut(&mut self, len: usize) -> &mut [u32] {
        &mut self.words_mut()[..len]
    }

    /// First `len` elements reinterpreted as f32
    pub fn as_f32(&self, len: usize) -> &[f32] {
        bytemuck::cast_slice(self.as_u32(len))
    }

    /// First `len` elements reinterpreted as mutable f32
    pub fn as_f32_mut(&mut self, len: usize) -> &mut [f32] {
        bytemuck::cast_slice_mut(self.as_u32_mut(len))
    }

    fn words(&self) -> &[u32] {
        self.storage.as_deref().unwrap_or(&[])
    }

    fn words_mut(&mut self) -> &mut [u32] {
        self.storage.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            if let Some(pool) = self.pool.upgrade() {
                super::pool_operations::return_storage(&pool, self.id, self.purpose, storage);
            }
        }
    }
}
