//! Buffer Pool Operations - Pure DOP Functions
//!
//! Free-list recycler for per-frame scratch. Buffers only grow: a request
//! that no idle buffer satisfies replaces the largest too-small one, and
//! memory is handed back to the allocator only by `trim_idle` or a
//! memory-pressure notification.

use super::pool_data::{
    BufferPoolData, BufferPurpose, MemoryPressure, PoolEntry, PoolOccupancy, PooledBuffer,
    SharedBufferPool, TrimReport,
};
use crate::constants::pool::ELEMENT_SIZE;
use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Create an empty pool
pub fn create_buffer_pool(growth_quantum: usize, max_bytes: u64) -> SharedBufferPool {
    Arc::new(Mutex::new(BufferPoolData {
        idle: FxHashMap::default(),
        leased_buffers: 0,
        leased_bytes: 0,
        idle_bytes: 0,
        growth_quantum: growth_quantum.max(1),
        max_bytes,
        frame: 0,
        total_allocations: 0,
        total_freed: 0,
        next_id: 1,
    }))
}

// ============================================================================
// UTILITIES
// ============================================================================

/// Round `min_capacity` up to a whole number of growth quanta (at least one)
pub fn rounded_capacity(min_capacity: usize, growth_quantum: usize) -> usize {
    let quantum = growth_quantum.max(1);
    let quanta = min_capacity.max(1).div_ceil(quantum);
    quanta.saturating_mul(quantum)
}

fn bytes_of(capacity: usize) -> u64 {
    (capacity * ELEMENT_SIZE) as u64
}

/// Index of the smallest idle buffer that still holds `min_capacity`
fn best_fit(entries: &[PoolEntry], min_capacity: usize) -> Option<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.storage.len() >= min_capacity)
        .min_by_key(|(_, entry)| entry.storage.len())
        .map(|(index, _)| index)
}

fn lease(
    pool: &SharedBufferPool,
    data: &mut BufferPoolData,
    entry: PoolEntry,
    purpose: BufferPurpose,
) -> PooledBuffer {
    let bytes = bytes_of(entry.storage.len());
    data.leased_buffers += 1;
    data.leased_bytes += bytes;

    PooledBuffer {
        id: entry.id,
        purpose,
        storage: Some(entry.storage),
        pool: Arc::downgrade(pool),
    }
}

// ============================================================================
// ACQUIRE / RELEASE
// ============================================================================

/// Lease a buffer of at least `min_capacity` elements for `purpose`
///
/// Reuses the best-fitting idle buffer of the purpose; otherwise allocates
/// a new one (zeroed), discarding the largest too-small idle buffer of the
/// same purpose first. Fails with `OutOfMemory` when the allocation would
/// exceed the pool budget or the allocator refuses it.
pub fn acquire_buffer(
    pool: &SharedBufferPool,
    purpose: BufferPurpose,
    min_capacity: usize,
) -> EngineResult<PooledBuffer> {
    let mut data = pool.lock();

    let reused = data.idle.get_mut(&purpose).and_then(|entries| {
        best_fit(entries, min_capacity).map(|index| entries.swap_remove(index))
    });
    if let Some(entry) = reused {
        data.idle_bytes -= bytes_of(entry.storage.len());
        return Ok(lease(pool, &mut data, entry, purpose));
    }

    // Replace rather than keep a buffer this purpose has outgrown
    let outgrown = data.idle.get_mut(&purpose).and_then(|entries| {
        let largest = entries
            .iter()
            .enumerate()
            .max_by_key(|(_, entry)| entry.storage.len())
            .map(|(index, _)| index)?;
        Some(entries.swap_remove(largest))
    });
    if let Some(entry) = outgrown {
        let bytes = bytes_of(entry.storage.len());
        data.idle_bytes -= bytes;
        data.total_freed += 1;
        log::debug!(
            "[BufferPool::acquire] Discarding outgrown {:?} buffer ({} bytes)",
            purpose,
            bytes
        );
    }

    let capacity = rounded_capacity(min_capacity, data.growth_quantum);
    let requested = bytes_of(capacity);
    let in_use = data.leased_bytes + data.idle_bytes;

    if in_use + requested > data.max_bytes {
        // Idle buffers of other purposes are fair game before failing
        let target = data.max_bytes.saturating_sub(requested);
        evict_idle_until(&mut data, target);
    }
    let in_use = data.leased_bytes + data.idle_bytes;
    if in_use + requested > data.max_bytes {
        log::warn!(
            "[BufferPool::acquire] {:?} needs {} bytes, budget has {} left",
            purpose,
            requested,
            data.max_bytes.saturating_sub(in_use)
        );
        return Err(EngineError::OutOfMemory {
            requested: requested as usize,
            available: data.max_bytes.saturating_sub(in_use) as usize,
        });
    }

    let mut storage: Vec<u32> = Vec::new();
    storage
        .try_reserve_exact(capacity)
        .map_err(|_| EngineError::OutOfMemory {
            requested: requested as usize,
            available: 0,
        })?;
    storage.resize(capacity, 0);

    let id = data.next_id;
    data.next_id += 1;
    data.total_allocations += 1;

    log::trace!(
        "[BufferPool::acquire] Allocated {:?} buffer #{} ({} elements)",
        purpose,
        id,
        capacity
    );

    let frame = data.frame;
    Ok(lease(
        pool,
        &mut data,
        PoolEntry {
            id,
            storage,
            last_used_frame: frame,
        },
        purpose,
    ))
}

/// Hand a lease back to its pool
///
/// Equivalent to dropping it; provided so call sites can say what they mean.
pub fn release_buffer(buffer: PooledBuffer) {
    drop(buffer);
}

/// Return path used by `PooledBuffer::drop`
pub(crate) fn return_storage(
    pool: &Mutex<BufferPoolData>,
    id: u64,
    purpose: BufferPurpose,
    storage: Vec<u32>,
) {
    let mut data = pool.lock();
    let bytes = bytes_of(storage.len());

    data.leased_buffers = data.leased_buffers.saturating_sub(1);
    data.leased_bytes = data.leased_bytes.saturating_sub(bytes);
    data.idle_bytes += bytes;

    let frame = data.frame;
    data.idle.entry(purpose).or_default().push(PoolEntry {
        id,
        storage,
        last_used_frame: frame,
    });
}

// ============================================================================
// TRIMMING
// ============================================================================

/// Free idle buffers, least recently used first, until idle + leased bytes
/// are at most `target_bytes`
fn evict_idle_until(data: &mut BufferPoolData, target_bytes: u64) -> TrimReport {
    let mut report = TrimReport::default();

    while data.leased_bytes + data.idle_bytes > target_bytes {
        let oldest = data
            .idle
            .iter()
            .flat_map(|(purpose, entries)| {
                entries
                    .iter()
                    .enumerate()
                    .map(move |(index, entry)| (*purpose, index, entry.last_used_frame))
            })
            .min_by_key(|(_, _, frame)| *frame);

        let Some((purpose, index, _)) = oldest else {
            break;
        };
        if let Some(entries) = data.idle.get_mut(&purpose) {
            let entry = entries.swap_remove(index);
            let bytes = bytes_of(entry.storage.len());
            data.idle_bytes -= bytes;
            data.total_freed += 1;
            report.buffers_freed += 1;
            report.bytes_freed += bytes;
        }
    }

    report
}

/// Free buffers that have been idle for more than `max_idle_frames`
pub fn trim_idle(pool: &SharedBufferPool, max_idle_frames: u64) -> TrimReport {
    let mut data = pool.lock();
    let frame = data.frame;
    let mut report = TrimReport::default();

    let mut freed_bytes = 0;
    for entries in data.idle.values_mut() {
        entries.retain(|entry| {
            let keep = frame.saturating_sub(entry.last_used_frame) <= max_idle_frames;
            if !keep {
                report.buffers_freed += 1;
                freed_bytes += bytes_of(entry.storage.len());
            }
            keep
        });
    }
    data.idle.retain(|_, entries| !entries.is_empty());

    report.bytes_freed = freed_bytes;
    data.idle_bytes -= freed_bytes;
    data.total_freed += report.buffers_freed as u64;

    if report.buffers_freed > 0 {
        log::debug!(
            "[BufferPool::trim_idle] Freed {} buffers ({} bytes) idle > {} frames",
            report.buffers_freed,
            report.bytes_freed,
            max_idle_frames
        );
    }
    report
}

/// React to a memory-pressure notification from the host
pub fn on_memory_pressure(
    pool: &SharedBufferPool,
    level: MemoryPressure,
    trim_age_frames: u64,
) -> TrimReport {
    let report = match level {
        MemoryPressure::Moderate => trim_idle(pool, trim_age_frames),
        MemoryPressure::Critical => {
            let mut data = pool.lock();
            let leased = data.leased_bytes;
            evict_idle_until(&mut data, leased)
        }
    };

    log::info!(
        "[BufferPool::on_memory_pressure] {:?}: released {} buffers ({} bytes)",
        level,
        report.buffers_freed,
        report.bytes_freed
    );
    report
}

/// Advance the pool's frame clock; returns the new frame
pub fn advance_frame(pool: &SharedBufferPool) -> u64 {
    let mut data = pool.lock();
    data.frame += 1;
    data.frame
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

/// Snapshot of idle and leased buffers
pub fn pool_occupancy(pool: &SharedBufferPool) -> PoolOccupancy {
    let data = pool.lock();
    PoolOccupancy {
        idle_buffers: data.idle.values().map(Vec::len).sum(),
        idle_bytes: data.idle_bytes,
        leased_buffers: data.leased_buffers,
        leased_bytes: data.leased_bytes,
        total_allocations: data.total_allocations,
        total_freed: data.total_freed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUANTUM: usize = 1024;

    fn pool() -> SharedBufferPool {
        create_buffer_pool(QUANTUM, 64 * 1024 * 1024)
    }

    #[test]
    fn test_capacity_rounds_to_quantum() {
        assert_eq!(rounded_capacity(1, 1024), 1024);
        assert_eq!(rounded_capacity(1024, 1024), 1024);
        assert_eq!(rounded_capacity(1025, 1024), 2048);
        assert_eq!(rounded_capacity(0, 1024), 1024);
    }

    #[test]
    fn test_release_then_acquire_reuses_buffer() {
        let pool = pool();
        let first = acquire_buffer(&pool, BufferPurpose::SortKeys, 5000).expect("acquire");
        let id = first.id();
        release_buffer(first);

        let second = acquire_buffer(&pool, BufferPurpose::SortKeys, 4000).expect("acquire");
        assert_eq!(second.id(), id);
        assert_eq!(pool_occupancy(&pool).total_allocations, 1);
    }

    #[test]
    fn test_missing_purpose_allocates_exactly_one() {
        let pool = pool();
        drop(acquire_buffer(&pool, BufferPurpose::SortKeys, 100).expect("acquire"));

        let _indices = acquire_buffer(&pool, BufferPurpose::SortIndices, 100).expect("acquire");
        assert_eq!(pool_occupancy(&pool).total_allocations, 2);
    }

    #[test]
    fn test_best_fit_prefers_smallest_sufficient() {
        let pool = pool();
        let small = acquire_buffer(&pool, BufferPurpose::Distances, 1000).expect("small");
        let large = acquire_buffer(&pool, BufferPurpose::Distances, 8000).expect("large");
        let (small_id, large_id) = (small.id(), large.id());
        drop(small);
        drop(large);

        let fit = acquire_buffer(&pool, BufferPurpose::Distances, 900).expect("fit");
        assert_eq!(fit.id(), small_id);
        let big = acquire_buffer(&pool, BufferPurpose::Distances, 2000).expect("big");
        assert_eq!(big.id(), large_id);
    }

    #[test]
    fn test_outgrown_buffer_is_replaced() {
        let pool = pool();
        drop(acquire_buffer(&pool, BufferPurpose::SortKeys, 1000).expect("acquire"));

        let bigger = acquire_buffer(&pool, BufferPurpose::SortKeys, 10_000).expect("grow");
        assert!(bigger.capacity() >= 10_000);

        let occupancy = pool_occupancy(&pool);
        assert_eq!(occupancy.idle_buffers, 0);
        assert_eq!(occupancy.total_freed, 1);
        assert_eq!(occupancy.total_allocations, 2);
    }

    #[test]
    fn test_leases_are_never_shared() {
        let pool = pool();
        let a = acquire_buffer(&pool, BufferPurpose::SortKeys, 100).expect("a");
        let b = acquire_buffer(&pool, BufferPurpose::SortKeys, 100).expect("b");
        assert_ne!(a.id(), b.id());
        assert_eq!(pool_occupancy(&pool).leased_buffers, 2);
    }

    #[test]
    fn test_trim_frees_only_stale_buffers() {
        let pool = pool();
        drop(acquire_buffer(&pool, BufferPurpose::SortKeys, 100).expect("old"));
        for _ in 0..5 {
            advance_frame(&pool);
        }
        drop(acquire_buffer(&pool, BufferPurpose::SortIndices, 100).expect("fresh"));

        let report = trim_idle(&pool, 3);
        assert_eq!(report.buffers_freed, 1);
        assert_eq!(report.bytes_freed, (QUANTUM * ELEMENT_SIZE) as u64);
        assert_eq!(pool_occupancy(&pool).idle_buffers, 1);
    }

    #[test]
    fn test_budget_exceeded_is_out_of_memory() {
        let pool = create_buffer_pool(QUANTUM, 8 * 1024);
        let held = acquire_buffer(&pool, BufferPurpose::SortKeys, 1024).expect("fits");

        let result = acquire_buffer(&pool, BufferPurpose::SortIndices, 2048);
        assert!(matches!(result, Err(EngineError::OutOfMemory { .. })));
        drop(held);
    }

    #[test]
    fn test_budget_evicts_idle_before_failing() {
        let pool = create_buffer_pool(QUANTUM, 8 * 1024);
        drop(acquire_buffer(&pool, BufferPurpose::SortKeys, 1024).expect("fits"));

        // 4 KiB idle + 8 KiB requested exceeds the budget until the idle one goes
        let indices = acquire_buffer(&pool, BufferPurpose::SortIndices, 2048).expect("evicted");
        assert_eq!(indices.capacity(), 2048);
        assert_eq!(pool_occupancy(&pool).idle_buffers, 0);
    }

    #[test]
    fn test_critical_pressure_frees_all_idle() {
        let pool = pool();
        let held = acquire_buffer(&pool, BufferPurpose::Distances, 100).expect("held");
        drop(acquire_buffer(&pool, BufferPurpose::SortKeys, 100).expect("idle"));
        drop(acquire_buffer(&pool, BufferPurpose::SortIndices, 100).expect("idle"));

        let report = on_memory_pressure(&pool, MemoryPressure::Critical, 120);
        assert_eq!(report.buffers_freed, 2);

        let occupancy = pool_occupancy(&pool);
        assert_eq!(occupancy.idle_buffers, 0);
        assert_eq!(occupancy.leased_buffers, 1);
        drop(held);
        assert_eq!(pool_occupancy(&pool).idle_buffers, 1);
    }

    #[test]
    fn test_float_view_shares_storage() {
        let pool = pool();
        let mut buffer = acquire_buffer(&pool, BufferPurpose::Distances, 4).expect("acquire");
        buffer.as_f32_mut(4).copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buffer.as_u32(1)[0], 1.0f32.to_bits());
    }

    #[test]
    fn test_concurrent_acquire_release() {
        use rayon::prelude::*;

        let pool = pool();
        (0..64).into_par_iter().for_each(|i| {
            let mut buffer =
                acquire_buffer(&pool, BufferPurpose::SortKeys, 256 + i).expect("acquire");
            buffer.as_u32_mut(1)[0] = i as u32;
        });

        let occupancy = pool_occupancy(&pool);
        assert_eq!(occupancy.leased_buffers, 0);
        assert_eq!(occupancy.idle_buffers as u64, occupancy.total_allocations - occupancy.total_freed);
    }
}
