//! Point Store Operations - Pure DOP Functions
//!
//! Functions take the store data and transform it. Every fallible path
//! validates and reserves before touching any buffer, so a rejected batch
//! leaves both staging and active exactly as they were.

use super::color_packing::pack_color_snorm10a2;
use super::point_data::{
    AxisBounds, GenerationId, GpuPoint, Point, PointBuffer, PointStoreData, PointView, StagingData,
    StoreLimits,
};
use crate::constants::points::{
    BASE_BYTES_PER_POINT, MAX_SH_DEGREE, MIN_CAPACITY, RADIUS_BYTES, SH_COEFFICIENT_BYTES,
};
use crate::error::{EngineError, EngineResult};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Shared point store handle used by ingestion and render threads
pub type SharedPointStore = Arc<PointStoreData>;

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Create an empty buffer tagged with `generation`
pub fn create_point_buffer(generation: GenerationId) -> PointBuffer {
    PointBuffer {
        generation,
        positions: Vec::new(),
        colors: Vec::new(),
        sh_rest: Vec::new(),
        radii: Vec::new(),
        sh_degree: None,
        capacity: 0,
        bounds: None,
    }
}

/// Create a store whose active buffer is empty (generation 0)
pub fn create_point_store(limits: StoreLimits) -> PointStoreData {
    PointStoreData {
        active: RwLock::new(Arc::new(create_point_buffer(GenerationId(0)))),
        staging: Mutex::new(StagingData {
            next_generation: 1,
            ..Default::default()
        }),
        limits,
    }
}

/// Create a store wrapped for sharing between threads
pub fn create_shared_point_store(limits: StoreLimits) -> SharedPointStore {
    Arc::new(create_point_store(limits))
}

// ============================================================================
// LAYOUT
// ============================================================================

/// Number of RGB rest coefficients for an SH degree
pub fn sh_coefficient_count(degree: u8) -> usize {
    let d = degree as usize;
    (d + 1) * (d + 1) - 1
}

/// Inverse of `sh_coefficient_count`; None for counts no degree produces
pub fn sh_degree_for_count(count: usize) -> Option<u8> {
    (0..=MAX_SH_DEGREE).find(|&degree| sh_coefficient_count(degree) == count)
}

/// Bytes one point occupies in an interleaved upload
pub fn bytes_per_point(sh_degree: u8) -> u64 {
    BASE_BYTES_PER_POINT + RADIUS_BYTES + sh_coefficient_count(sh_degree) as u64 * SH_COEFFICIENT_BYTES
}

/// Most points a single allocation can hold at the given SH degree
///
/// Never more than `u32::MAX`: permutation indices are `u32`.
pub fn max_points(limits: &StoreLimits, sh_degree: u8) -> usize {
    let by_bytes = limits.max_allocation_bytes / bytes_per_point(sh_degree);
    by_bytes.min(u32::MAX as u64) as usize
}

/// Capacity to grow to so that `required` points fit, clamped to the device
/// maximum. Fails when even the clamped capacity is too small.
pub fn grown_capacity(current: usize, required: usize, max: usize) -> EngineResult<usize> {
    if required > max {
        return Err(EngineError::CapacityExceeded {
            requested: required,
            max,
        });
    }
    if required <= current {
        return Ok(current.min(max));
    }

    let next = required
        .checked_next_power_of_two()
        .unwrap_or(usize::MAX)
        .max(MIN_CAPACITY);
    Ok(next.min(max))
}

// ============================================================================
// INGESTION
// ============================================================================

/// Check a batch against the SH degree already fixed for the buffer
fn validate_batch(points: &[Point], buffer_degree: Option<u8>) -> EngineResult<Option<u8>> {
    let mut degree = buffer_degree;

    for (i, point) in points.iter().enumerate() {
        if !point.position.iter().all(|c| c.is_finite()) {
            return Err(EngineError::InvalidInput {
                reason: format!("point {} has a non-finite position", i),
            });
        }

        let point_degree = sh_degree_for_count(point.sh_rest.len()).ok_or_else(|| {
            EngineError::InvalidInput {
                reason: format!(
                    "point {} has {} SH coefficients, which matches no degree",
                    i,
                    point.sh_rest.len()
                ),
            }
        })?;

        match degree {
            Some(expected) if expected != point_degree => {
                return Err(EngineError::InvalidInput {
                    reason: format!(
                        "point {} has SH degree {}, buffer holds degree {}",
                        i, point_degree, expected
                    ),
                });
            }
            Some(_) => {}
            None => degree = Some(point_degree),
        }
    }

    Ok(degree)
}

/// Reserve room in every SoA array for `capacity` points
fn reserve_capacity(buffer: &mut PointBuffer, capacity: usize, sh_stride: usize) -> EngineResult<()> {
    let additional = capacity.saturating_sub(buffer.positions.len());
    let out_of_memory = |_| EngineError::OutOfMemory {
        requested: capacity.saturating_mul(sh_stride.max(1) * 12 + 32),
        available: 0,
    };

    buffer.positions.try_reserve_exact(additional).map_err(out_of_memory)?;
    buffer.colors.try_reserve_exact(additional).map_err(out_of_memory)?;
    buffer.radii.try_reserve_exact(additional).map_err(out_of_memory)?;
    if sh_stride > 0 {
        let sh_additional = (capacity * sh_stride).saturating_sub(buffer.sh_rest.len());
        buffer.sh_rest.try_reserve_exact(sh_additional).map_err(out_of_memory)?;
    }
    buffer.capacity = capacity;
    Ok(())
}

fn extend_bounds(bounds: Option<AxisBounds>, position: [f32; 3]) -> AxisBounds {
    match bounds {
        Some(mut b) => {
            for axis in 0..3 {
                b.min[axis] = b.min[axis].min(position[axis]);
                b.max[axis] = b.max[axis].max(position[axis]);
            }
            b
        }
        None => AxisBounds {
            min: position,
            max: position,
        },
    }
}

/// Append already-validated points; capacity must already be reserved
fn append_points(buffer: &mut PointBuffer, points: &[Point]) {
    for point in points {
        buffer.positions.push(point.position);
        buffer.colors.push(point.color);
        buffer.sh_rest.extend_from_slice(&point.sh_rest);
        buffer.radii.push(point.bounding_radius.unwrap_or(0.0));
        buffer.bounds = Some(extend_bounds(buffer.bounds, point.position));
    }
}

/// Fresh buffer for the next generation, reusing recycled storage if any
fn take_blank_buffer(staging: &mut StagingData) -> PointBuffer {
    let generation = GenerationId(staging.next_generation);
    staging.next_generation += 1;

    match staging.recycled.take() {
        Some(mut buffer) => {
            buffer.generation = generation;
            buffer.positions.clear();
            buffer.colors.clear();
            buffer.sh_rest.clear();
            buffer.radii.clear();
            buffer.sh_degree = None;
            buffer.capacity = 0;
            buffer.bounds = None;
            buffer
        }
        None => create_point_buffer(generation),
    }
}

/// Stage `points` into `target`, growing it within the device limits
fn stage_into(target: &mut PointBuffer, points: &[Point], limits: &StoreLimits) -> EngineResult<()> {
    let degree = validate_batch(points, target.sh_degree)?;
    let Some(degree) = degree else {
        // Empty batch into an empty buffer
        return Ok(());
    };

    let required = target.positions.len() + points.len();
    let max = max_points(limits, degree);
    let capacity = grown_capacity(target.capacity.max(target.positions.len()), required, max)?;
    let sh_stride = sh_coefficient_count(degree);

    if capacity > target.positions.capacity() {
        reserve_capacity(target, capacity, sh_stride)?;
        log::debug!(
            "[PointStore::stage_into] Grew generation {} to {} points (max {})",
            target.generation.0,
            capacity,
            max
        );
    }

    target.capacity = capacity;
    target.sh_degree = Some(degree);
    append_points(target, points);
    Ok(())
}

/// Append a batch to the staging buffer and return its generation
///
/// The staging buffer is seeded from the active contents the first time it
/// is touched after a swap, so repeated calls accumulate. Only the staging
/// lock is held while copying and appending; readers of the active buffer
/// are never blocked by ingestion.
pub fn ingest_points(store: &PointStoreData, points: &[Point]) -> EngineResult<GenerationId> {
    if points.is_empty() {
        return Ok(staging_generation(store));
    }

    let mut guard = store.staging.lock();
    let staging = &mut *guard;

    if let Some(buffer) = staging.buffer.as_mut() {
        stage_into(buffer, points, &store.limits)?;
        return Ok(buffer.generation);
    }

    // Swaps need the staging lock too, so this stays the active buffer
    // until the seeded copy is installed
    let active = load_active(store);

    // Check the batch against the active contents before building a staging
    // buffer, so a rejected first batch leaves no trace
    let degree = validate_batch(points, active.sh_degree)?;
    if let Some(degree) = degree {
        grown_capacity(
            active.capacity,
            active.positions.len() + points.len(),
            max_points(&store.limits, degree),
        )?;
    }

    let mut buffer = seed_staging(staging, &active)?;
    if let Err(e) = stage_into(&mut buffer, points, &store.limits) {
        staging.recycled = Some(buffer);
        return Err(e);
    }

    let generation = buffer.generation;
    staging.buffer = Some(buffer);
    Ok(generation)
}

/// Discard anything staged and stage `points` as the complete new contents
pub fn replace_points(store: &PointStoreData, points: &[Point]) -> EngineResult<GenerationId> {
    let mut staging = store.staging.lock();
    let mut buffer = take_blank_buffer(&mut staging);
    if let Err(e) = stage_into(&mut buffer, points, &store.limits) {
        staging.recycled = Some(buffer);
        return Err(e);
    }

    let generation = buffer.generation;
    if let Some(previous) = staging.buffer.replace(buffer) {
        log::debug!(
            "[PointStore::replace_points] Dropped staged generation {}",
            previous.generation.0
        );
    }
    Ok(generation)
}

/// Ingest a lazy stream in batches of `batch_size`
///
/// A failing batch stops the stream; batches before it stay staged.
pub fn ingest_stream<I>(
    store: &PointStoreData,
    points: I,
    batch_size: usize,
) -> EngineResult<GenerationId>
where
    I: IntoIterator<Item = Point>,
{
    let batch_size = batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);
    let mut generation = staging_generation(store);

    for point in points {
        batch.push(point);
        if batch.len() == batch_size {
            generation = ingest_points(store, &batch)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        generation = ingest_points(store, &batch)?;
    }

    Ok(generation)
}

/// Copy the active contents into a blank buffer for the next generation
fn seed_staging(staging: &mut StagingData, active: &PointBuffer) -> EngineResult<PointBuffer> {
    let mut buffer = take_blank_buffer(staging);

    if let Some(degree) = active.sh_degree {
        let capacity = active.capacity.max(active.positions.len());
        if capacity > buffer.positions.capacity() {
            if let Err(e) = reserve_capacity(&mut buffer, capacity, sh_coefficient_count(degree)) {
                staging.recycled = Some(buffer);
                return Err(e);
            }
        }
        buffer.capacity = capacity.max(buffer.capacity);
        buffer.positions.extend_from_slice(&active.positions);
        buffer.colors.extend_from_slice(&active.colors);
        buffer.sh_rest.extend_from_slice(&active.sh_rest);
        buffer.radii.extend_from_slice(&active.radii);
        buffer.sh_degree = Some(degree);
        buffer.bounds = active.bounds;
    }

    Ok(buffer)
}

// ============================================================================
// FRAME BOUNDARIES
// ============================================================================

/// Exchange staging and active; returns the new active generation, or None
/// when nothing was staged
///
/// The active write lock is held only for the pointer exchange.
pub fn swap_buffers(store: &PointStoreData) -> Option<GenerationId> {
    let mut staging = store.staging.lock();
    let buffer = staging.buffer.take()?;
    let generation = buffer.generation;
    let count = buffer.positions.len();

    let previous = std::mem::replace(&mut *store.active.write(), Arc::new(buffer));
    staging.retired.push(previous);
    staging.pending_uploads += 1;

    log::debug!(
        "[PointStore::swap_buffers] Generation {} active ({} points)",
        generation.0,
        count
    );
    Some(generation)
}

fn load_active(store: &PointStoreData) -> Arc<PointBuffer> {
    Arc::clone(&store.active.read())
}

/// View of the active buffer for one frame
pub fn begin_frame(store: &PointStoreData) -> PointView {
    PointView {
        buffer: load_active(store),
    }
}

/// Recycle retired buffers nobody references any more
///
/// Returns how many buffers were reclaimed. The largest reclaimed storage is
/// kept for the next staging buffer; the rest is freed.
pub fn reclaim_retired(store: &PointStoreData) -> usize {
    let mut guard = store.staging.lock();
    let staging = &mut *guard;
    let mut reclaimed = 0;
    let mut still_referenced = Vec::with_capacity(staging.retired.len());

    for retired in staging.retired.drain(..) {
        match Arc::try_unwrap(retired) {
            Ok(buffer) => {
                reclaimed += 1;
                let keep = staging
                    .recycled
                    .as_ref()
                    .map_or(true, |current| buffer.positions.capacity() > current.positions.capacity());
                if keep {
                    staging.recycled = Some(buffer);
                }
            }
            Err(shared) => still_referenced.push(shared),
        }
    }

    staging.retired = still_referenced;
    reclaimed
}

/// Free the storage kept for the next staging buffer; true if there was any
pub fn release_recycled(store: &PointStoreData) -> bool {
    store.staging.lock().recycled.take().is_some()
}

/// Number of swaps since the last call
pub fn drain_upload_count(store: &PointStoreData) -> u32 {
    std::mem::take(&mut store.staging.lock().pending_uploads)
}

// ============================================================================
// QUERIES
// ============================================================================

/// Points the draw path currently sees
pub fn live_point_count(store: &PointStoreData) -> usize {
    store.active.read().positions.len()
}

/// Generation that the next ingestion lands in
pub fn staging_generation(store: &PointStoreData) -> GenerationId {
    let staging = store.staging.lock();
    staging
        .buffer
        .as_ref()
        .map(|buffer| buffer.generation)
        .unwrap_or(GenerationId(staging.next_generation))
}

/// Build the packed upload records for a buffer
pub fn export_gpu_points(buffer: &PointBuffer) -> Vec<GpuPoint> {
    buffer
        .positions
        .iter()
        .zip(&buffer.colors)
        .map(|(position, color)| GpuPoint {
            position: *position,
            packed_color: pack_color_snorm10a2(*color),
        })
        .collect()
}

/// Center and radius of the sphere enclosing the bounds
pub fn bounding_sphere(bounds: &AxisBounds) -> ([f32; 3], f32) {
    let center = [
        (bounds.min[0] + bounds.max[0]) * 0.5,
        (bounds.min[1] + bounds.max[1]) * 0.5,
        (bounds.min[2] + bounds.max[2]) * 0.5,
    ];
    let half = [
        bounds.max[0] - center[0],
        bounds.max[1] - center[1],
        bounds.max[2] - center[2],
    ];
    let radius = (half[0] * half[0] + half[1] * half[1] + half[2] * half[2]).sqrt();
    (center, radius)
}
