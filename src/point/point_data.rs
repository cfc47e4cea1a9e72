//! Point Store Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in point_operations.rs
//!
//! Points arrive as records (`Point`) and are stored as a Structure of
//! Arrays (`PointBuffer`) so key computation walks one tightly packed
//! position array.

use bytemuck::{Pod, Zeroable};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Monotonically increasing tag identifying one version of the point data
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GenerationId(pub u64);

/// A single splat as handed over by the ingestion collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// World-space position
    pub position: [f32; 3],

    /// Linear RGBA, opacity in alpha
    pub color: [f32; 4],

    /// Higher-order spherical-harmonics coefficients (RGB triples).
    /// Length is `(degree + 1)^2 - 1`: 0, 3, 8 or 15.
    pub sh_rest: Vec<[f32; 3]>,

    /// Precomputed bounding radius, if the source format carries one
    pub bounding_radius: Option<f32>,
}

/// Axis-aligned bounds of a buffer's positions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

/// Contiguous SoA storage for one generation of points
#[derive(Debug, Clone)]
pub struct PointBuffer {
    /// Generation this buffer holds
    pub generation: GenerationId,

    /// Positions (SOA)
    pub positions: Vec<[f32; 3]>,

    /// Colors (SOA)
    pub colors: Vec<[f32; 4]>,

    /// SH rest coefficients, `sh_stride` entries per point (SOA)
    pub sh_rest: Vec<[f32; 3]>,

    /// Bounding radii, 0.0 where the source had none (SOA)
    pub radii: Vec<f32>,

    /// SH degree shared by every point in the buffer; None until the first
    /// point arrives
    pub sh_degree: Option<u8>,

    /// Points the buffer can hold before it must grow
    pub capacity: usize,

    /// Bounds over all positions; None while empty
    pub bounds: Option<AxisBounds>,
}

/// Device limits the store clamps growth against
#[derive(Debug, Clone, Copy)]
pub struct StoreLimits {
    /// Largest single allocation, in bytes
    pub max_allocation_bytes: u64,
}

/// Producer-side half of the store, guarded by its own lock
///
/// Ingestion holds this lock while it copies and appends; the draw path
/// never takes it.
#[derive(Debug, Default)]
pub struct StagingData {
    /// Buffer being filled by the producer, seeded lazily from `active`
    pub buffer: Option<PointBuffer>,

    /// Former active buffers that views may still reference
    pub retired: Vec<Arc<PointBuffer>>,

    /// Storage reclaimed from retired buffers, reused for the next staging
    pub recycled: Option<PointBuffer>,

    /// Generation handed to the next staging buffer
    pub next_generation: u64,

    /// Swaps since the counter was last drained (buffer uploads)
    pub pending_uploads: u32,
}

/// Double-buffered point storage
///
/// DOP Architecture:
/// - `active` is shared read-only with sort jobs and the draw path; its lock
///   is only written by the pointer exchange in `swap_buffers`
/// - `staging` is owned by the producer until `swap_buffers`
///
/// Lock order is `staging` then `active`.
pub struct PointStoreData {
    /// Buffer consumed by the draw path and sort jobs
    pub active: RwLock<Arc<PointBuffer>>,

    pub staging: Mutex<StagingData>,

    /// Device limits
    pub limits: StoreLimits,
}

/// Read-only view of the active buffer, valid for as long as it is held
///
/// Holding a view keeps its generation's storage alive; the store only
/// recycles a retired buffer once every view of it has been dropped.
#[derive(Debug, Clone)]
pub struct PointView {
    pub buffer: Arc<PointBuffer>,
}

/// Point record laid out for GPU upload
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuPoint {
    pub position: [f32; 3],
    /// RGB10 + A2, see `pack_color_snorm10a2`
    pub packed_color: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<GpuPoint>(), 16);

impl std::ops::Deref for PointView {
    type Target = PointBuffer;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_allocation_bytes: crate::constants::gpu_limits::MAX_BUFFER_SIZE,
        }
    }
}
