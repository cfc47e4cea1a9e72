//! Key Computation Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in key_operations.rs

use crate::camera::CameraPose;
use crate::constants::lod::BAND_COUNT;
use crate::memory::PooledBuffer;
use bit_vec::BitVec;
use serde::{Deserialize, Serialize};

/// How a point's ordering key is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Euclidean distance to the camera
    Radial,
    /// Depth along the normalized view direction
    Directional,
    /// Radial distance quantized into precision-weighted bins
    Binned,
}

/// One segment of the piecewise-linear distance-to-bin mapping
///
/// Tiers are consecutive: the first covers `[0, range_fraction)` of the
/// distance range, the next starts where it ends, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinTier {
    /// Fraction of the distance range this tier spans
    pub range_fraction: f32,
    /// Fraction of the bins this tier receives
    pub bin_share: f32,
}

/// Where the `[min, max]` distance range for binned keys comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundsSource {
    /// Exact min/max over every visible point
    Reduction,
    /// Camera distance to the sphere enclosing the buffer bounds
    BoundingVolume,
}

/// Distance range keys are quantized over
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistanceBounds {
    pub min: f32,
    pub max: f32,
}

/// LOD band a point falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LodBand {
    Near,
    Mid,
    Far,
    VeryFar,
}

/// What the u32 keys encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpace {
    /// Order-preserving image of an f32
    Float,
    /// Bin index in `0..bin_count`
    Binned { bin_count: u32 },
}

/// Everything key computation needs besides the points
#[derive(Debug, Clone)]
pub struct KeyParams {
    pub mode: SortMode,
    pub camera: CameraPose,
    pub bin_count: u32,
    pub bin_tiers: Vec<BinTier>,
    pub bounds_source: BoundsSource,
    /// Points farther than this are culled
    pub max_render_distance: Option<f32>,
    /// Near/mid/far boundaries
    pub lod_thresholds: [f32; 3],
}

/// Keys and classification for one buffer generation
#[derive(Debug)]
pub struct KeyComputeOutput {
    /// One key per point, `point_count` long; None when there are no points
    pub keys: Option<PooledBuffer>,
    pub key_space: KeySpace,
    pub point_count: usize,

    /// Bit i set when point i is within the render distance
    pub visible: BitVec,
    pub visible_count: usize,

    /// Visible points per LOD band
    pub lod_histogram: [u32; BAND_COUNT],

    /// Range used for binning (binned mode only)
    pub bounds: Option<DistanceBounds>,
}
