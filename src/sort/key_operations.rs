//! Key Computation Operations - Pure DOP Functions
//!
//! One parallel pass over the positions produces the raw camera distance
//! and the mode's key for every point. Visibility, LOD classification and
//! (for binned keys) the distance range are derived from the raw distances.

use super::key_data::{
    BinTier, BoundsSource, DistanceBounds, KeyComputeOutput, KeyParams, KeySpace, LodBand,
    SortMode,
};
use super::order_operations::float_key_to_ordered_u32;
use crate::camera::normalized_forward;
use crate::constants::lod::BAND_COUNT;
use crate::constants::sort::{DIVISION_EPSILON, KEY_CHUNK_SIZE};
use crate::error::{EngineError, EngineResult};
use crate::memory::{acquire_buffer, BufferPurpose, SharedBufferPool};
use crate::point::{bounding_sphere, AxisBounds, PointBuffer};
use bit_vec::BitVec;
use rayon::prelude::*;

const TIER_SUM_TOLERANCE: f32 = 1e-3;

// ============================================================================
// BIN TIERS
// ============================================================================

/// Near 10% of the range gets half the bins, the far 40% a tenth
pub fn default_bin_tiers() -> Vec<BinTier> {
    vec![
        BinTier {
            range_fraction: 0.1,
            bin_share: 0.5,
        },
        BinTier {
            range_fraction: 0.2,
            bin_share: 0.25,
        },
        BinTier {
            range_fraction: 0.3,
            bin_share: 0.15,
        },
        BinTier {
            range_fraction: 0.4,
            bin_share: 0.1,
        },
    ]
}

/// Reject tiers that cannot describe a monotonic mapping
pub fn validate_bin_tiers(tiers: &[BinTier]) -> EngineResult<()> {
    let invalid = |reason: String| EngineError::InvalidConfig {
        field: "bin_tiers".to_string(),
        value: format!("{:?}", tiers),
        reason,
    };

    if tiers.is_empty() {
        return Err(invalid("at least one tier is required".to_string()));
    }
    if let Some(tier) = tiers.iter().find(|t| {
        !(t.range_fraction.is_finite() && t.range_fraction > 0.0)
            || !(t.bin_share.is_finite() && t.bin_share > 0.0)
    }) {
        return Err(invalid(format!("tier {:?} must have positive fractions", tier)));
    }

    let range_sum: f32 = tiers.iter().map(|t| t.range_fraction).sum();
    let share_sum: f32 = tiers.iter().map(|t| t.bin_share).sum();
    if (range_sum - 1.0).abs() > TIER_SUM_TOLERANCE || (share_sum - 1.0).abs() > TIER_SUM_TOLERANCE
    {
        return Err(invalid(format!(
            "range fractions sum to {:.3} and bin shares to {:.3}, both must be 1",
            range_sum, share_sum
        )));
    }
    Ok(())
}

/// Scale tiers so both fractions sum to exactly 1; empty input means uniform
pub fn normalized_tiers(tiers: &[BinTier]) -> Vec<BinTier> {
    let range_sum: f32 = tiers.iter().map(|t| t.range_fraction.max(0.0)).sum();
    let share_sum: f32 = tiers.iter().map(|t| t.bin_share.max(0.0)).sum();

    if range_sum <= DIVISION_EPSILON || share_sum <= DIVISION_EPSILON {
        return vec![BinTier {
            range_fraction: 1.0,
            bin_share: 1.0,
        }];
    }

    tiers
        .iter()
        .map(|t| BinTier {
            range_fraction: t.range_fraction.max(0.0) / range_sum,
            bin_share: t.bin_share.max(0.0) / share_sum,
        })
        .collect()
}

/// Map a raw distance to a bin through the piecewise-linear tier mapping
///
/// `tiers` must be normalized. Distances outside `bounds` land in the first
/// or last bin.
pub fn distance_to_bin(
    distance: f32,
    bounds: DistanceBounds,
    tiers: &[BinTier],
    bin_count: u32,
) -> u32 {
    let bin_count = bin_count.max(1);
    let range = bounds.max - bounds.min;
    if range <= DIVISION_EPSILON {
        return 0;
    }

    let t = ((distance - bounds.min) / range).clamp(0.0, 1.0);

    let mut range_start = 0.0;
    let mut share_start = 0.0;
    let mut u = 1.0;
    for (i, tier) in tiers.iter().enumerate() {
        let range_end = range_start + tier.range_fraction;
        if t < range_end || i + 1 == tiers.len() {
            let local = if tier.range_fraction > DIVISION_EPSILON {
                ((t - range_start) / tier.range_fraction).clamp(0.0, 1.0)
            } else {
                0.0
            };
            u = share_start + local * tier.bin_share;
            break;
        }
        range_start = range_end;
        share_start += tier.bin_share;
    }

    ((u * bin_count as f32).floor() as u32).min(bin_count - 1)
}

// ============================================================================
// LOD
// ============================================================================

/// Band index in `0..BAND_COUNT` for a camera distance
pub fn lod_band_index(distance: f32, thresholds: &[f32; 3]) -> usize {
    thresholds
        .iter()
        .position(|&threshold| distance < threshold)
        .unwrap_or(BAND_COUNT - 1)
}

pub fn classify_lod_band(distance: f32, thresholds: &[f32; 3]) -> LodBand {
    match lod_band_index(distance, thresholds) {
        0 => LodBand::Near,
        1 => LodBand::Mid,
        2 => LodBand::Far,
        _ => LodBand::VeryFar,
    }
}

// ============================================================================
// BOUNDS
// ============================================================================

/// Exact min/max over the visible distances
pub fn reduce_distance_bounds(distances: &[f32], visible: &BitVec) -> Option<DistanceBounds> {
    distances
        .par_iter()
        .enumerate()
        .filter(|(i, _)| visible.get(*i).unwrap_or(false))
        .map(|(_, &d)| DistanceBounds { min: d, max: d })
        .reduce_with(|a, b| DistanceBounds {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        })
}

/// Distance range of the sphere enclosing `bounds`, as seen from `camera`
pub fn project_bounding_volume(
    camera: [f32; 3],
    bounds: &AxisBounds,
    max_render_distance: Option<f32>,
) -> DistanceBounds {
    let (center, radius) = bounding_sphere(bounds);
    let offset = [
        center[0] - camera[0],
        center[1] - camera[1],
        center[2] - camera[2],
    ];
    let distance = (offset[0] * offset[0] + offset[1] * offset[1] + offset[2] * offset[2]).sqrt();

    let min = (distance - radius).max(0.0);
    let mut max = distance + radius;
    if let Some(limit) = max_render_distance {
        max = max.min(limit).max(min);
    }
    DistanceBounds { min, max }
}

// ============================================================================
// KEY COMPUTATION
// ============================================================================

fn empty_output(key_space: KeySpace) -> KeyComputeOutput {
    KeyComputeOutput {
        keys: None,
        key_space,
        point_count: 0,
        visible: BitVec::new(),
        visible_count: 0,
        lod_histogram: [0; BAND_COUNT],
        bounds: None,
    }
}

/// Derive one key per point of `buffer`, plus visibility and LOD bands
///
/// Keys land in a pooled `SortKeys` buffer that the caller hands on to the
/// order engine.
pub fn compute_keys(
    buffer: &PointBuffer,
    params: &KeyParams,
    pool: &SharedBufferPool,
) -> EngineResult<KeyComputeOutput> {
    let key_space = match params.mode {
        SortMode::Binned => KeySpace::Binned {
            bin_count: params.bin_count.max(1),
        },
        SortMode::Radial | SortMode::Directional => KeySpace::Float,
    };

    let n = buffer.positions.len();
    if n == 0 {
        return Ok(empty_output(key_space));
    }

    let mut distances = acquire_buffer(pool, BufferPurpose::Distances, n)?;
    let mut keys = acquire_buffer(pool, BufferPurpose::SortKeys, n)?;

    let camera = params.camera.position;
    let camera = [camera.x, camera.y, camera.z];
    let forward = normalized_forward(params.camera.forward);
    let forward = [forward.x, forward.y, forward.z];
    let mode = params.mode;

    distances
        .as_f32_mut(n)
        .par_chunks_mut(KEY_CHUNK_SIZE)
        .zip(keys.as_u32_mut(n).par_chunks_mut(KEY_CHUNK_SIZE))
        .zip(buffer.positions.par_chunks(KEY_CHUNK_SIZE))
        .for_each(|((distance_chunk, key_chunk), position_chunk)| {
            for ((distance, key), position) in distance_chunk
                .iter_mut()
                .zip(key_chunk.iter_mut())
                .zip(position_chunk)
            {
                let offset = [
                    position[0] - camera[0],
                    position[1] - camera[1],
                    position[2] - camera[2],
                ];
                let radial =
                    (offset[0] * offset[0] + offset[1] * offset[1] + offset[2] * offset[2]).sqrt();
                *distance = radial;
                *key = match mode {
                    SortMode::Radial => float_key_to_ordered_u32(radial),
                    SortMode::Directional => float_key_to_ordered_u32(
                        offset[0] * forward[0] + offset[1] * forward[1] + offset[2] * forward[2],
                    ),
                    // Filled once the range is known
                    SortMode::Binned => 0,
                };
            }
        });

    let raw = distances.as_f32(n);
    let visible = match params.max_render_distance {
        Some(limit) => BitVec::from_fn(n, |i| raw[i] <= limit),
        None => BitVec::from_elem(n, true),
    };

    let thresholds = params.lod_thresholds;
    let lod_histogram = raw
        .par_iter()
        .enumerate()
        .filter(|(i, _)| visible.get(*i).unwrap_or(false))
        .fold(
            || [0u32; BAND_COUNT],
            |mut histogram, (_, &d)| {
                histogram[lod_band_index(d, &thresholds)] += 1;
                histogram
            },
        )
        .reduce(
            || [0u32; BAND_COUNT],
            |mut a, b| {
                for (total, count) in a.iter_mut().zip(b) {
                    *total += count;
                }
                a
            },
        );
    let visible_count: usize = lod_histogram.iter().map(|&c| c as usize).sum();

    let mut bounds = None;
    if let KeySpace::Binned { bin_count } = key_space {
        let range = match params.bounds_source {
            BoundsSource::Reduction => reduce_distance_bounds(raw, &visible),
            BoundsSource::BoundingVolume => buffer
                .bounds
                .as_ref()
                .map(|b| project_bounding_volume(camera, b, params.max_render_distance)),
        }
        .unwrap_or(DistanceBounds { min: 0.0, max: 0.0 });

        let tiers = normalized_tiers(&params.bin_tiers);
        keys.as_u32_mut(n)
            .par_iter_mut()
            .zip(raw.par_iter())
            .for_each(|(key, &d)| *key = distance_to_bin(d, range, &tiers, bin_count));
        bounds = Some(range);
    }

    log::trace!(
        "[KeyCompute::compute_keys] {:?}: {} points, {} visible",
        mode,
        n,
        visible_count
    );

    Ok(KeyComputeOutput {
        keys: Some(keys),
        key_space,
        point_count: n,
        visible,
        visible_count,
        lod_histogram,
        bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{init_pose, CameraPose};
    use crate::constants::lod::DEFAULT_LOD_THRESHOLDS;
    use crate::memory::create_buffer_pool;
    use crate::point::{create_point_buffer, GenerationId};
    use cgmath::{Point3, Vector3};

    fn buffer(positions: &[[f32; 3]]) -> PointBuffer {
        let mut buffer = create_point_buffer(GenerationId(1));
        for &p in positions {
            buffer.positions.push(p);
            buffer.bounds = Some(match buffer.bounds {
                None => AxisBounds { min: p, max: p },
                Some(b) => AxisBounds {
                    min: [b.min[0].min(p[0]), b.min[1].min(p[1]), b.min[2].min(p[2])],
                    max: [b.max[0].max(p[0]), b.max[1].max(p[1]), b.max[2].max(p[2])],
                },
            });
        }
        buffer
    }

    fn params(mode: SortMode) -> KeyParams {
        KeyParams {
            mode,
            camera: CameraPose::default(),
            bin_count: 32,
            bin_tiers: default_bin_tiers(),
            bounds_source: BoundsSource::Reduction,
            max_render_distance: None,
            lod_thresholds: DEFAULT_LOD_THRESHOLDS,
        }
    }

    fn keys_of(output: &KeyComputeOutput) -> Vec<u32> {
        output
            .keys
            .as_ref()
            .map(|k| k.as_u32(output.point_count).to_vec())
            .unwrap_or_default()
    }

    fn pool() -> SharedBufferPool {
        create_buffer_pool(1024, 64 * 1024 * 1024)
    }

    #[test]
    fn test_binned_scenario_near_and_far() {
        let bounds = DistanceBounds { min: 0.0, max: 100.0 };
        let tiers = normalized_tiers(&default_bin_tiers());

        assert_eq!(distance_to_bin(0.1, bounds, &tiers, 32), 0);
        assert_eq!(distance_to_bin(0.2, bounds, &tiers, 32), 0);
        assert_eq!(distance_to_bin(90.0, bounds, &tiers, 32), 31);
        assert_eq!(distance_to_bin(95.0, bounds, &tiers, 32), 31);
        assert_eq!(distance_to_bin(100.0, bounds, &tiers, 32), 31);
    }

    #[test]
    fn test_bins_are_monotonic_and_denser_near() {
        let bounds = DistanceBounds { min: 0.0, max: 100.0 };
        let tiers = normalized_tiers(&default_bin_tiers());
        let bins: Vec<u32> = (0..=1000)
            .map(|i| distance_to_bin(i as f32 * 0.1, bounds, &tiers, 32))
            .collect();
        assert!(bins.windows(2).all(|w| w[0] <= w[1]));

        // First 10 units span 16 bins, last 40 units only about 3
        assert_eq!(distance_to_bin(9.99, bounds, &tiers, 32), 15);
        assert!(distance_to_bin(60.0, bounds, &tiers, 32) >= 28);
    }

    #[test]
    fn test_collapsed_range_maps_to_first_bin() {
        let bounds = DistanceBounds { min: 5.0, max: 5.0 };
        assert_eq!(distance_to_bin(5.0, bounds, &default_bin_tiers(), 32), 0);
    }

    #[test]
    fn test_tier_validation() {
        assert!(validate_bin_tiers(&default_bin_tiers()).is_ok());
        assert!(validate_bin_tiers(&[]).is_err());
        let lopsided = [BinTier {
            range_fraction: 0.5,
            bin_share: 1.0,
        }];
        assert!(validate_bin_tiers(&lopsided).is_err());
    }

    #[test]
    fn test_lod_bands() {
        let thresholds = [10.0, 30.0, 80.0];
        assert_eq!(classify_lod_band(1.0, &thresholds), LodBand::Near);
        assert_eq!(classify_lod_band(10.0, &thresholds), LodBand::Mid);
        assert_eq!(classify_lod_band(50.0, &thresholds), LodBand::Far);
        assert_eq!(classify_lod_band(500.0, &thresholds), LodBand::VeryFar);
    }

    #[test]
    fn test_radial_keys_follow_distance() {
        let points = buffer(&[[0.0, 0.0, -3.0], [1.0, 0.0, 0.0], [0.0, 2.0, 0.0]]);
        let output = compute_keys(&points, &params(SortMode::Radial), &pool()).expect("keys");

        let keys = keys_of(&output);
        assert!(keys[1] < keys[2] && keys[2] < keys[0]);
        assert_eq!(output.visible_count, 3);
        assert_eq!(output.key_space, KeySpace::Float);
    }

    #[test]
    fn test_directional_keys_ignore_lateral_offset() {
        // Camera looks down -Z; both points are 5 units deep
        let points = buffer(&[[0.0, 0.0, -5.0], [40.0, 0.0, -5.0]]);
        let output = compute_keys(&points, &params(SortMode::Directional), &pool()).expect("keys");
        let keys = keys_of(&output);
        assert_eq!(keys[0], keys[1]);

        let radial = compute_keys(&points, &params(SortMode::Radial), &pool()).expect("keys");
        let radial_keys = keys_of(&radial);
        assert!(radial_keys[0] < radial_keys[1]);
    }

    #[test]
    fn test_points_behind_camera_sort_first_in_directional_mode() {
        let points = buffer(&[[0.0, 0.0, -5.0], [0.0, 0.0, 5.0]]);
        let mut p = params(SortMode::Directional);
        p.camera = init_pose(Point3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, -2.0));
        let keys = keys_of(&compute_keys(&points, &p, &pool()).expect("keys"));
        assert!(keys[1] < keys[0]);
    }

    #[test]
    fn test_binned_keys_use_reduced_bounds() {
        let points = buffer(&[[0.0, 0.0, 0.0], [0.0, 0.0, 0.1], [0.0, 0.0, 90.0], [0.0, 0.0, 100.0]]);
        let output = compute_keys(&points, &params(SortMode::Binned), &pool()).expect("keys");

        assert_eq!(output.bounds, Some(DistanceBounds { min: 0.0, max: 100.0 }));
        assert_eq!(output.key_space, KeySpace::Binned { bin_count: 32 });
        assert_eq!(keys_of(&output), vec![0, 0, 31, 31]);
    }

    #[test]
    fn test_bounding_volume_projection() {
        let bounds = AxisBounds {
            min: [-1.0, 0.0, 0.0],
            max: [1.0, 0.0, 0.0],
        };
        let range = project_bounding_volume([0.0, 0.0, 10.0], &bounds, None);
        assert!((range.min - 9.0).abs() < 1e-5);
        assert!((range.max - 11.0).abs() < 1e-5);

        let clipped = project_bounding_volume([0.0, 0.0, 10.0], &bounds, Some(10.0));
        assert_eq!(clipped.max, 10.0);

        // Camera inside the volume
        let inside = project_bounding_volume([0.0, 0.0, 0.0], &bounds, None);
        assert_eq!(inside.min, 0.0);
    }

    #[test]
    fn test_render_distance_culls_and_fills_histogram() {
        let points = buffer(&[
            [0.0, 0.0, -1.0],
            [0.0, 0.0, -20.0],
            [0.0, 0.0, -50.0],
            [0.0, 0.0, -90.0],
            [0.0, 0.0, -500.0],
        ]);
        let mut p = params(SortMode::Radial);
        p.max_render_distance = Some(100.0);

        let output = compute_keys(&points, &p, &pool()).expect("keys");
        assert_eq!(output.visible_count, 4);
        assert_eq!(output.visible.get(4), Some(false));
        assert_eq!(output.lod_histogram, [1, 1, 1, 1]);
    }

    #[test]
    fn test_empty_buffer_skips_computation() {
        let pool = pool();
        let output = compute_keys(&buffer(&[]), &params(SortMode::Radial), &pool).expect("keys");
        assert!(output.keys.is_none());
        assert_eq!(output.point_count, 0);
        assert_eq!(crate::memory::pool_occupancy(&pool).total_allocations, 0);
    }

    #[test]
    fn test_scratch_returns_to_pool() {
        let pool = pool();
        let points = buffer(&[[1.0, 2.0, 3.0]]);
        let output = compute_keys(&points, &params(SortMode::Radial), &pool).expect("keys");

        // Distances are back already, keys are still leased by the output
        let occupancy = crate::memory::pool_occupancy(&pool);
        assert_eq!(occupancy.leased_buffers, 1);
        drop(output);
        assert_eq!(crate::memory::pool_occupancy(&pool).leased_buffers, 0);
    }
}
