//! One sort job: key computation followed by ordering
//!
//! Runs on the sort worker pool (or inline) against a pinned point view, so
//! ingestion and swaps can proceed while it works.

use super::key_data::{DistanceBounds, KeyParams};
use super::key_operations::compute_keys;
use super::order_data::{AppliedAlgorithm, OrderAlgorithm, Permutation, SortOrder};
use super::order_operations::order_keys;
use crate::constants::lod::BAND_COUNT;
use crate::error::EngineResult;
use crate::memory::SharedBufferPool;
use crate::point::PointView;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything a worker needs to run one job
#[derive(Debug, Clone)]
pub struct SortJobRequest {
    pub sequence: u64,
    pub view: PointView,
    pub key_params: KeyParams,
    pub order: SortOrder,
    pub algorithm: OrderAlgorithm,
}

/// Result of a successful job
#[derive(Debug, Clone)]
pub struct SortJobOutput {
    pub permutation: Arc<Permutation>,
    pub key_duration: Duration,
    pub sort_duration: Duration,
    pub visible_count: usize,
    pub lod_histogram: [u32; BAND_COUNT],
    pub bounds: Option<DistanceBounds>,
    pub algorithm: AppliedAlgorithm,
}

pub fn execute_sort_job(
    request: &SortJobRequest,
    pool: &SharedBufferPool,
) -> EngineResult<SortJobOutput> {
    let point_count = request.view.positions.len();
    let _span = tracing::debug_span!(
        "sort_job",
        sequence = request.sequence,
        generation = request.view.generation.0,
        points = point_count
    )
    .entered();

    let key_start = Instant::now();
    let mut keys = {
        let _span = tracing::trace_span!("sort_job.keys").entered();
        compute_keys(&request.view, &request.key_params, pool)?
    };
    let key_duration = key_start.elapsed();

    let sort_start = Instant::now();
    let (indices, algorithm) = {
        let _span = tracing::trace_span!("sort_job.order").entered();
        let key_space = keys.key_space;
        let visible = &keys.visible;
        match keys.keys.as_mut() {
            Some(buffer) => order_keys(
                buffer.as_u32_mut(point_count),
                Some(visible),
                key_space,
                request.order,
                request.algorithm,
                pool,
            )?,
            None => (Arc::from(Vec::new()), AppliedAlgorithm::None),
        }
    };
    let sort_duration = sort_start.elapsed();

    log::debug!(
        "[SortJob::execute] #{} generation {}: {}/{} points ordered ({:?}) keys {:.2}ms sort {:.2}ms",
        request.sequence,
        request.view.generation.0,
        indices.len(),
        point_count,
        algorithm,
        key_duration.as_secs_f64() * 1000.0,
        sort_duration.as_secs_f64() * 1000.0
    );

    Ok(SortJobOutput {
        permutation: Arc::new(Permutation {
            indices,
            generation: request.view.generation,
            sequence: request.sequence,
            order: request.order,
            mode: request.key_params.mode,
            point_count,
        }),
        key_duration,
        sort_duration,
        visible_count: keys.visible_count,
        lod_histogram: keys.lod_histogram,
        bounds: keys.bounds,
        algorithm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraPose;
    use crate::constants::lod::DEFAULT_LOD_THRESHOLDS;
    use crate::memory::{create_buffer_pool, pool_occupancy};
    use crate::point::{
        begin_frame, create_point_store, ingest_points, swap_buffers, Point, StoreLimits,
    };
    use crate::sort::{default_bin_tiers, is_valid_permutation, BoundsSource, SortMode};

    fn request(positions: &[[f32; 3]], mode: SortMode, order: SortOrder) -> SortJobRequest {
        let store = create_point_store(StoreLimits::default());
        let points: Vec<Point> = positions
            .iter()
            .map(|&position| Point {
                position,
                color: [1.0; 4],
                sh_rest: Vec::new(),
                bounding_radius: None,
            })
            .collect();
        ingest_points(&store, &points).expect("ingest");
        swap_buffers(&store);

        SortJobRequest {
            sequence: 1,
            view: begin_frame(&store),
            key_params: KeyParams {
                mode,
                camera: CameraPose::default(),
                bin_count: 32,
                bin_tiers: default_bin_tiers(),
                bounds_source: BoundsSource::Reduction,
                max_render_distance: None,
                lod_thresholds: DEFAULT_LOD_THRESHOLDS,
            },
            order,
            algorithm: OrderAlgorithm::Auto,
        }
    }

    #[test]
    fn test_job_produces_back_to_front_order() {
        let pool = create_buffer_pool(1024, 64 * 1024 * 1024);
        let job = request(
            &[[0.0, 0.0, -1.0], [0.0, 0.0, -9.0], [0.0, 0.0, -4.0]],
            SortMode::Radial,
            SortOrder::Descending,
        );

        let output = execute_sort_job(&job, &pool).expect("job");
        assert_eq!(&output.permutation.indices[..], &[1, 2, 0]);
        assert_eq!(output.permutation.generation, job.view.generation);
        assert_eq!(output.visible_count, 3);

        // Every scratch buffer went back
        assert_eq!(pool_occupancy(&pool).leased_buffers, 0);
    }

    #[test]
    fn test_job_on_empty_view() {
        let pool = create_buffer_pool(1024, 64 * 1024 * 1024);
        let job = request(&[], SortMode::Binned, SortOrder::Ascending);
        let output = execute_sort_job(&job, &pool).expect("job");
        assert!(output.permutation.indices.is_empty());
        assert_eq!(output.algorithm, AppliedAlgorithm::None);
    }

    #[test]
    fn test_binned_job_is_a_valid_permutation() {
        let pool = create_buffer_pool(1024, 64 * 1024 * 1024);
        let positions: Vec<[f32; 3]> = (0..500).map(|i| [0.0, 0.0, -(i as f32) * 0.2]).collect();
        let job = request(&positions, SortMode::Binned, SortOrder::Ascending);

        let output = execute_sort_job(&job, &pool).expect("job");
        assert_eq!(output.algorithm, AppliedAlgorithm::Counting);
        assert!(is_valid_permutation(&output.permutation.indices, 500));
        assert_eq!(output.permutation.indices[0], 0);
    }
}
