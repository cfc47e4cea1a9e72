//! Sort - distance keys, ordering and publication
//!
//! - key_data.rs / key_operations.rs: per-point keys, visibility and LOD
//! - order_data.rs / order_operations.rs: keys to permutation
//! - result_cell.rs: latest published permutation
//! - sort_job.rs: one asynchronous sort, keys then order

pub mod key_data;
pub mod key_operations;
pub mod order_data;
pub mod order_operations;
pub mod result_cell;
pub mod sort_job;

pub use key_data::{
    BinTier, BoundsSource, DistanceBounds, KeyComputeOutput, KeyParams, KeySpace, LodBand,
    SortMode,
};
pub use key_operations::{
    classify_lod_band, compute_keys, default_bin_tiers, distance_to_bin, lod_band_index,
    normalized_tiers, project_bounding_volume, reduce_distance_bounds, validate_bin_tiers,
};
pub use order_data::{AppliedAlgorithm, OrderAlgorithm, Permutation, SortOrder};
pub use order_operations::{
    comparison_sort_pairs, counting_sort_pairs, empty_permutation, float_key_to_ordered_u32,
    is_valid_permutation, order_keys, ordered_u32_to_float, radix_sort_pairs, select_algorithm,
};
pub use result_cell::{
    create_latest_permutation, load_permutation, permutation_version, publish_permutation,
    supersedes, LatestPermutation, PublishOutcome,
};
pub use sort_job::{execute_sort_job, SortJobOutput, SortJobRequest};
