//! Point Store - double-buffered, capacity-clamped point storage
//!
//! - point_data.rs: Pure data structures with NO methods
//! - point_operations.rs: Pure functions that operate on data
//! - color_packing.rs: snorm10a2 color encoding for uploads

pub mod color_packing;
pub mod point_data;
pub mod point_operations;

pub use color_packing::{pack_color_snorm10a2, unpack_color_snorm10a2};
pub use point_data::{
    AxisBounds, GenerationId, GpuPoint, Point, PointBuffer, PointStoreData, PointView, StagingData,
    StoreLimits,
};
pub use point_operations::{
    begin_frame, bounding_sphere, bytes_per_point, create_point_buffer, create_point_store,
    create_shared_point_store, drain_upload_count, export_gpu_points, grown_capacity,
    ingest_points, ingest_stream, live_point_count, max_points, reclaim_retired, release_recycled,
    replace_points, sh_coefficient_count, sh_degree_for_count, staging_generation, swap_buffers,
    SharedPointStore,
};
