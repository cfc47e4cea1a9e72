/// Camera Module - Data-Oriented Programming (DOP) style
///
/// This module follows pure DOP principles:
/// - camera_data.rs: Pure data structures with NO methods
/// - camera_operations.rs: Pure functions that operate on data
///
pub mod camera_data;
pub mod camera_operations;

// Re-export data structures
pub use camera_data::{CameraPose, PoseDelta};

// Re-export all operations
pub use camera_operations::{
    // Initialization
    init_pose,
    pose_from_yaw_pitch,
    pose_looking_at,

    // Utilities
    calculate_forward_vector,
    normalized_forward,
    position_delta,
    direction_delta,
    pose_delta,

    // Diagnostics
    log_pose_context,
};
