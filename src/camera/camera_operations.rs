//! Camera operations - Pure DOP functions
//!
//! All functions are pure: they take data, return new data, no side effects.
//! No methods, no self, just transformations.

use super::camera_data::{CameraPose, PoseDelta};
use cgmath::{InnerSpace, MetricSpace, Point3, Vector3};

/// Fallback view direction when a caller hands us a zero vector
const DEFAULT_FORWARD: Vector3<f32> = Vector3::new(0.0, 0.0, -1.0);

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Create a pose from a position and a view direction
pub fn init_pose(position: Point3<f32>, forward: Vector3<f32>) -> CameraPose {
    CameraPose { position, forward }
}

/// Create a pose from yaw/pitch angles (radians)
pub fn pose_from_yaw_pitch(position: Point3<f32>, yaw: f32, pitch: f32) -> CameraPose {
    CameraPose {
        position,
        forward: calculate_forward_vector(yaw, pitch),
    }
}

/// Create a pose looking from `eye` towards `target`
pub fn pose_looking_at(eye: Point3<f32>, target: Point3<f32>) -> CameraPose {
    CameraPose {
        position: eye,
        forward: target - eye,
    }
}

// ============================================================================
// UTILITIES
// ============================================================================

/// Calculate forward vector from yaw and pitch
pub fn calculate_forward_vector(yaw: f32, pitch: f32) -> Vector3<f32> {
    Vector3::new(
        yaw.cos() * pitch.cos(),
        pitch.sin(),
        yaw.sin() * pitch.cos(),
    )
    .normalize()
}

/// Normalize a forward vector, falling back to -Z for degenerate input
pub fn normalized_forward(forward: Vector3<f32>) -> Vector3<f32> {
    let length_squared = forward.magnitude2();
    if length_squared.is_finite() && length_squared > f32::EPSILON {
        forward / length_squared.sqrt()
    } else {
        DEFAULT_FORWARD
    }
}

/// Euclidean distance between the two camera positions
pub fn position_delta(current: &CameraPose, previous: &CameraPose) -> f32 {
    current.position.distance(previous.position)
}

/// `1 - dot(normalize(current), normalize(previous))`
pub fn direction_delta(current: &CameraPose, previous: &CameraPose) -> f32 {
    let a = normalized_forward(current.forward);
    let b = normalized_forward(previous.forward);
    (1.0 - a.dot(b)).max(0.0)
}

/// Both deltas at once
pub fn pose_delta(current: &CameraPose, previous: &CameraPose) -> PoseDelta {
    PoseDelta {
        position_delta: position_delta(current, previous),
        direction_delta: direction_delta(current, previous),
    }
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

/// Log camera context for debugging
pub fn log_pose_context(pose: &CameraPose) {
    let forward = normalized_forward(pose.forward);
    log::debug!(
        "[Camera] Position: ({:.2}, {:.2}, {:.2}) | Forward: ({:.3}, {:.3}, {:.3})",
        pose.position.x,
        pose.position.y,
        pose.position.z,
        forward.x,
        forward.y,
        forward.z
    );
}
