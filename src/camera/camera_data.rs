//! Camera data structures - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in camera_operations.rs

use cgmath::{Point3, Vector3};

/// Camera pose as seen by the sort core
///
/// Only position and view direction matter for ordering; projection
/// parameters belong to the external rasterizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// Camera position in world space
    pub position: Point3<f32>,

    /// View direction, not necessarily normalized
    pub forward: Vector3<f32>,
}

/// Difference between two poses, as evaluated by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseDelta {
    /// Euclidean distance between positions
    pub position_delta: f32,

    /// 1 - cos(angle) between normalized forward vectors, in [0, 2]
    pub direction_delta: f32,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 0.0),
            forward: Vector3::new(0.0, 0.0, -1.0),
        }
    }
}
