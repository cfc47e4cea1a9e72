// Hearth Splat - Data-Oriented Programming (DOP) Architecture
//
// Sort, LOD and scratch-pool core for real-time Gaussian splat rendering.
// - *_data.rs modules hold plain data with no methods
// - *_operations.rs modules hold the pure functions that transform it
// - splat_core::SplatCore wires them into the per-frame contract
//
// For new code, prefer the free functions in the *_operations modules; the
// facade only sequences them.

// Constants module
pub mod constants;

// Core modules
pub mod config;
pub mod splat_core;
pub mod error;

// Sort pipeline
pub mod camera;
pub mod memory;
pub mod point;
pub mod scheduler;
pub mod sort;
pub mod telemetry;
pub mod thread_pool;

pub use camera::{init_pose, pose_from_yaw_pitch, pose_looking_at, CameraPose, PoseDelta};
pub use config::{load_config_file, ConfigError, SortExecution, SplatConfig};
pub use splat_core::{FrameReport, SplatCore};
pub use error::{EngineError, EngineResult, ErrorContext, OptionExt};
pub use memory::{MemoryPressure, PoolOccupancy, TrimReport};
pub use point::{GenerationId, Point, PointBuffer, PointView};
pub use scheduler::{SchedulerPhase, SkipReason, SortDecision, TriggerReason};
pub use sort::{
    BinTier, BoundsSource, LodBand, OrderAlgorithm, Permutation, SortMode, SortOrder,
};
pub use telemetry::{FrameObserver, FrameStatistics, SortOutcome, TelemetrySummary};
