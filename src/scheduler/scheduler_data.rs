//! Sort Scheduler Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in scheduler_operations.rs

use crate::camera::CameraPose;
use crate::point::GenerationId;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Where the scheduler is within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerPhase {
    Idle,
    Triggered,
    Running,
    Skipped,
}

/// Thresholds the per-frame decision is made against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    pub position_epsilon: f32,
    pub direction_epsilon: f32,
    pub minimum_sort_interval: Duration,
    pub max_concurrent_sorts: u32,
}

/// Scheduler bookkeeping carried across frames
#[derive(Debug, Clone)]
pub struct SortJobState {
    /// Pose the newest completed sort used
    pub last_sorted_pose: Option<CameraPose>,

    /// When the newest job was dispatched
    pub last_sort_time: Option<Instant>,

    /// Point data changed since the last completed sort
    pub dirty: bool,

    /// Newest generation swapped in
    pub latest_generation: GenerationId,

    /// Generation the newest completed sort covered
    pub last_sorted_generation: Option<GenerationId>,

    pub jobs_in_flight: u32,

    /// Sequence handed to the next dispatched job (starts at 1)
    pub next_sequence: u64,

    /// Sequence of the newest completed job, 0 if none
    pub last_completed_sequence: u64,

    pub phase: SchedulerPhase,
}

/// Why a frame triggered a sort
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TriggerReason {
    /// Point data changed
    Dirty,
    /// Nothing sorted yet
    ColdStart,
    /// Camera moved or turned past an epsilon
    CameraMoved {
        position_delta: f32,
        direction_delta: f32,
    },
}

/// Why a frame reuses the previous permutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Inside the minimum sort interval
    RateLimited,
    /// Camera within both epsilons
    CameraStill,
    /// Would have triggered, but too many jobs are running
    InFlightLimit,
    /// The frame ended without an evaluation
    NotEvaluated,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SortDecision {
    Trigger(TriggerReason),
    Skip(SkipReason),
}

/// Handle for one dispatched job, returned to the scheduler on completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchTicket {
    pub sequence: u64,
    pub generation: GenerationId,
    pub pose: CameraPose,
    pub reason: TriggerReason,
    pub dispatched_at: Instant,
}
