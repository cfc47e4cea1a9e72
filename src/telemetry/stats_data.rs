//! Frame Statistics Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in stats_operations.rs

use crate::constants::lod::BAND_COUNT;
use crate::error::EngineError;
use crate::memory::PoolOccupancy;
use crate::scheduler::{SkipReason, TriggerReason};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

/// What the scheduler did this frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SortOutcome {
    /// A new job was dispatched
    Dispatched { sequence: u64, reason: TriggerReason },
    /// The previous permutation was reused
    Skipped { reason: SkipReason },
    /// A job failed this frame; counts as a skipped frame
    Failed { sequence: u64, error: String },
}

/// Immutable snapshot of one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameStatistics {
    pub frame_index: u64,
    pub sort_outcome: SortOutcome,

    /// Timings of the job that completed this frame, if any
    pub key_compute_ms: Option<f64>,
    pub sort_ms: Option<f64>,

    /// Buffer swaps since the previous frame
    pub buffer_uploads: u32,

    pub live_points: usize,
    pub visible_points: usize,
    pub lod_histogram: [u32; BAND_COUNT],

    pub pool: PoolOccupancy,
    pub jobs_in_flight: u32,

    /// Permutation the render path draws with this frame
    pub permutation_sequence: u64,
    pub permutation_generation: u64,
}

/// Receives frame snapshots, possibly on a worker thread
pub trait FrameObserver: Send + Sync {
    fn on_frame(&self, stats: &FrameStatistics);

    fn on_sort_error(&self, _sequence: u64, _error: &EngineError) {}
}

/// Rolling history plus registered observers
pub struct TelemetryData {
    pub history: VecDeque<FrameStatistics>,
    pub capacity: usize,
    pub observers: Vec<Arc<dyn FrameObserver>>,
    pub frames_recorded: u64,
}

pub type SharedTelemetry = Arc<RwLock<TelemetryData>>;

/// Averages over the retained history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySummary {
    pub frames: usize,
    pub sorts_dispatched: usize,
    pub frames_skipped: usize,
    pub sorts_failed: usize,
    pub average_key_compute_ms: f64,
    pub average_sort_ms: f64,
    pub average_visible_points: f64,
}
