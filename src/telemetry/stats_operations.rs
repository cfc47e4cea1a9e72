//! Frame Statistics Operations - Pure DOP Functions
//!
//! Observers are notified outside the lock; the render thread only holds it
//! long enough to push one snapshot.

use super::stats_data::{
    FrameObserver, FrameStatistics, SharedTelemetry, SortOutcome, TelemetryData,
    TelemetrySummary,
};
use crate::error::{EngineError, EngineResult, ErrorContext};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

// ============================================================================
// INITIALIZATION
// ============================================================================

pub fn create_telemetry(capacity: usize) -> SharedTelemetry {
    Arc::new(RwLock::new(TelemetryData {
        history: VecDeque::with_capacity(capacity),
        capacity,
        observers: Vec::new(),
        frames_recorded: 0,
    }))
}

pub fn add_observer(telemetry: &SharedTelemetry, observer: Arc<dyn FrameObserver>) {
    telemetry.write().observers.push(observer);
}

fn observers(telemetry: &SharedTelemetry) -> Vec<Arc<dyn FrameObserver>> {
    telemetry.read().observers.clone()
}

// ============================================================================
// RECORDING
// ============================================================================

/// Append a snapshot to the history and hand it to every observer
pub fn record_frame(telemetry: &SharedTelemetry, stats: FrameStatistics) {
    let stats = {
        let mut data = telemetry.write();
        if data.capacity > 0 {
            while data.history.len() >= data.capacity {
                data.history.pop_front();
            }
            data.history.push_back(stats.clone());
        }
        data.frames_recorded += 1;
        stats
    };

    for observer in observers(telemetry) {
        observer.on_frame(&stats);
    }
}

/// Tell observers a sort job failed
pub fn report_sort_error(telemetry: &SharedTelemetry, sequence: u64, error: &EngineError) {
    log::warn!(
        "[Telemetry::report_sort_error] Sort #{} failed: {}",
        sequence,
        error
    );
    for observer in observers(telemetry) {
        observer.on_sort_error(sequence, error);
    }
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn latest_frame(telemetry: &SharedTelemetry) -> Option<FrameStatistics> {
    telemetry.read().history.back().cloned()
}

/// True for outcomes where the previous permutation was reused
pub fn counts_as_skip(outcome: &SortOutcome) -> bool {
    !matches!(outcome, SortOutcome::Dispatched { .. })
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn summarize_history(telemetry: &SharedTelemetry) -> TelemetrySummary {
    let data = telemetry.read();
    let history = &data.history;

    TelemetrySummary {
        frames: history.len(),
        sorts_dispatched: history
            .iter()
            .filter(|s| !counts_as_skip(&s.sort_outcome))
            .count(),
        frames_skipped: history
            .iter()
            .filter(|s| counts_as_skip(&s.sort_outcome))
            .count(),
        sorts_failed: history
            .iter()
            .filter(|s| matches!(s.sort_outcome, SortOutcome::Failed { .. }))
            .count(),
        average_key_compute_ms: mean(history.iter().filter_map(|s| s.key_compute_ms)),
        average_sort_ms: mean(history.iter().filter_map(|s| s.sort_ms)),
        average_visible_points: mean(history.iter().map(|s| s.visible_points as f64)),
    }
}

/// Serialize the retained history as a JSON array
pub fn history_to_json(telemetry: &SharedTelemetry) -> EngineResult<String> {
    let data = telemetry.read();
    serde_json::to_string_pretty(&data.history).context("serializing frame history")
}
