//! Frame Statistics - per-frame snapshots, history and observers
//!
//! - stats_data.rs: snapshot types and the observer trait
//! - stats_operations.rs: recording, summaries and JSON export

pub mod stats_data;
pub mod stats_operations;

pub use stats_data::{
    FrameObserver, FrameStatistics, SharedTelemetry, SortOutcome, TelemetryData,
    TelemetrySummary,
};
pub use stats_operations::{
    add_observer, counts_as_skip, create_telemetry, history_to_json, latest_frame,
    record_frame, report_sort_error, summarize_history,
};
