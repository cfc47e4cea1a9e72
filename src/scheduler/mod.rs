//! Sort Scheduler - decides per frame whether a new sort is dispatched
//!
//! - scheduler_data.rs: job state, settings and decisions
//! - scheduler_operations.rs: trigger rules and job lifecycle

pub mod scheduler_data;
pub mod scheduler_operations;

pub use scheduler_data::{
    DispatchTicket, SchedulerPhase, SchedulerSettings, SkipReason, SortDecision, SortJobState,
    TriggerReason,
};
pub use scheduler_operations::{
    begin_job, complete_job, create_scheduler_state, evaluate_frame, fail_job, mark_dirty,
    trigger_reason,
};
