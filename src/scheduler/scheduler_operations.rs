//! Sort Scheduler Operations - Pure DOP Functions
//!
//! Rules, evaluated once per frame in this order:
//! 1. dirty data triggers regardless of the camera
//! 2. inside the minimum sort interval skips
//! 3. no completed sort yet triggers
//! 4. otherwise the camera must have moved or turned past an epsilon
//!
//! A trigger is downgraded to a skip while `max_concurrent_sorts` jobs run.

use super::scheduler_data::{
    DispatchTicket, SchedulerPhase, SchedulerSettings, SkipReason, SortDecision, SortJobState,
    TriggerReason,
};
use crate::camera::{pose_delta, CameraPose};
use crate::point::GenerationId;
use std::time::Instant;

// ============================================================================
// INITIALIZATION
// ============================================================================

pub fn create_scheduler_state() -> SortJobState {
    SortJobState {
        last_sorted_pose: None,
        last_sort_time: None,
        dirty: false,
        latest_generation: GenerationId(0),
        last_sorted_generation: None,
        jobs_in_flight: 0,
        next_sequence: 1,
        last_completed_sequence: 0,
        phase: SchedulerPhase::Idle,
    }
}

// ============================================================================
// DECISION
// ============================================================================

/// Apply the trigger rules, ignoring the in-flight limit
pub fn trigger_reason(
    state: &SortJobState,
    settings: &SchedulerSettings,
    camera: &CameraPose,
    now: Instant,
) -> Result<TriggerReason, SkipReason> {
    if state.dirty {
        return Ok(TriggerReason::Dirty);
    }

    if let Some(last) = state.last_sort_time {
        if now.saturating_duration_since(last) < settings.minimum_sort_interval {
            return Err(SkipReason::RateLimited);
        }
    }

    let Some(previous) = state.last_sorted_pose else {
        return Ok(TriggerReason::ColdStart);
    };

    let delta = pose_delta(camera, &previous);
    if delta.position_delta > settings.position_epsilon
        || delta.direction_delta > settings.direction_epsilon
    {
        Ok(TriggerReason::CameraMoved {
            position_delta: delta.position_delta,
            direction_delta: delta.direction_delta,
        })
    } else {
        Err(SkipReason::CameraStill)
    }
}

/// Decide this frame's outcome and record the phase
pub fn evaluate_frame(
    state: &mut SortJobState,
    settings: &SchedulerSettings,
    camera: &CameraPose,
    now: Instant,
) -> SortDecision {
    let decision = match trigger_reason(state, settings, camera, now) {
        Ok(_) if state.jobs_in_flight >= settings.max_concurrent_sorts.max(1) => {
            SortDecision::Skip(SkipReason::InFlightLimit)
        }
        Ok(reason) => SortDecision::Trigger(reason),
        Err(reason) => SortDecision::Skip(reason),
    };

    state.phase = match decision {
        SortDecision::Trigger(_) => SchedulerPhase::Triggered,
        // Jobs already running keep the scheduler in Running
        SortDecision::Skip(_) if state.jobs_in_flight > 0 => SchedulerPhase::Running,
        SortDecision::Skip(_) => SchedulerPhase::Skipped,
    };
    decision
}

// ============================================================================
// JOB LIFECYCLE
// ============================================================================

/// Record a dispatch and hand out the job's ticket
pub fn begin_job(
    state: &mut SortJobState,
    camera: &CameraPose,
    generation: GenerationId,
    reason: TriggerReason,
    now: Instant,
) -> DispatchTicket {
    let sequence = state.next_sequence;
    state.next_sequence += 1;
    state.jobs_in_flight += 1;
    state.last_sort_time = Some(now);
    state.phase = SchedulerPhase::Running;

    DispatchTicket {
        sequence,
        generation,
        pose: *camera,
        reason,
        dispatched_at: now,
    }
}

fn finish_job(state: &mut SortJobState) {
    state.jobs_in_flight = state.jobs_in_flight.saturating_sub(1);
    if state.jobs_in_flight == 0 {
        state.phase = SchedulerPhase::Idle;
    }
}

/// Record a successful job; returns false when a newer job already completed
///
/// `dirty` is only cleared when the job covered the newest generation.
pub fn complete_job(state: &mut SortJobState, ticket: &DispatchTicket) -> bool {
    finish_job(state);

    if ticket.sequence <= state.last_completed_sequence {
        return false;
    }

    state.last_completed_sequence = ticket.sequence;
    state.last_sorted_pose = Some(ticket.pose);
    state.last_sorted_generation = Some(ticket.generation);
    if ticket.generation >= state.latest_generation {
        state.dirty = false;
    }
    true
}

/// Record a failed job; `dirty` stays as it was so the next frame retries
pub fn fail_job(state: &mut SortJobState, ticket: &DispatchTicket) {
    finish_job(state);
    log::warn!(
        "[SortScheduler::fail_job] Job #{} for generation {} failed, will retry",
        ticket.sequence,
        ticket.generation.0
    );
}

/// Point data changed: the next evaluation triggers
pub fn mark_dirty(state: &mut SortJobState, generation: GenerationId) {
    state.dirty = true;
    state.latest_generation = state.latest_generation.max(generation);
}
