//! Splat core - the per-frame contract between ingestion, sorting and drawing
//!
//! `SplatCore` owns the shared pieces (point store, buffer pool, scheduler
//! state, latest-permutation cell, telemetry) and wires them together.
//! Every method takes `&self`, so the ingestion thread and the render
//! thread can share one core behind an `Arc`.
//!
//! Frame protocol on the render thread:
//! 1. `update(camera, now)` collects finished jobs, decides and dispatches
//! 2. draw with the returned permutation and view
//! 3. `end_frame()` publishes statistics and ages idle scratch

use crate::camera::{log_pose_context, CameraPose};
use crate::config::{SortExecution, SplatConfig};
use crate::constants::lod::BAND_COUNT;
use crate::constants::points::DEFAULT_STREAM_BATCH;
use crate::constants::telemetry::HISTORY_FRAMES;
use crate::error::{EngineError, EngineResult};
use crate::memory::{
    advance_frame, create_buffer_pool, on_memory_pressure, pool_occupancy, MemoryPressure,
    PoolOccupancy, SharedBufferPool, TrimReport,
};
use crate::point::{
    begin_frame, create_shared_point_store, drain_upload_count, ingest_points, ingest_stream,
    live_point_count, reclaim_retired, release_recycled, replace_points, swap_buffers, GenerationId,
    Point, PointView, SharedPointStore,
};
use crate::scheduler::{
    begin_job, complete_job, create_scheduler_state, evaluate_frame, fail_job, mark_dirty,
    DispatchTicket, SchedulerPhase, SchedulerSettings, SkipReason, SortDecision, SortJobState,
};
use crate::sort::{
    create_latest_permutation, empty_permutation, execute_sort_job, load_permutation,
    publish_permutation, LatestPermutation, Permutation, PublishOutcome, SortJobOutput,
    SortJobRequest,
};
use crate::telemetry::{
    add_observer, create_telemetry, record_frame, report_sort_error, FrameObserver,
    FrameStatistics, SharedTelemetry, SortOutcome,
};
use crate::thread_pool::{
    create_sort_worker_pool, spawn_job, worker_stats, SortWorkerPool, WorkerStats,
};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A finished job on its way back to the scheduler
struct JobCompletion {
    ticket: DispatchTicket,
    view: PointView,
    result: EngineResult<SortJobOutput>,
}

/// What `update` did this frame
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_index: u64,
    pub decision: SortDecision,

    /// Ticket of the job dispatched this frame
    pub dispatched: Option<DispatchTicket>,

    /// Jobs collected this frame, successful or not
    pub completed: u32,
    pub failed: u32,

    /// Permutation to draw with, and the point data its indices refer to
    pub permutation: Arc<Permutation>,
    pub view: PointView,
}

/// Per-frame values gathered by `update` for `end_frame`
#[derive(Debug, Default)]
struct FrameAccumulator {
    outcome: Option<SortOutcome>,
    failure: Option<(u64, String)>,
    key_compute_ms: Option<f64>,
    sort_ms: Option<f64>,
}

/// Values carried over from the newest completed sort
#[derive(Debug)]
struct SortedState {
    /// Point data the published permutation indexes into
    view: PointView,
    visible_points: usize,
    lod_histogram: [u32; BAND_COUNT],
}

pub struct SplatCore {
    config: SplatConfig,
    settings: SchedulerSettings,
    store: SharedPointStore,
    pool: SharedBufferPool,
    latest: Arc<LatestPermutation>,
    scheduler: Mutex<SortJobState>,
    sorted: RwLock<SortedState>,
    telemetry: SharedTelemetry,
    workers: Option<SortWorkerPool>,
    completion_tx: Sender<JobCompletion>,
    completion_rx: Receiver<JobCompletion>,
    frame: Mutex<FrameAccumulator>,
    frame_index: Mutex<u64>,
}

impl SplatCore {
    pub fn new(config: SplatConfig) -> EngineResult<Self> {
        log::debug!("[SplatCore::new] Starting sort core initialization");

        if let Err(e) = config.validate() {
            log::error!("[SplatCore::new] Configuration validation failed: {}", e);
            log::error!("[SplatCore::new] Suggestions:\n{}", config.suggest_safe_config());
            return Err(EngineError::InvalidConfig {
                field: "config".to_string(),
                value: String::new(),
                reason: e.to_string(),
            });
        }

        let store = create_shared_point_store(config.store_limits());
        let pool = create_buffer_pool(config.pool_growth_quantum, config.pool_max_bytes);
        let initial = begin_frame(&store);
        let latest = Arc::new(create_latest_permutation(empty_permutation(
            initial.generation,
            config.sort_mode,
            config.sort_order,
        )));

        let workers = match config.execution {
            SortExecution::Async => Some(create_sort_worker_pool(&config.thread_pool_config())?),
            SortExecution::Inline => None,
        };

        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();

        log::info!(
            "[SplatCore::new] Ready: mode={:?}, order={:?}, execution={:?}, max_concurrent_sorts={}",
            config.sort_mode,
            config.sort_order,
            config.execution,
            config.max_concurrent_sorts
        );

        Ok(Self {
            settings: config.scheduler_settings(),
            config,
            store,
            pool,
            latest,
            scheduler: Mutex::new(create_scheduler_state()),
            sorted: RwLock::new(SortedState {
                view: initial,
                visible_points: 0,
                lod_histogram: [0; BAND_COUNT],
            }),
            telemetry: create_telemetry(HISTORY_FRAMES),
            workers,
            completion_tx,
            completion_rx,
            frame: Mutex::new(FrameAccumulator::default()),
            frame_index: Mutex::new(0),
        })
    }

    /// Load a TOML configuration file and build a core from it
    pub fn from_config_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let config = crate::config::load_config_file(path)?;
        Self::new(config)
    }

    pub fn config(&self) -> &SplatConfig {
        &self.config
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    /// Append points to the staging buffer
    pub fn ingest(&self, points: &[Point]) -> EngineResult<GenerationId> {
        ingest_points(&self.store, points)
    }

    /// Ingest a lazy stream in default-sized batches
    pub fn ingest_stream<I>(&self, points: I) -> EngineResult<GenerationId>
    where
        I: IntoIterator<Item = Point>,
    {
        ingest_stream(&self.store, points, DEFAULT_STREAM_BATCH)
    }

    /// Stage `points` as the complete new contents
    pub fn replace(&self, points: &[Point]) -> EngineResult<GenerationId> {
        replace_points(&self.store, points)
    }

    /// Make the staged points active and mark the data dirty
    pub fn swap(&self) -> Option<GenerationId> {
        let generation = swap_buffers(&self.store)?;
        mark_dirty(&mut self.scheduler.lock(), generation);
        Some(generation)
    }

    // ========================================================================
    // RENDER
    // ========================================================================

    pub fn current_permutation(&self) -> Arc<Permutation> {
        load_permutation(&self.latest)
    }

    pub fn active_point_view(&self) -> PointView {
        begin_frame(&self.store)
    }

    /// The published permutation and the point data it was computed against
    pub fn draw_set(&self) -> (Arc<Permutation>, PointView) {
        let sorted = self.sorted.read();
        (load_permutation(&self.latest), sorted.view.clone())
    }

    // ========================================================================
    // PER FRAME
    // ========================================================================

    /// Collect finished jobs, evaluate the scheduler and dispatch
    pub fn update(&self, camera: &CameraPose, now: Instant) -> EngineResult<FrameReport> {
        let frame_index = *self.frame_index.lock();
        let (mut completed, mut failed) = self.drain_completions();

        let (decision, job, outcome) = {
            let mut scheduler = self.scheduler.lock();
            let decision = evaluate_frame(&mut scheduler, &self.settings, camera, now);
            match decision {
                SortDecision::Trigger(reason) => {
                    let view = self.active_point_view();
                    let ticket = begin_job(&mut scheduler, camera, view.generation, reason, now);
                    let outcome = SortOutcome::Dispatched {
                        sequence: ticket.sequence,
                        reason,
                    };
                    (decision, Some((ticket, view)), outcome)
                }
                SortDecision::Skip(reason) => (decision, None, SortOutcome::Skipped { reason }),
            }
        };
        self.frame.lock().outcome = Some(outcome);

        let dispatched = job.as_ref().map(|(ticket, _)| *ticket);
        if let Some((ticket, view)) = job {
            log::trace!(
                "[SplatCore::update] Dispatching #{} ({:?})",
                ticket.sequence,
                ticket.reason
            );
            log_pose_context(camera);

            if self.dispatch(ticket, view)? {
                // Inline jobs finish before dispatch returns
                let (c, f) = self.drain_completions();
                completed += c;
                failed += f;
            }
        }

        let (permutation, view) = self.draw_set();
        Ok(FrameReport {
            frame_index,
            decision,
            dispatched,
            completed,
            failed,
            permutation,
            view,
        })
    }

    /// Record the frame's statistics and age idle scratch
    pub fn end_frame(&self) -> FrameStatistics {
        let accumulated = std::mem::take(&mut *self.frame.lock());

        let buffer_uploads = drain_upload_count(&self.store);
        let reclaimed = reclaim_retired(&self.store);
        if reclaimed > 0 {
            log::trace!("[SplatCore::end_frame] Reclaimed {} retired buffers", reclaimed);
        }
        let live_points = live_point_count(&self.store);

        let (visible_points, lod_histogram) = {
            let sorted = self.sorted.read();
            (sorted.visible_points, sorted.lod_histogram)
        };
        let permutation = load_permutation(&self.latest);
        let jobs_in_flight = self.scheduler.lock().jobs_in_flight;

        let sort_outcome = match (accumulated.failure, accumulated.outcome) {
            (Some((sequence, error)), _) => SortOutcome::Failed { sequence, error },
            (None, Some(outcome)) => outcome,
            (None, None) => SortOutcome::Skipped {
                reason: SkipReason::NotEvaluated,
            },
        };

        let frame_index = {
            let mut index = self.frame_index.lock();
            let current = *index;
            *index += 1;
            current
        };

        let stats = FrameStatistics {
            frame_index,
            sort_outcome,
            key_compute_ms: accumulated.key_compute_ms,
            sort_ms: accumulated.sort_ms,
            buffer_uploads,
            live_points,
            visible_points,
            lod_histogram,
            pool: pool_occupancy(&self.pool),
            jobs_in_flight,
            permutation_sequence: permutation.sequence,
            permutation_generation: permutation.generation.0,
        };

        // Idle scratch only ages here; it is freed by `on_memory_pressure`
        // or an explicit `trim_idle`
        advance_frame(&self.pool);

        record_frame(&self.telemetry, stats.clone());
        stats
    }

    /// Block until every dispatched job has been collected
    pub fn wait_for_idle(&self, timeout: Duration) -> EngineResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.scheduler.lock().jobs_in_flight == 0 {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let completion = self.completion_rx.recv_timeout(remaining)?;
            self.handle_completion(completion);
        }
    }

    // ========================================================================
    // RESOURCES
    // ========================================================================

    /// Free idle scratch and retired point storage
    pub fn on_memory_pressure(&self, level: MemoryPressure) -> TrimReport {
        let report = on_memory_pressure(&self.pool, level, self.config.pool_trim_age_frames);

        reclaim_retired(&self.store);
        if level == MemoryPressure::Critical && release_recycled(&self.store) {
            log::debug!("[SplatCore::on_memory_pressure] Released recycled point storage");
        }
        report
    }

    pub fn add_observer(&self, observer: Arc<dyn FrameObserver>) {
        add_observer(&self.telemetry, observer);
    }

    pub fn telemetry(&self) -> &SharedTelemetry {
        &self.telemetry
    }

    pub fn pool_occupancy(&self) -> PoolOccupancy {
        pool_occupancy(&self.pool)
    }

    pub fn scheduler_phase(&self) -> SchedulerPhase {
        self.scheduler.lock().phase
    }

    pub fn jobs_in_flight(&self) -> u32 {
        self.scheduler.lock().jobs_in_flight
    }

    pub fn worker_stats(&self) -> Option<WorkerStats> {
        self.workers.as_ref().map(worker_stats)
    }

    // ========================================================================
    // JOBS
    // ========================================================================

    /// Start the job for `ticket`; returns true when it already ran inline
    fn dispatch(&self, ticket: DispatchTicket, view: PointView) -> EngineResult<bool> {
        let request = SortJobRequest {
            sequence: ticket.sequence,
            view: view.clone(),
            key_params: self.config.key_params(ticket.pose),
            order: self.config.sort_order,
            algorithm: self.config.order_algorithm,
        };

        match &self.workers {
            None => {
                let result = execute_sort_job(&request, &self.pool);
                self.send_completion(JobCompletion {
                    ticket,
                    view,
                    result,
                })?;
                Ok(true)
            }
            Some(workers) => {
                let pool = Arc::clone(&self.pool);
                let tx = self.completion_tx.clone();
                let panic_tx = self.completion_tx.clone();
                let panic_view = view.clone();

                spawn_job(
                    workers,
                    move || {
                        let result = execute_sort_job(&request, &pool);
                        // The core may have been dropped; nothing left to tell
                        let _ = tx.send(JobCompletion {
                            ticket,
                            view,
                            result,
                        });
                    },
                    move |message| {
                        let _ = panic_tx.send(JobCompletion {
                            ticket,
                            view: panic_view,
                            result: Err(EngineError::SortDispatchFailed {
                                sequence: ticket.sequence,
                                error: message,
                            }),
                        });
                    },
                );
                Ok(false)
            }
        }
    }

    fn send_completion(&self, completion: JobCompletion) -> EngineResult<()> {
        Ok(self.completion_tx.send(completion)?)
    }

    /// Handle every completion already waiting; returns (completed, failed)
    fn drain_completions(&self) -> (u32, u32) {
        let mut completed = 0;
        let mut failed = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            completed += 1;
            if !self.handle_completion(completion) {
                failed += 1;
            }
        }
        (completed, failed)
    }

    /// Apply one completion; returns false when the job failed
    fn handle_completion(&self, completion: JobCompletion) -> bool {
        let JobCompletion {
            ticket,
            view,
            result,
        } = completion;

        match result {
            Ok(output) => {
                let newest = complete_job(&mut self.scheduler.lock(), &ticket);
                if !newest {
                    log::debug!(
                        "[SplatCore::handle_completion] #{} finished after a newer sort, discarded",
                        ticket.sequence
                    );
                    return true;
                }

                {
                    // Held across the publish so draw_set never pairs a
                    // permutation with the wrong view
                    let mut sorted = self.sorted.write();
                    match publish_permutation(&self.latest, Arc::clone(&output.permutation)) {
                        PublishOutcome::Published { version } => {
                            sorted.view = view;
                            sorted.visible_points = output.visible_count;
                            sorted.lod_histogram = output.lod_histogram;
                            log::trace!(
                                "[SplatCore::handle_completion] Published #{} as version {}",
                                ticket.sequence,
                                version
                            );
                        }
                        PublishOutcome::Superseded {
                            held_generation,
                            held_sequence,
                        } => {
                            log::debug!(
                                "[SplatCore::handle_completion] #{} superseded by generation {} sort #{}",
                                ticket.sequence,
                                held_generation,
                                held_sequence
                            );
                        }
                    }
                }

                let mut frame = self.frame.lock();
                frame.key_compute_ms = Some(output.key_duration.as_secs_f64() * 1000.0);
                frame.sort_ms = Some(output.sort_duration.as_secs_f64() * 1000.0);
                true
            }
            Err(error) => {
                fail_job(&mut self.scheduler.lock(), &ticket);
                report_sort_error(&self.telemetry, ticket.sequence, &error);
                self.frame.lock().failure = Some((ticket.sequence, error.to_string()));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{init_pose, pose_looking_at};
    use crate::memory::BufferPurpose;
    use crate::memory::acquire_buffer;
    use crate::scheduler::TriggerReason;
    use crate::sort::{is_valid_permutation, SortMode, SortOrder};
    use cgmath::{Point3, Vector3};

    fn inline_config() -> SplatConfig {
        SplatConfig {
            execution: SortExecution::Inline,
            sort_order: SortOrder::Ascending,
            ..Default::default()
        }
    }

    fn points_on_x(count: usize) -> Vec<Point> {
        (0..count)
            .map(|i| Point {
                position: [(count - i) as f32, 0.0, 0.0],
                color: [1.0, 1.0, 1.0, 1.0],
                sh_rest: Vec::new(),
                bounding_radius: None,
            })
            .collect()
    }

    fn origin_camera() -> CameraPose {
        init_pose(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0))
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SplatConfig {
            max_concurrent_sorts: 0,
            ..inline_config()
        };
        assert!(matches!(
            SplatCore::new(config),
            Err(EngineError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_empty_core_publishes_empty_permutation() {
        let core = SplatCore::new(inline_config()).expect("core");
        let report = core.update(&origin_camera(), Instant::now()).expect("update");

        assert_eq!(report.decision, SortDecision::Trigger(TriggerReason::ColdStart));
        assert!(report.permutation.indices.is_empty());
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_inline_sort_after_swap() {
        let core = SplatCore::new(inline_config()).expect("core");
        core.ingest(&points_on_x(5)).expect("ingest");
        let generation = core.swap().expect("swap");

        let report = core.update(&origin_camera(), Instant::now()).expect("update");
        assert_eq!(report.decision, SortDecision::Trigger(TriggerReason::Dirty));
        assert_eq!(report.completed, 1);
        assert_eq!(report.permutation.generation, generation);
        // Points were ingested far to near
        assert_eq!(&report.permutation.indices[..], &[4, 3, 2, 1, 0]);
        assert_eq!(report.view.generation, generation);

        let stats = core.end_frame();
        assert_eq!(stats.buffer_uploads, 1);
        assert_eq!(stats.live_points, 5);
        assert_eq!(stats.visible_points, 5);
        assert!(stats.sort_ms.is_some());
    }

    #[test]
    fn test_still_camera_reuses_permutation() {
        let core = SplatCore::new(inline_config()).expect("core");
        core.ingest(&points_on_x(3)).expect("ingest");
        core.swap();

        let now = Instant::now();
        let first = core.update(&origin_camera(), now).expect("update");
        core.end_frame();
        let second = core.update(&origin_camera(), now).expect("update");
        let stats = core.end_frame();

        assert_eq!(second.decision, SortDecision::Skip(SkipReason::CameraStill));
        assert!(Arc::ptr_eq(&first.permutation, &second.permutation));
        assert_eq!(
            stats.sort_outcome,
            SortOutcome::Skipped {
                reason: SkipReason::CameraStill
            }
        );
    }

    #[test]
    fn test_camera_move_resorts() {
        let core = SplatCore::new(inline_config()).expect("core");
        core.ingest(&points_on_x(4)).expect("ingest");
        core.swap();

        let now = Instant::now();
        core.update(&origin_camera(), now).expect("update");
        core.end_frame();

        // From beyond the far end the order reverses
        let moved = pose_looking_at(Point3::new(10.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0));
        let report = core.update(&moved, now).expect("update");
        assert!(matches!(
            report.decision,
            SortDecision::Trigger(TriggerReason::CameraMoved { .. })
        ));
        assert_eq!(&report.permutation.indices[..], &[0, 1, 2, 3]);
    }

    #[test]
    fn test_failed_job_keeps_last_good_permutation() {
        let config = SplatConfig {
            pool_growth_quantum: 16,
            pool_max_bytes: 1024,
            ..inline_config()
        };
        let core = SplatCore::new(config).expect("core");
        core.ingest(&points_on_x(8)).expect("ingest");
        core.swap();
        let first = core.update(&origin_camera(), Instant::now()).expect("update");
        core.end_frame();
        assert_eq!(first.permutation.indices.len(), 8);

        // A larger generation no longer fits the pool budget
        core.ingest(&points_on_x(200)).expect("ingest");
        core.swap();
        let report = core.update(&origin_camera(), Instant::now()).expect("update");
        let stats = core.end_frame();

        assert_eq!(report.failed, 1);
        assert!(Arc::ptr_eq(&first.permutation, &report.permutation));
        assert!(matches!(stats.sort_outcome, SortOutcome::Failed { .. }));
        // Still dirty, so the next frame retries
        assert_eq!(
            core.update(&origin_camera(), Instant::now())
                .expect("update")
                .decision,
            SortDecision::Trigger(TriggerReason::Dirty)
        );
    }

    #[test]
    fn test_async_sort_completes() {
        let config = SplatConfig {
            execution: SortExecution::Async,
            sort_threads: 2,
            ..inline_config()
        };
        let core = SplatCore::new(config).expect("core");
        core.ingest(&points_on_x(1000)).expect("ingest");
        let generation = core.swap().expect("swap");

        let report = core.update(&origin_camera(), Instant::now()).expect("update");
        assert!(report.dispatched.is_some());
        core.wait_for_idle(Duration::from_secs(10)).expect("idle");

        let (permutation, view) = core.draw_set();
        assert_eq!(permutation.generation, generation);
        assert_eq!(view.generation, generation);
        assert!(is_valid_permutation(&permutation.indices, 1000));
        assert_eq!(permutation.indices[0], 999);
        assert_eq!(core.jobs_in_flight(), 0);
        assert_eq!(core.worker_stats().map(|s| s.jobs_submitted), Some(1));
    }

    #[test]
    fn test_critical_pressure_frees_idle_scratch() {
        let core = SplatCore::new(inline_config()).expect("core");
        drop(acquire_buffer(&core.pool, BufferPurpose::Distances, 100).expect("acquire"));
        assert_eq!(core.pool_occupancy().idle_buffers, 1);

        let report = core.on_memory_pressure(MemoryPressure::Critical);
        assert_eq!(report.buffers_freed, 1);
        assert_eq!(core.pool_occupancy().idle_buffers, 0);
    }

    #[test]
    fn test_binned_mode_through_core() {
        let config = SplatConfig {
            sort_mode: SortMode::Binned,
            ..inline_config()
        };
        let core = SplatCore::new(config).expect("core");
        core.ingest(&points_on_x(64)).expect("ingest");
        core.swap();

        let report = core.update(&origin_camera(), Instant::now()).expect("update");
        assert_eq!(report.permutation.mode, SortMode::Binned);
        assert!(is_valid_permutation(&report.permutation.indices, 64));
        assert_eq!(report.permutation.indices[0], 63);
    }

    #[test]
    fn test_still_frames_keep_idle_scratch() {
        let core = SplatCore::new(inline_config()).expect("core");
        core.ingest(&points_on_x(10_000)).expect("ingest");
        core.swap();

        let start = Instant::now();
        core.update(&origin_camera(), start).expect("update");
        core.end_frame();
        let after_sort = core.pool_occupancy();
        assert!(after_sort.idle_buffers > 0);

        // Well past the trim age, with nothing sorting
        let still_frames = core.config().pool_trim_age_frames + 10;
        for frame in 1..=still_frames {
            let now = start + Duration::from_millis(16 * frame);
            let report = core.update(&origin_camera(), now).expect("update");
            assert_eq!(report.decision, SortDecision::Skip(SkipReason::CameraStill));
            core.end_frame();
        }

        let occupancy = core.pool_occupancy();
        assert_eq!(occupancy.total_freed, 0);
        assert_eq!(occupancy.idle_buffers, after_sort.idle_buffers);

        // The next sort reuses the scratch it left behind
        let moved = pose_looking_at(Point3::new(-5.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0));
        let later = start + Duration::from_millis(16 * (still_frames + 1));
        let report = core.update(&moved, later).expect("update");
        assert_eq!(report.completed, 1);
        assert_eq!(core.pool_occupancy().total_allocations, after_sort.total_allocations);

        // Memory pressure is what releases it
        let report = core.on_memory_pressure(MemoryPressure::Critical);
        assert_eq!(report.buffers_freed, after_sort.idle_buffers);
    }

    #[test]
    fn test_frames_continue_during_ingestion() {
        let core = Arc::new(SplatCore::new(inline_config()).expect("core"));
        core.ingest(&points_on_x(100)).expect("ingest");
        core.swap();

        let producer = {
            let core = Arc::clone(&core);
            std::thread::spawn(move || {
                for _ in 0..10 {
                    core.ingest(&points_on_x(20_000)).expect("ingest");
                    core.swap();
                }
            })
        };

        let start = Instant::now();
        let mut frame = 0;
        let mut last = GenerationId(0);
        while !producer.is_finished() {
            let view = core.active_point_view();
            assert!(view.generation >= last);
            last = view.generation;

            let report = core
                .update(&origin_camera(), start + Duration::from_millis(16 * frame))
                .expect("update");
            assert!(is_valid_permutation(
                &report.permutation.indices,
                report.view.positions.len()
            ));
            core.end_frame();
            frame += 1;
        }
        producer.join().expect("producer thread");

        let report = core
            .update(&origin_camera(), start + Duration::from_millis(16 * frame))
            .expect("update");
        assert_eq!(report.view.positions.len(), 100 + 10 * 20_000);
        assert_eq!(report.permutation.generation, report.view.generation);
    }
}
