//! The scheduler loop: admission control, dispatch, and lifecycle.
//!
//! Single-threaded cooperative loop.  Each tick polls active runs for
//! metrics (which may terminate trials), backfills worker capacity with new
//! trials from the optimizer adapter, and hands at most one queued run to
//! the external launcher.  The dispatch-queue pop is the loop's only
//! suspension point.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use sl_optimizer::{OptimizerAdapter, TrialOutcome};
use sl_types::{RunId, RunState, SchedulerConfig, SweepError, SweepResult, SweepRun};

use crate::launcher::{build_launch_payload, Launcher};
use crate::queue::DispatchQueue;
use crate::registry::RunRegistry;

/// Consecutive unknown polls tolerated before the scheduler gives up on a
/// run and evicts it as failed.
pub(crate) const MAX_UNKNOWN_TICKS: u32 = 5;

/// External liveness probe, consulted before each admission attempt.  A dead
/// scheduler skips admission for the tick but keeps polling (graceful
/// degradation, not abort).
pub trait Liveness: Send {
    fn is_alive(&self) -> bool;
}

/// Default liveness probe: always alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAlive;

impl Liveness for AlwaysAlive {
    fn is_alive(&self) -> bool {
        true
    }
}

/// State machine of the loop itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Running,
    /// Stop was requested; the current tick finishes without admission.
    Stopping,
    Stopped,
}

/// Cloneable handle used to request a graceful stop from outside the loop.
#[derive(Debug, Clone, Default)]
pub struct SchedulerControl {
    stop: Arc<AtomicBool>,
}

impl SchedulerControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Events emitted by the scheduler for external consumption (logging, UI,
/// tests).  Drained by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchedulerEvent {
    TrialCreated { run_id: RunId, worker_id: usize },
    RunDispatched { run_id: RunId },
    RunPruned { run_id: RunId },
    RunCompleted { run_id: RunId },
    RunFailed { run_id: RunId },
    RunIsolated { run_id: RunId, reason: String },
    AdmissionSkipped { reason: String },
    QueueIdle,
}

/// Scheduler-side bookkeeping for one active run.
#[derive(Debug)]
pub(crate) struct TrackedRun {
    pub(crate) run: SweepRun,
    /// Whether the paired trial has received its terminal `tell`.
    pub(crate) told: bool,
    /// Consecutive polls that found the run unknown.
    pub(crate) unknown_ticks: u32,
}

/// The sweep scheduler.  Generic over the run registry and launcher so
/// callers can plug in the in-memory collaborators for sandbox use or real
/// backend adapters in production.
pub struct Scheduler<R: RunRegistry, L: Launcher> {
    pub(crate) config: SchedulerConfig,
    pub(crate) adapter: OptimizerAdapter,
    pub(crate) registry: R,
    launcher: L,
    liveness: Box<dyn Liveness>,
    pub(crate) queue: DispatchQueue,
    /// Active run bookkeeping; a slot stays occupied until termination has
    /// been processed here, not merely until the registry reports terminal.
    pub(crate) runs: HashMap<RunId, TrackedRun>,
    pub(crate) cursors: HashMap<RunId, u64>,
    state: LoopState,
    control: SchedulerControl,
    events: Vec<SchedulerEvent>,
}

impl<R: RunRegistry, L: Launcher> Scheduler<R, L> {
    pub fn new(
        config: SchedulerConfig,
        adapter: OptimizerAdapter,
        registry: R,
        launcher: L,
    ) -> SweepResult<Self> {
        if config.num_workers == 0 {
            return Err(SweepError::Config("num_workers must be at least 1".into()));
        }
        let queue = DispatchQueue::with_capacity(config.num_workers);
        Ok(Self {
            config,
            adapter,
            registry,
            launcher,
            liveness: Box::new(AlwaysAlive),
            queue,
            runs: HashMap::new(),
            cursors: HashMap::new(),
            state: LoopState::Stopped,
            control: SchedulerControl::new(),
            events: Vec::new(),
        })
    }

    pub fn with_liveness(mut self, liveness: Box<dyn Liveness>) -> Self {
        self.liveness = liveness;
        self
    }

    /// Run the loop until a stop is requested or a launch error surfaces.
    pub fn run(&mut self) -> SweepResult<()> {
        self.state = LoopState::Running;
        info!(
            sweep = %self.config.sweep_id,
            workers = self.config.num_workers,
            "scheduler started"
        );

        loop {
            if self.state == LoopState::Running && self.control.stop_requested() {
                info!("stop requested, finishing current tick");
                self.state = LoopState::Stopping;
            }

            if let Err(e) = self.tick() {
                self.state = LoopState::Stopped;
                return Err(e);
            }

            if self.state == LoopState::Stopping {
                break;
            }
        }

        self.state = LoopState::Stopped;
        info!("scheduler stopped");
        Ok(())
    }

    /// One scheduling tick: poll → terminate → admit → dispatch.
    pub fn tick(&mut self) -> SweepResult<()> {
        let to_kill = self.poll_active_runs();
        for run_id in to_kill {
            self.terminate_run(&run_id);
        }

        if self.state != LoopState::Stopping {
            for worker_id in 0..self.config.num_workers {
                self.heartbeat(worker_id);
            }
        }

        let Some(run_id) = self.queue.pop_timeout(self.config.queue_timeout()) else {
            info!("no jobs in the dispatch queue, waiting");
            self.events.push(SchedulerEvent::QueueIdle);
            std::thread::sleep(self.config.queue_sleep());
            return Ok(());
        };

        // Stopped upstream between admission and dispatch: drop silently.
        let Some(tracked) = self.runs.get(&run_id) else {
            debug!(run = %run_id, "popped run no longer tracked, dropping");
            return Ok(());
        };
        if tracked.run.state.is_dead() {
            debug!(run = %run_id, state = ?tracked.run.state, "popped run already dead, dropping");
            return Ok(());
        }

        info!(run = %run_id, "converting run to launch job");
        let payload = build_launch_payload(&tracked.run);
        if let Err(e) = self.launcher.submit(payload) {
            error!(run = %run_id, error = %e, "launch submission failed");
            self.finish_trial(&run_id, TrialOutcome::Failed);
            self.terminate_run(&run_id);
            return Err(e.into());
        }

        self.events.push(SchedulerEvent::RunDispatched { run_id });
        Ok(())
    }

    /// Admission check for one worker slot.  Idempotent within a tick:
    /// a non-empty dispatch queue or full capacity makes it a no-op, so at
    /// most one trial is admitted per idle check.
    fn heartbeat(&mut self, worker_id: usize) {
        if !self.liveness.is_alive() {
            debug!(worker = worker_id, "scheduler not alive, skipping admission");
            return;
        }
        if !self.queue.is_empty() || self.runs.len() >= self.config.num_workers {
            return;
        }

        let (config, trial) = match self.adapter.ask(&self.config.parameters) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(worker = worker_id, error = %e, "could not create trial, skipping admission");
                self.events.push(SchedulerEvent::AdmissionSkipped {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let run_id = match self.registry.register_run(
            &self.config.project,
            &self.config.entity,
            &self.config.sweep_id,
            &config,
        ) {
            Ok(id) => id,
            Err(e) => {
                warn!(worker = worker_id, error = %e, "run registration failed, skipping admission");
                // The trial still gets its single terminal report.
                if let Err(tell_err) = self.adapter.tell(trial, TrialOutcome::Failed) {
                    error!(trial = %trial, error = %tell_err, "could not fail orphaned trial");
                }
                self.events.push(SchedulerEvent::AdmissionSkipped {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let run = SweepRun::new(run_id.clone(), trial, worker_id, config);
        self.runs.insert(
            run_id.clone(),
            TrackedRun {
                run,
                told: false,
                unknown_ticks: 0,
            },
        );
        self.cursors.insert(run_id.clone(), 0);

        if let Err(e) = self.queue.push(run_id.clone()) {
            // Unreachable under the empty-queue admission guard.
            error!(run = %run_id, error = %e, "dispatch enqueue failed");
        }

        info!(run = %run_id, worker = worker_id, "admitted new trial");
        self.events
            .push(SchedulerEvent::TrialCreated { run_id, worker_id });
    }

    /// Issue the terminal `tell` for a run's trial (once) and record its
    /// final state.
    pub(crate) fn finish_trial(&mut self, run_id: &RunId, outcome: TrialOutcome) {
        let Some(tracked) = self.runs.get_mut(run_id) else {
            return;
        };

        if !tracked.told {
            if let Err(e) = self.adapter.tell(tracked.run.trial, outcome) {
                error!(run = %run_id, error = %e, "terminal report failed");
            }
            tracked.told = true;
        }

        let (state, event) = match outcome {
            TrialOutcome::Complete => (
                RunState::Completed,
                SchedulerEvent::RunCompleted {
                    run_id: run_id.clone(),
                },
            ),
            TrialOutcome::Pruned => (
                RunState::Pruned,
                SchedulerEvent::RunPruned {
                    run_id: run_id.clone(),
                },
            ),
            TrialOutcome::Failed => (
                RunState::Failed,
                SchedulerEvent::RunFailed {
                    run_id: run_id.clone(),
                },
            ),
        };
        tracked.run.state = state;
        self.events.push(event);
    }

    /// Remove a run's bookkeeping (freeing its worker slot) and ask the
    /// registry to stop it.
    fn terminate_run(&mut self, run_id: &RunId) {
        if let Some(tracked) = self.runs.remove(run_id) {
            debug_assert!(
                tracked.told,
                "terminating run {run_id} whose trial was never told"
            );
            self.cursors.remove(run_id);
            if let Err(e) = self.registry.stop_run(run_id) {
                warn!(run = %run_id, error = %e, "stop request failed");
            }
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Handle for requesting a graceful stop from another thread.
    pub fn control(&self) -> SchedulerControl {
        self.control.clone()
    }

    pub fn active_run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn adapter(&self) -> &OptimizerAdapter {
        &self.adapter
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Mutable access to the registry (e.g. for driving metrics on the
    /// in-memory registry between ticks).
    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Drain all emitted events (consuming them).
    pub fn drain_events(&mut self) -> Vec<SchedulerEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn push_event(&mut self, event: SchedulerEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::RecordingLauncher;
    use crate::registry::{InMemoryRegistry, MetricSample, RunStatus};
    use serde_json::json;
    use sl_types::{
        Direction, PrunerConfig, RegistryError, RunConfig, SweepParameters, TrialHandle,
    };

    fn sweep_parameters() -> SweepParameters {
        SweepParameters::new()
            .add_float("momentum", 0.5, 0.99)
            .add_int("batch_size", 16, 64)
    }

    fn test_config(num_workers: usize, pruner: PrunerConfig) -> SchedulerConfig {
        SchedulerConfig::new("team", "demo", "sweep-1", "val_loss", sweep_parameters())
            .with_num_workers(num_workers)
            .with_pruner(pruner)
            .with_queue_timing(0.01, 0.0)
    }

    fn nop_pruner() -> PrunerConfig {
        PrunerConfig {
            kind: "none".into(),
            ..Default::default()
        }
    }

    fn patient_pruner(patience: u64) -> PrunerConfig {
        PrunerConfig {
            kind: "patient".into(),
            patience: Some(patience),
            ..Default::default()
        }
    }

    fn test_scheduler(
        num_workers: usize,
        pruner: PrunerConfig,
        direction: Direction,
    ) -> Scheduler<InMemoryRegistry, RecordingLauncher> {
        let config = test_config(num_workers, pruner.clone()).with_direction(direction);
        let adapter = OptimizerAdapter::new(&pruner, direction);
        Scheduler::new(
            config,
            adapter,
            InMemoryRegistry::new(),
            RecordingLauncher::new(),
        )
        .unwrap()
    }

    /// The single tracked run's (id, trial) pair.
    fn only_run<R: RunRegistry, L: Launcher>(scheduler: &Scheduler<R, L>) -> (RunId, TrialHandle) {
        let tracked = scheduler.runs.values().next().expect("no tracked run");
        (tracked.run.id.clone(), tracked.run.trial)
    }

    #[test]
    fn zero_workers_is_a_construction_error() {
        let pruner = nop_pruner();
        let config = test_config(0, pruner.clone());
        let adapter = OptimizerAdapter::new(&pruner, Direction::Minimize);
        let result = Scheduler::new(
            config,
            adapter,
            InMemoryRegistry::new(),
            RecordingLauncher::new(),
        );
        assert!(matches!(result, Err(SweepError::Config(_))));
    }

    #[test]
    fn heartbeat_admits_exactly_one_trial_per_idle_check() {
        // Scenario A: two free slots, empty queue, zero active runs.
        let mut scheduler = test_scheduler(2, nop_pruner(), Direction::Minimize);

        for worker_id in 0..2 {
            scheduler.heartbeat(worker_id);
        }

        // Only the first heartbeat admits; the second sees a non-empty queue.
        assert_eq!(scheduler.active_run_count(), 1);
        assert_eq!(scheduler.queue.len(), 1);
        assert_eq!(scheduler.adapter().trial_count(), 1);
    }

    #[test]
    fn heartbeat_is_noop_at_capacity() {
        let mut scheduler = test_scheduler(1, nop_pruner(), Direction::Minimize);
        scheduler.tick().unwrap(); // admit + dispatch

        assert_eq!(scheduler.active_run_count(), 1);
        scheduler.heartbeat(0);
        assert_eq!(scheduler.active_run_count(), 1);
        assert_eq!(scheduler.adapter().trial_count(), 1);
    }

    #[test]
    fn tick_dispatches_admitted_run() {
        let mut scheduler = test_scheduler(2, nop_pruner(), Direction::Minimize);
        scheduler.tick().unwrap();

        assert_eq!(scheduler.launcher().submitted.len(), 1);
        assert!(scheduler.queue.is_empty());
        assert_eq!(scheduler.active_run_count(), 1);

        let payload = &scheduler.launcher().submitted[0];
        assert!(payload.overrides["run_config"]["momentum"].is_number());
        assert!(payload.overrides["run_config"]["batch_size"].is_number());
    }

    #[test]
    fn active_runs_never_exceed_worker_slots() {
        let mut scheduler = test_scheduler(2, nop_pruner(), Direction::Minimize);
        for _ in 0..5 {
            scheduler.tick().unwrap();
            assert!(scheduler.active_run_count() <= 2);
        }
        assert_eq!(scheduler.active_run_count(), 2);
    }

    #[test]
    fn pruning_fires_and_tells_exactly_once() {
        // Scenario B: patience=2, maximize, metrics [0.9, 0.7, 0.5].
        let mut scheduler = test_scheduler(1, patient_pruner(2), Direction::Maximize);
        scheduler.tick().unwrap();
        let (run_id, trial) = only_run(&scheduler);

        scheduler.registry_mut().set_status(&run_id, RunStatus::Running);
        for (step, value) in [(0u64, 0.9), (1, 0.7), (2, 0.5)] {
            scheduler.registry_mut().log_metric(&run_id, "val_loss", step, value);
        }

        scheduler.tick().unwrap();

        assert_eq!(
            scheduler.adapter().outcome(trial),
            Some(sl_optimizer::TrialOutcome::Pruned)
        );
        assert!(!scheduler.runs.contains_key(&run_id));
        assert!(!scheduler.cursors.contains_key(&run_id));
        // Termination asked the registry to stop the run.
        assert_eq!(
            scheduler.registry().run_status(&run_id).unwrap(),
            RunStatus::Finished
        );
        assert!(scheduler
            .drain_events()
            .iter()
            .any(|e| matches!(e, SchedulerEvent::RunPruned { run_id: id } if *id == run_id)));
    }

    #[test]
    fn finished_run_completes_without_further_reports() {
        // Scenario C: history fully consumed before the registry reports
        // the run finished.
        let mut scheduler = test_scheduler(1, nop_pruner(), Direction::Minimize);
        scheduler.tick().unwrap();
        let (run_id, trial) = only_run(&scheduler);

        scheduler.registry_mut().set_status(&run_id, RunStatus::Running);
        scheduler.registry_mut().log_metric(&run_id, "val_loss", 0, 0.3);
        scheduler.registry_mut().log_metric(&run_id, "val_loss", 1, 0.2);
        scheduler.tick().unwrap();

        assert_eq!(scheduler.cursors[&run_id], 2);
        assert_eq!(scheduler.adapter().intermediate_values(trial).unwrap().len(), 2);

        scheduler.registry_mut().set_status(&run_id, RunStatus::Finished);
        scheduler.tick().unwrap();

        assert_eq!(
            scheduler.adapter().outcome(trial),
            Some(sl_optimizer::TrialOutcome::Complete)
        );
        // No new reports were issued for the finished run.
        assert_eq!(scheduler.adapter().intermediate_values(trial).unwrap().len(), 2);
        assert!(!scheduler.runs.contains_key(&run_id));
    }

    #[test]
    fn prune_beats_finished_in_the_same_tick() {
        let mut scheduler = test_scheduler(1, patient_pruner(1), Direction::Maximize);
        scheduler.tick().unwrap();
        let (run_id, trial) = only_run(&scheduler);

        scheduler.registry_mut().log_metric(&run_id, "val_loss", 0, 0.9);
        scheduler.registry_mut().log_metric(&run_id, "val_loss", 1, 0.1);
        scheduler.registry_mut().set_status(&run_id, RunStatus::Finished);

        // Finished and prunable at once: exactly one tell, and it is Pruned.
        scheduler.tick().unwrap();
        assert_eq!(
            scheduler.adapter().outcome(trial),
            Some(sl_optimizer::TrialOutcome::Pruned)
        );
    }

    #[test]
    fn idle_tick_sleeps_and_returns() {
        // Scenario D: capacity full, queue empty → pop times out, loop yields.
        let mut scheduler = test_scheduler(1, nop_pruner(), Direction::Minimize);
        scheduler.tick().unwrap(); // fills the single slot

        scheduler.drain_events();
        scheduler.tick().unwrap();
        let events = scheduler.drain_events();
        assert!(events.contains(&SchedulerEvent::QueueIdle));
        assert_eq!(scheduler.launcher().submitted.len(), 1);
    }

    #[test]
    fn unsupported_parameter_skips_admission_and_continues() {
        // Scenario E: a parameter with no values/value/min/max.
        let pruner = nop_pruner();
        let mut config = test_config(2, pruner.clone());
        config.parameters = SweepParameters {
            parameters: [(
                "dropout".to_string(),
                sl_types::ParameterSpec::Opaque(json!({"distribution": "weird"})),
            )]
            .into_iter()
            .collect(),
        };
        let adapter = OptimizerAdapter::new(&pruner, Direction::Minimize);
        let mut scheduler = Scheduler::new(
            config,
            adapter,
            InMemoryRegistry::new(),
            RecordingLauncher::new(),
        )
        .unwrap();

        scheduler.tick().unwrap();

        assert_eq!(scheduler.active_run_count(), 0);
        assert_eq!(scheduler.adapter().trial_count(), 0);
        assert!(scheduler
            .drain_events()
            .iter()
            .any(|e| matches!(e, SchedulerEvent::AdmissionSkipped { .. })));
    }

    #[test]
    fn pending_run_is_a_wait_state() {
        let mut scheduler = test_scheduler(1, nop_pruner(), Direction::Minimize);
        scheduler.tick().unwrap();
        let (run_id, trial) = only_run(&scheduler);

        // Registry never starts the run; the scheduler must not complete it.
        for _ in 0..3 {
            scheduler.tick().unwrap();
        }
        assert!(scheduler.runs.contains_key(&run_id));
        assert!(scheduler.adapter().outcome(trial).is_none());
    }

    #[test]
    fn launch_failure_fails_trial_and_surfaces() {
        let mut scheduler = test_scheduler(1, nop_pruner(), Direction::Minimize);
        scheduler.launcher = RecordingLauncher {
            fail_with: Some("queue full".into()),
            ..Default::default()
        };

        let result = scheduler.tick();
        assert!(matches!(result, Err(SweepError::Launch(_))));
        // The failed run no longer occupies a slot and its trial was told.
        assert_eq!(scheduler.active_run_count(), 0);
        assert_eq!(scheduler.adapter().live_trial_count(), 0);
    }

    struct DeadLiveness;
    impl Liveness for DeadLiveness {
        fn is_alive(&self) -> bool {
            false
        }
    }

    #[test]
    fn dead_liveness_skips_admission() {
        let mut scheduler = test_scheduler(2, nop_pruner(), Direction::Minimize)
            .with_liveness(Box::new(DeadLiveness));
        scheduler.tick().unwrap();
        assert_eq!(scheduler.active_run_count(), 0);
        assert_eq!(scheduler.adapter().trial_count(), 0);
    }

    #[test]
    fn stop_finishes_current_tick_without_admission() {
        let mut scheduler = test_scheduler(2, nop_pruner(), Direction::Minimize);
        scheduler.control().stop();

        scheduler.run().unwrap();

        assert_eq!(scheduler.state(), LoopState::Stopped);
        assert_eq!(scheduler.adapter().trial_count(), 0);
    }

    /// Registry whose runs never leave the unknown state.
    struct UnknownRegistry {
        next_id: u64,
    }

    impl RunRegistry for UnknownRegistry {
        fn register_run(
            &mut self,
            _: &str,
            _: &str,
            sweep_id: &str,
            _: &RunConfig,
        ) -> Result<RunId, RegistryError> {
            self.next_id += 1;
            Ok(RunId::new(format!("{sweep_id}-run-{}", self.next_id)))
        }

        fn metric_history(
            &self,
            _: &RunId,
            _: &str,
            _: u64,
        ) -> Result<Vec<MetricSample>, RegistryError> {
            Ok(Vec::new())
        }

        fn run_status(&self, _: &RunId) -> Result<RunStatus, RegistryError> {
            Ok(RunStatus::Unknown)
        }

        fn stop_run(&mut self, _: &RunId) -> Result<(), RegistryError> {
            Ok(())
        }
    }

    #[test]
    fn persistently_unknown_run_is_evicted_as_failed() {
        let pruner = nop_pruner();
        let config = test_config(1, pruner.clone());
        let adapter = OptimizerAdapter::new(&pruner, Direction::Minimize);
        let mut scheduler = Scheduler::new(
            config,
            adapter,
            UnknownRegistry { next_id: 0 },
            RecordingLauncher::new(),
        )
        .unwrap();

        scheduler.tick().unwrap(); // admit + dispatch
        let (run_id, trial) = only_run(&scheduler);

        for _ in 0..MAX_UNKNOWN_TICKS {
            scheduler.tick().unwrap();
        }

        assert!(!scheduler.runs.contains_key(&run_id));
        assert_eq!(
            scheduler.adapter().outcome(trial),
            Some(sl_optimizer::TrialOutcome::Failed)
        );
    }
}
