//! Metric polling: feed new samples to the optimizer and detect pruning
//! and natural completion.

use tracing::{debug, info, warn};

use sl_optimizer::TrialOutcome;
use sl_types::{RunId, RunState};

use crate::launcher::Launcher;
use crate::registry::{RunRegistry, RunStatus};
use crate::scheduler::{Scheduler, SchedulerEvent, MAX_UNKNOWN_TICKS};

impl<R: RunRegistry, L: Launcher> Scheduler<R, L> {
    /// Poll every tracked run for new metrics, report them to the optimizer
    /// in cursor order, and return the run ids to terminate this tick.
    ///
    /// Per-run failures are isolated: the run is marked unknown and
    /// revisited next tick, and the remaining runs are processed normally.
    pub(crate) fn poll_active_runs(&mut self) -> Vec<RunId> {
        let run_ids: Vec<RunId> = self.runs.keys().cloned().collect();
        if !run_ids.is_empty() {
            info!(runs = run_ids.len(), "polling runs for metrics");
        }

        let mut to_kill = Vec::new();

        'runs: for run_id in run_ids {
            let status = match self.registry.run_status(&run_id) {
                Ok(status) => status,
                Err(e) => {
                    warn!(run = %run_id, error = %e, "status lookup failed, marking run unknown");
                    if self.note_unknown(&run_id) {
                        to_kill.push(run_id);
                    }
                    continue;
                }
            };

            match status {
                // The registry has not started the run: zero history and not
                // finished.  Completing here would retire a trial that never
                // actually ran.
                RunStatus::Pending => continue,
                RunStatus::Unknown => {
                    if self.note_unknown(&run_id) {
                        to_kill.push(run_id);
                    }
                    continue;
                }
                RunStatus::Running | RunStatus::Finished => {}
            }

            let (trial, since) = {
                let Some(tracked) = self.runs.get_mut(&run_id) else {
                    continue;
                };
                tracked.unknown_ticks = 0;
                if tracked.run.state == RunState::Pending
                    || tracked.run.state == RunState::Unknown
                {
                    tracked.run.state = RunState::Running;
                }
                (tracked.run.trial, self.cursors.get(&run_id).copied().unwrap_or(0))
            };

            let metric = self.config.metric_name.clone();
            let history = match self.registry.metric_history(&run_id, &metric, since) {
                Ok(history) => history,
                Err(e) => {
                    warn!(run = %run_id, error = %e, "metric fetch failed, marking run unknown");
                    if self.note_unknown(&run_id) {
                        to_kill.push(run_id);
                    }
                    continue;
                }
            };

            let finished = status == RunStatus::Finished;
            let mut pruned = false;

            for sample in history {
                debug!(
                    run = %run_id,
                    step = sample.step,
                    value = sample.value,
                    "logging new metric"
                );
                if let Err(e) = self.adapter.report(trial, sample.value, sample.step) {
                    // Contract violation between registry and optimizer;
                    // give up on this run but keep the rest of the fleet.
                    warn!(run = %run_id, error = %e, "metric report rejected, failing run");
                    self.push_event(SchedulerEvent::RunIsolated {
                        run_id: run_id.clone(),
                        reason: e.to_string(),
                    });
                    self.finish_trial(&run_id, TrialOutcome::Failed);
                    to_kill.push(run_id);
                    continue 'runs;
                }
                *self.cursors.entry(run_id.clone()).or_insert(0) += 1;

                match self.adapter.should_prune(trial) {
                    Ok(true) => {
                        info!(run = %run_id, "pruning run");
                        self.finish_trial(&run_id, TrialOutcome::Pruned);
                        to_kill.push(run_id.clone());
                        pruned = true;
                        // Later samples are irrelevant once pruned.
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(run = %run_id, error = %e, "prune query failed");
                    }
                }
            }

            if !pruned && finished {
                info!(run = %run_id, "run finished");
                self.finish_trial(&run_id, TrialOutcome::Complete);
                to_kill.push(run_id);
            }
        }

        to_kill
    }

    /// Mark a run unknown for this tick; returns true when the scheduler
    /// has given up on it (evicted as failed).
    fn note_unknown(&mut self, run_id: &RunId) -> bool {
        let Some(tracked) = self.runs.get_mut(run_id) else {
            return false;
        };
        tracked.run.state = RunState::Unknown;
        tracked.unknown_ticks += 1;

        if tracked.unknown_ticks >= MAX_UNKNOWN_TICKS {
            warn!(
                run = %run_id,
                ticks = tracked.unknown_ticks,
                "run unknown for too long, evicting"
            );
            self.finish_trial(run_id, TrialOutcome::Failed);
            true
        } else {
            false
        }
    }
}
