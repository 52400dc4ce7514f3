//! The optimizer adapter: ask / report / should-prune / tell.
//!
//! Owns all trial internal state.  The scheduler only ever holds opaque
//! [`TrialHandle`]s and is responsible for issuing exactly one terminal
//! `tell` per handle; the adapter fails loudly in debug builds if that
//! invariant is broken.

use std::collections::HashMap;

use tracing::debug;

use sl_types::{
    Direction, OptimizerError, PrunerConfig, RunConfig, SweepParameters, TrialHandle,
};

use crate::objective::ObjectiveSource;
use crate::pruner::{build_pruner, PeerSeries, TrialPruner};
use crate::sampler::{RandomSampler, Sampler};

/// Terminal outcome of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Complete,
    Pruned,
    Failed,
}

/// Where new suggestions come from: the default sampler, or a user-supplied
/// objective function run against shadow state.
enum SuggestionSource {
    Sampler(Box<dyn Sampler>),
    Objective(ObjectiveSource),
}

#[derive(Debug, Default)]
struct TrialRecord {
    values: Vec<(u64, f64)>,
    last_step: Option<u64>,
    outcome: Option<TrialOutcome>,
}

/// Wraps the pluggable search algorithm behind the contract the scheduler
/// loop consumes.
pub struct OptimizerAdapter {
    source: SuggestionSource,
    pruner: Box<dyn TrialPruner>,
    trials: HashMap<TrialHandle, TrialRecord>,
}

impl OptimizerAdapter {
    /// Default construction: random sampler plus the configured pruner.
    pub fn new(pruner_config: &PrunerConfig, direction: Direction) -> Self {
        Self {
            source: SuggestionSource::Sampler(Box::new(RandomSampler::new())),
            pruner: build_pruner(pruner_config, direction),
            trials: HashMap::new(),
        }
    }

    /// Construction with a custom sampler.
    pub fn with_sampler(
        sampler: Box<dyn Sampler>,
        pruner_config: &PrunerConfig,
        direction: Direction,
    ) -> Self {
        Self {
            source: SuggestionSource::Sampler(sampler),
            pruner: build_pruner(pruner_config, direction),
            trials: HashMap::new(),
        }
    }

    /// Alternate construction: configurations are harvested from a
    /// user-supplied objective function instead of sampled from the spec.
    pub fn with_objective(
        objective: ObjectiveSource,
        pruner_config: &PrunerConfig,
        direction: Direction,
    ) -> Self {
        Self {
            source: SuggestionSource::Objective(objective),
            pruner: build_pruner(pruner_config, direction),
            trials: HashMap::new(),
        }
    }

    /// Request a new parameter configuration and a fresh trial handle.
    ///
    /// No trial is created unless every parameter in the spec produces a
    /// value; an unsupported parameter surfaces as an error rather than a
    /// config with a hole in it.
    pub fn ask(
        &mut self,
        space: &SweepParameters,
    ) -> Result<(RunConfig, TrialHandle), OptimizerError> {
        let config = match &mut self.source {
            SuggestionSource::Sampler(sampler) => {
                let mut config = RunConfig::new();
                for (name, spec) in &space.parameters {
                    let value = sampler.sample(name, spec)?;
                    config.insert(name.clone(), value);
                }
                config
            }
            // Harvest from the objective, then register the fixed values
            // with live state below so bookkeeping stays consistent.
            SuggestionSource::Objective(objective) => objective.harvest()?,
        };

        let handle = TrialHandle::new();
        self.trials.insert(handle, TrialRecord::default());
        debug!(trial = %handle, params = config.len(), "trial created");
        Ok((config, handle))
    }

    /// Record an intermediate observation.  Steps must be non-decreasing per
    /// trial; the caller (the metric poller) feeds samples in cursor order.
    pub fn report(
        &mut self,
        trial: TrialHandle,
        value: f64,
        step: u64,
    ) -> Result<(), OptimizerError> {
        let record = self
            .trials
            .get_mut(&trial)
            .ok_or(OptimizerError::UnknownTrial { trial })?;

        if let Some(last_step) = record.last_step {
            if step < last_step {
                return Err(OptimizerError::NonMonotonicStep {
                    trial,
                    step,
                    last_step,
                });
            }
        }

        record.values.push((step, value));
        record.last_step = Some(step);
        Ok(())
    }

    /// Pure pruning query; callable after every `report` with no side effect
    /// on algorithm state.
    pub fn should_prune(&self, trial: TrialHandle) -> Result<bool, OptimizerError> {
        let record = self
            .trials
            .get(&trial)
            .ok_or(OptimizerError::UnknownTrial { trial })?;

        let Some((step, _)) = record.values.last() else {
            return Ok(false);
        };

        let peers: Vec<PeerSeries> = self
            .trials
            .iter()
            .filter(|(handle, _)| **handle != trial)
            .map(|(_, r)| PeerSeries {
                values: r.values.clone(),
            })
            .collect();

        Ok(self.pruner.should_prune(trial, *step, &record.values, &peers))
    }

    /// Record the terminal outcome for a trial.  Exactly one `tell` per
    /// handle: a second call is a programming error upstream.
    pub fn tell(&mut self, trial: TrialHandle, outcome: TrialOutcome) -> Result<(), OptimizerError> {
        let record = self
            .trials
            .get_mut(&trial)
            .ok_or(OptimizerError::UnknownTrial { trial })?;

        debug_assert!(
            record.outcome.is_none(),
            "double terminal report for trial {trial}"
        );
        if record.outcome.is_some() {
            return Err(OptimizerError::AlreadyTold { trial });
        }

        record.outcome = Some(outcome);
        debug!(trial = %trial, ?outcome, "trial told");
        Ok(())
    }

    // -- introspection ------------------------------------------------------

    /// Intermediate `(step, value)` pairs reported so far for a trial.
    pub fn intermediate_values(&self, trial: TrialHandle) -> Option<&[(u64, f64)]> {
        self.trials.get(&trial).map(|r| r.values.as_slice())
    }

    /// Terminal outcome, if the trial has been told.
    pub fn outcome(&self, trial: TrialHandle) -> Option<TrialOutcome> {
        self.trials.get(&trial).and_then(|r| r.outcome)
    }

    /// Total trials ever created by this adapter.
    pub fn trial_count(&self) -> usize {
        self.trials.len()
    }

    /// Trials still awaiting a terminal report.
    pub fn live_trial_count(&self) -> usize {
        self.trials.values().filter(|r| r.outcome.is_none()).count()
    }
}

impl std::fmt::Debug for OptimizerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerAdapter")
            .field("pruner", &self.pruner.name())
            .field("trials", &self.trials.len())
            .finish_non_exhaustive()
    }
}
