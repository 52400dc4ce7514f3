//! Pruning strategies.
//!
//! A pruner is consulted after every intermediate report and decides whether
//! the trial should be stopped early.  Strategies are selected once at
//! startup from [`PrunerConfig`]; they have no runtime API of their own
//! beyond [`TrialPruner::should_prune`].

use tracing::warn;

use sl_types::{Direction, PrunerConfig, TrialHandle};

/// Intermediate series of a peer trial, used for cross-trial comparison at
/// successive-halving rungs.
#[derive(Debug, Clone, Default)]
pub struct PeerSeries {
    pub values: Vec<(u64, f64)>,
}

/// Decide whether to stop a trial early based on its intermediate values.
pub trait TrialPruner: Send {
    /// `intermediate` holds every `(step, value)` reported so far for the
    /// trial, in report order; `peers` the series of all other trials.
    fn should_prune(
        &self,
        trial: TrialHandle,
        step: u64,
        intermediate: &[(u64, f64)],
        peers: &[PeerSeries],
    ) -> bool;

    fn name(&self) -> &str;
}

/// Latest reported value at or before `rung`, if the series reached it.
fn value_at_rung(values: &[(u64, f64)], rung: u64) -> Option<f64> {
    values
        .iter()
        .take_while(|(step, _)| *step <= rung)
        .last()
        .map(|(_, v)| *v)
}

// ---- No-op ----

/// Never prunes.  Selected with `type: "none"`.
#[derive(Debug, Clone, Default)]
pub struct NopPruner;

impl TrialPruner for NopPruner {
    fn should_prune(&self, _: TrialHandle, _: u64, _: &[(u64, f64)], _: &[PeerSeries]) -> bool {
        false
    }

    fn name(&self) -> &str {
        "none"
    }
}

// ---- Patient (system default) ----

/// Prunes once the trial's best value has gone `patience` consecutive
/// reports without improving.
#[derive(Debug, Clone)]
pub struct PatientPruner {
    patience: u64,
    direction: Direction,
}

impl PatientPruner {
    pub const DEFAULT_PATIENCE: u64 = 3;

    pub fn new(patience: u64, direction: Direction) -> Self {
        Self {
            patience: patience.max(1),
            direction,
        }
    }
}

impl TrialPruner for PatientPruner {
    fn should_prune(
        &self,
        _trial: TrialHandle,
        _step: u64,
        intermediate: &[(u64, f64)],
        _peers: &[PeerSeries],
    ) -> bool {
        let mut best: Option<f64> = None;
        let mut since_improvement: u64 = 0;

        for &(_, value) in intermediate {
            let improved = match (best, self.direction) {
                (None, _) => true,
                (Some(b), Direction::Maximize) => value > b,
                (Some(b), Direction::Minimize) => value < b,
            };
            if improved {
                best = Some(value);
                since_improvement = 0;
            } else {
                since_improvement += 1;
            }
        }

        since_improvement >= self.patience
    }

    fn name(&self) -> &str {
        "patient"
    }
}

// ---- Successive halving ----

/// Rung-based successive halving: at each exponentially-spaced rung, a trial
/// survives only if it sits in roughly the top `1/reduction_factor` fraction
/// of the trials that reached that rung.  The final rung (`max_resource`)
/// never prunes.
#[derive(Debug, Clone)]
pub struct SuccessiveHalvingPruner {
    min_resource: u64,
    reduction_factor: u64,
    max_resource: u64,
    direction: Direction,
}

impl SuccessiveHalvingPruner {
    pub fn new(
        min_resource: u64,
        reduction_factor: u64,
        max_resource: u64,
        direction: Direction,
    ) -> Self {
        Self {
            min_resource: min_resource.max(1),
            reduction_factor: reduction_factor.max(2),
            max_resource: max_resource.max(1),
            direction,
        }
    }

    /// Whether the trial would be cut at the given rung.
    fn pruned_at_rung(&self, rung: u64, intermediate: &[(u64, f64)], peers: &[PeerSeries]) -> bool {
        let Some(own) = value_at_rung(intermediate, rung) else {
            return false;
        };

        let mut peer_values: Vec<f64> = peers
            .iter()
            .filter_map(|p| value_at_rung(&p.values, rung))
            .collect();
        // Need at least a full cohort before cutting anyone.
        if peer_values.len() + 1 < self.reduction_factor as usize {
            return false;
        }

        peer_values.push(own);
        peer_values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let keep = (peer_values.len() / self.reduction_factor as usize).max(1);
        let survives = match self.direction {
            // Keep the largest values: own must be within the top `keep`.
            Direction::Maximize => {
                let cutoff = peer_values[peer_values.len() - keep];
                own >= cutoff
            }
            Direction::Minimize => {
                let cutoff = peer_values[keep - 1];
                own <= cutoff
            }
        };
        !survives
    }
}

impl TrialPruner for SuccessiveHalvingPruner {
    fn should_prune(
        &self,
        _trial: TrialHandle,
        step: u64,
        intermediate: &[(u64, f64)],
        peers: &[PeerSeries],
    ) -> bool {
        let mut rung = self.min_resource;
        while rung <= step && rung < self.max_resource {
            if self.pruned_at_rung(rung, intermediate, peers) {
                return true;
            }
            match rung.checked_mul(self.reduction_factor) {
                Some(next) => rung = next,
                None => break,
            }
        }
        false
    }

    fn name(&self) -> &str {
        "successive-halving"
    }
}

// ---- Hyperband ----

/// Hyperband-style pruning: trials are spread deterministically across
/// brackets, each bracket running successive halving with a different
/// starting rung.  Hedges against a badly chosen `min_resource`.
#[derive(Debug, Clone)]
pub struct HyperbandPruner {
    brackets: Vec<SuccessiveHalvingPruner>,
}

impl HyperbandPruner {
    pub fn new(
        min_resource: u64,
        reduction_factor: u64,
        max_resource: u64,
        direction: Direction,
    ) -> Self {
        let min_resource = min_resource.max(1);
        let reduction_factor = reduction_factor.max(2);
        let max_resource = max_resource.max(min_resource);

        // Bracket s starts halving at min_resource * rf^s.
        let mut brackets = Vec::new();
        let mut start = min_resource;
        while start <= max_resource {
            brackets.push(SuccessiveHalvingPruner::new(
                start,
                reduction_factor,
                max_resource,
                direction,
            ));
            match start.checked_mul(reduction_factor) {
                Some(next) => start = next,
                None => break,
            }
        }
        Self { brackets }
    }

    fn bracket_for(&self, trial: TrialHandle) -> &SuccessiveHalvingPruner {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        trial.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.brackets.len();
        &self.brackets[idx]
    }
}

impl TrialPruner for HyperbandPruner {
    fn should_prune(
        &self,
        trial: TrialHandle,
        step: u64,
        intermediate: &[(u64, f64)],
        peers: &[PeerSeries],
    ) -> bool {
        self.bracket_for(trial)
            .should_prune(trial, step, intermediate, peers)
    }

    fn name(&self) -> &str {
        "hyperband"
    }
}

// ---- Selection ----

/// Build the configured pruning strategy.
///
/// Unrecognized names warn and fall back to the patient default; they are
/// never an error.
pub fn build_pruner(config: &PrunerConfig, direction: Direction) -> Box<dyn TrialPruner> {
    let min_resource = config.min_resource.unwrap_or(1);
    let reduction_factor = config.reduction_factor.unwrap_or(3);
    let max_resource = config.max_resource.unwrap_or(100);
    let patience = config.patience.unwrap_or(PatientPruner::DEFAULT_PATIENCE);

    match config.kind.as_str() {
        "none" => Box::new(NopPruner),
        "successive-halving" => Box::new(SuccessiveHalvingPruner::new(
            min_resource,
            reduction_factor,
            max_resource,
            direction,
        )),
        "hyperband" | "hyperband-style" => Box::new(HyperbandPruner::new(
            min_resource,
            reduction_factor,
            max_resource,
            direction,
        )),
        "patient" => Box::new(PatientPruner::new(patience, direction)),
        "" => {
            warn!("no pruner selected, using the patient default");
            Box::new(PatientPruner::new(patience, direction))
        }
        other => {
            warn!(pruner = %other, "pruner not supported, falling back to the patient default");
            Box::new(PatientPruner::new(patience, direction))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<(u64, f64)> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u64, *v))
            .collect()
    }

    #[test]
    fn nop_never_prunes() {
        let pruner = NopPruner;
        let values = series(&[0.9, 0.1, 0.9, 0.1, 0.9]);
        for step in 0..5 {
            assert!(!pruner.should_prune(TrialHandle::new(), step, &values[..=step as usize], &[]));
        }
    }

    #[test]
    fn patient_fires_after_patience_stalls_maximize() {
        // Best value 0.9 never improves; with patience=2 the third report
        // (second stall) triggers pruning.
        let pruner = PatientPruner::new(2, Direction::Maximize);
        let trial = TrialHandle::new();
        let values = series(&[0.9, 0.7, 0.5]);

        assert!(!pruner.should_prune(trial, 0, &values[..1], &[]));
        assert!(!pruner.should_prune(trial, 1, &values[..2], &[]));
        assert!(pruner.should_prune(trial, 2, &values[..3], &[]));
    }

    #[test]
    fn patient_tolerates_improving_series() {
        let pruner = PatientPruner::new(2, Direction::Minimize);
        let trial = TrialHandle::new();
        let values = series(&[0.9, 0.7, 0.5, 0.3]);
        for step in 0..4u64 {
            assert!(!pruner.should_prune(trial, step, &values[..=step as usize], &[]));
        }
    }

    #[test]
    fn patient_counter_resets_on_improvement() {
        let pruner = PatientPruner::new(2, Direction::Maximize);
        let trial = TrialHandle::new();
        // Stall, stall would fire, but an improvement resets in between.
        let values = series(&[0.5, 0.4, 0.6, 0.5]);
        assert!(!pruner.should_prune(trial, 3, &values, &[]));
    }

    #[test]
    fn successive_halving_cuts_bottom_of_cohort() {
        let pruner = SuccessiveHalvingPruner::new(1, 3, 81, Direction::Minimize);
        let trial = TrialHandle::new();

        // Five peers that reached rung 1 with better (lower) losses.
        let peers: Vec<PeerSeries> = [0.1, 0.2, 0.3, 0.4, 0.5]
            .iter()
            .map(|v| PeerSeries {
                values: vec![(0, *v), (1, *v)],
            })
            .collect();

        let worst = series(&[0.9, 0.9]);
        assert!(pruner.should_prune(trial, 1, &worst, &peers));

        let best = series(&[0.05, 0.05]);
        assert!(!pruner.should_prune(trial, 1, &best, &peers));
    }

    #[test]
    fn successive_halving_waits_for_cohort() {
        let pruner = SuccessiveHalvingPruner::new(1, 3, 81, Direction::Minimize);
        // Only one peer: not enough trials at the rung to cut anyone.
        let peers = vec![PeerSeries {
            values: vec![(0, 0.1), (1, 0.1)],
        }];
        assert!(!pruner.should_prune(TrialHandle::new(), 1, &series(&[0.9, 0.9]), &peers));
    }

    #[test]
    fn successive_halving_never_prunes_before_first_rung() {
        let pruner = SuccessiveHalvingPruner::new(10, 3, 81, Direction::Minimize);
        let peers: Vec<PeerSeries> = (0..9)
            .map(|_| PeerSeries {
                values: vec![(0, 0.0)],
            })
            .collect();
        assert!(!pruner.should_prune(TrialHandle::new(), 5, &series(&[0.9]), &peers));
    }

    #[test]
    fn hyperband_is_deterministic_per_trial() {
        let pruner = HyperbandPruner::new(1, 3, 81, Direction::Minimize);
        let trial = TrialHandle::new();
        let a = pruner.bracket_for(trial).name().to_string();
        let b = pruner.bracket_for(trial).name().to_string();
        assert_eq!(a, b);
        assert!(!pruner.brackets.is_empty());
    }

    #[test]
    fn build_pruner_selects_by_name() {
        let direction = Direction::Minimize;
        let mut config = PrunerConfig {
            kind: "none".into(),
            ..Default::default()
        };
        assert_eq!(build_pruner(&config, direction).name(), "none");

        config.kind = "successive-halving".into();
        assert_eq!(build_pruner(&config, direction).name(), "successive-halving");

        config.kind = "hyperband-style".into();
        assert_eq!(build_pruner(&config, direction).name(), "hyperband");
    }

    #[test]
    fn build_pruner_falls_back_on_unknown_name() {
        let config = PrunerConfig {
            kind: "median-of-medians".into(),
            ..Default::default()
        };
        // Unrecognized strategy warns and falls back, never errors.
        assert_eq!(build_pruner(&config, Direction::Minimize).name(), "patient");
    }
}
