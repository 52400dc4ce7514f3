//! # sl-optimizer
//!
//! The optimizer side of Sweepline: wraps a pluggable black-box search
//! algorithm behind the ask / report / should-prune / tell contract consumed
//! by the scheduler loop.
//!
//! Provides the default random sampler, the closed set of pruning strategies
//! (none, patient, successive-halving, hyperband), and the bounded
//! objective-function harvest path for user-supplied configuration
//! generators.

mod adapter;
mod objective;
mod pruner;
mod sampler;

pub use adapter::{OptimizerAdapter, TrialOutcome};
pub use objective::{ObjectiveFn, ObjectiveSource, ShadowTrial};
pub use pruner::{
    build_pruner, HyperbandPruner, NopPruner, PatientPruner, PeerSeries, SuccessiveHalvingPruner,
    TrialPruner,
};
pub use sampler::{RandomSampler, Sampler};
