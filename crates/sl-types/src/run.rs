//! Run and trial identity, lifecycle state, and tracked-run bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identifier assigned by the external run registry when a run is registered.
///
/// The registry owns the id format; the scheduler treats it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to a trial owned by the optimizer adapter.
///
/// Created by `ask()`, retired by exactly one `tell()` over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialHandle(Uuid);

impl TrialHandle {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TrialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Concrete parameter values chosen for one run, name → value.
pub type RunConfig = BTreeMap<String, serde_json::Value>;

/// Lifecycle state of a training run as tracked by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Registered but not yet observed running by the registry.
    Pending,
    /// The registry has reported the run as started.
    Running,
    /// Ran to natural completion.
    Completed,
    /// Stopped early by the pruning policy.
    Pruned,
    /// Failed to launch or was evicted after repeated registry failures.
    Failed,
    /// The last registry lookup failed; revisited next tick.
    Unknown,
}

impl RunState {
    /// Terminal states: the run will never produce further metrics.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Pruned | Self::Failed)
    }

    /// States in which a popped dispatch-queue entry must be dropped rather
    /// than submitted (stopped upstream between admission and dispatch).
    pub fn is_dead(&self) -> bool {
        self.is_terminal() || matches!(self, Self::Unknown)
    }
}

/// One executing training job paired with a trial.
///
/// Owned by the scheduler; the paired trial is referenced by handle only —
/// trial internal state belongs to the optimizer adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRun {
    pub id: RunId,
    pub trial: TrialHandle,
    /// Worker slot this run occupies, 0-based.
    pub worker_id: usize,
    pub config: RunConfig,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
}

impl SweepRun {
    pub fn new(id: RunId, trial: TrialHandle, worker_id: usize, config: RunConfig) -> Self {
        Self {
            id,
            trial,
            worker_id,
            config,
            state: RunState::Pending,
            created_at: Utc::now(),
        }
    }
}
