//! Scheduler and pruner configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::params::SweepParameters;

/// Whether we are maximizing or minimizing the sweep metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Minimize
    }
}

/// Pruning strategy selection, read from the sweep config.
///
/// Strategies: "none", "successive-halving", "hyperband" (accepted as
/// "hyperband-style" too), "patient".  An unrecognized or missing name falls
/// back to the patient default with a warning, never an error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrunerConfig {
    /// Strategy name; empty means "use the system default".
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Step of the first pruning rung (successive-halving / hyperband).
    pub min_resource: Option<u64>,

    /// At each rung, keep roughly the top 1/eta fraction of trials.
    pub reduction_factor: Option<u64>,

    /// Full training budget in steps; the final rung never prunes.
    pub max_resource: Option<u64>,

    /// Reports without improvement tolerated by the patient strategy.
    pub patience: Option<u64>,
}

fn default_num_workers() -> usize {
    2
}

fn default_queue_timeout_secs() -> f64 {
    1.0
}

fn default_queue_sleep_secs() -> f64 {
    5.0
}

/// Top-level configuration for a sweep scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub entity: String,
    pub project: String,
    pub sweep_id: String,

    /// Name of the single metric polled from the registry.
    pub metric_name: String,

    #[serde(default)]
    pub direction: Direction,

    /// Fixed worker-slot count; read-only after construction.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    #[serde(default)]
    pub pruner: PrunerConfig,

    /// Bound on the dispatch-queue pop, in seconds.
    #[serde(default = "default_queue_timeout_secs")]
    pub queue_timeout_secs: f64,

    /// Backoff sleep when the dispatch queue is empty, in seconds.
    #[serde(default = "default_queue_sleep_secs")]
    pub queue_sleep_secs: f64,

    /// The parameter search space.
    pub parameters: SweepParameters,
}

impl SchedulerConfig {
    pub fn new(
        entity: impl Into<String>,
        project: impl Into<String>,
        sweep_id: impl Into<String>,
        metric_name: impl Into<String>,
        parameters: SweepParameters,
    ) -> Self {
        Self {
            entity: entity.into(),
            project: project.into(),
            sweep_id: sweep_id.into(),
            metric_name: metric_name.into(),
            direction: Direction::default(),
            num_workers: default_num_workers(),
            pruner: PrunerConfig::default(),
            queue_timeout_secs: default_queue_timeout_secs(),
            queue_sleep_secs: default_queue_sleep_secs(),
            parameters,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn with_pruner(mut self, pruner: PrunerConfig) -> Self {
        self.pruner = pruner;
        self
    }

    pub fn with_queue_timing(mut self, timeout_secs: f64, sleep_secs: f64) -> Self {
        self.queue_timeout_secs = timeout_secs;
        self.queue_sleep_secs = sleep_secs;
        self
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.queue_timeout_secs.max(0.0))
    }

    pub fn queue_sleep(&self) -> Duration {
        Duration::from_secs_f64(self.queue_sleep_secs.max(0.0))
    }
}
