//! Run-registry gateway: the experiment-tracking collaborator contract.
//!
//! The registry owns ground-truth run status and is the sole source of
//! metric truth; the scheduler only keeps per-run cursors into the series it
//! exposes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use sl_types::{RegistryError, RunConfig, RunId};

/// One point of a run's metric series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub step: u64,
    pub value: f64,
}

/// Run status as reported by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Finished,
    Unknown,
}

/// External experiment-tracking backend.
///
/// Implementations are expected to be transient-failure-prone; every error
/// here marks the affected run unknown for one tick rather than aborting the
/// loop.
pub trait RunRegistry {
    /// Register a new run under the sweep and return its id.
    fn register_run(
        &mut self,
        project: &str,
        entity: &str,
        sweep_id: &str,
        config: &RunConfig,
    ) -> Result<RunId, RegistryError>;

    /// Incremental metric history: samples at offset >= `since`, in order.
    fn metric_history(
        &self,
        run_id: &RunId,
        metric: &str,
        since: u64,
    ) -> Result<Vec<MetricSample>, RegistryError>;

    fn run_status(&self, run_id: &RunId) -> Result<RunStatus, RegistryError>;

    /// Ask the backend to stop an executing run.
    fn stop_run(&mut self, run_id: &RunId) -> Result<(), RegistryError>;
}

#[derive(Debug, Clone)]
struct RegisteredRun {
    #[allow(dead_code)]
    config: RunConfig,
    status: RunStatus,
    history: HashMap<String, Vec<MetricSample>>,
}

/// Fully in-process registry for development and tests.
///
/// Test drivers advance runs with [`log_metric`](Self::log_metric) and
/// [`set_status`](Self::set_status) between scheduler ticks.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    runs: HashMap<RunId, RegisteredRun>,
    next_id: u64,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a metric sample to a run's series.
    pub fn log_metric(&mut self, run_id: &RunId, metric: &str, step: u64, value: f64) {
        if let Some(run) = self.runs.get_mut(run_id) {
            run.history
                .entry(metric.to_string())
                .or_default()
                .push(MetricSample { step, value });
        }
    }

    pub fn set_status(&mut self, run_id: &RunId, status: RunStatus) {
        if let Some(run) = self.runs.get_mut(run_id) {
            run.status = status;
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }
}

impl RunRegistry for InMemoryRegistry {
    fn register_run(
        &mut self,
        _project: &str,
        _entity: &str,
        sweep_id: &str,
        config: &RunConfig,
    ) -> Result<RunId, RegistryError> {
        self.next_id += 1;
        let id = RunId::new(format!("{sweep_id}-run-{:04}", self.next_id));
        self.runs.insert(
            id.clone(),
            RegisteredRun {
                config: config.clone(),
                status: RunStatus::Pending,
                history: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn metric_history(
        &self,
        run_id: &RunId,
        metric: &str,
        since: u64,
    ) -> Result<Vec<MetricSample>, RegistryError> {
        let run = self.runs.get(run_id).ok_or_else(|| RegistryError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        let series = run.history.get(metric).map(Vec::as_slice).unwrap_or(&[]);
        Ok(series.iter().skip(since as usize).copied().collect())
    }

    fn run_status(&self, run_id: &RunId) -> Result<RunStatus, RegistryError> {
        self.runs
            .get(run_id)
            .map(|r| r.status)
            .ok_or_else(|| RegistryError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    fn stop_run(&mut self, run_id: &RunId) -> Result<(), RegistryError> {
        let run = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| RegistryError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        run.status = RunStatus::Finished;
        Ok(())
    }
}
