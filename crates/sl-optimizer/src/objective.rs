//! Objective-function harvest path.
//!
//! A sweep may ship a user-supplied objective function instead of a plain
//! parameter spec.  That function is a configuration *generator*: the adapter
//! runs it exactly once per `ask` against a shadow trial, harvests the
//! parameters it suggested, and registers them with the live algorithm state.
//! It must be near-instantaneous; the harvest is bounded by a short timeout
//! and a slow objective is an explicit error, not a hang.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;

use sl_types::{OptimizerError, RunConfig};

/// Trial stand-in handed to a user objective during harvesting.
///
/// Records every suggestion so the harvested configuration can be replayed
/// into the live algorithm state with fixed values.
#[derive(Debug, Default)]
pub struct ShadowTrial {
    params: RunConfig,
}

impl ShadowTrial {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn suggest_float(&mut self, name: &str, min: f64, max: f64) -> f64 {
        let (min, max) = (min.min(max), min.max(max));
        let v = rand::rng().random_range(min..=max);
        self.params.insert(name.to_string(), Value::from(v));
        v
    }

    pub fn suggest_int(&mut self, name: &str, min: i64, max: i64) -> i64 {
        let (min, max) = (min.min(max), min.max(max));
        let v = rand::rng().random_range(min..=max);
        self.params.insert(name.to_string(), Value::from(v));
        v
    }

    pub fn suggest_categorical(&mut self, name: &str, choices: &[Value]) -> Value {
        let v = if choices.is_empty() {
            Value::Null
        } else {
            choices[rand::rng().random_range(0..choices.len())].clone()
        };
        self.params.insert(name.to_string(), v.clone());
        v
    }

    pub(crate) fn into_params(self) -> RunConfig {
        self.params
    }
}

/// User-supplied objective: suggests parameters through the shadow trial and
/// returns an (ignored) objective value.
pub type ObjectiveFn = Box<dyn FnMut(&mut ShadowTrial) -> f64 + Send + 'static>;

/// Wraps an objective function together with its harvest budget.
#[derive(Clone)]
pub struct ObjectiveSource {
    func: Arc<Mutex<ObjectiveFn>>,
    timeout: Duration,
}

impl ObjectiveSource {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(func: ObjectiveFn) -> Self {
        Self {
            func: Arc::new(Mutex::new(func)),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the objective once and harvest the configuration it suggested.
    ///
    /// The call runs on a helper thread so a misbehaving objective cannot
    /// stall the scheduler loop past the budget.  A previous timed-out
    /// harvest that is still executing makes the source unavailable until it
    /// finishes.
    pub(crate) fn harvest(&self) -> Result<RunConfig, OptimizerError> {
        if self.func.is_locked() {
            return Err(OptimizerError::ObjectiveUnavailable {
                message: "previous harvest still running".to_string(),
            });
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let func = Arc::clone(&self.func);
        std::thread::spawn(move || {
            // The lock is contended only by an abandoned harvest.
            let Some(mut objective) = func.try_lock() else {
                return;
            };
            let mut shadow = ShadowTrial::new();
            let _value = (objective)(&mut shadow);
            let _ = tx.send(shadow.into_params());
        });

        rx.recv_timeout(self.timeout)
            .map_err(|_| OptimizerError::ObjectiveTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })
    }
}

impl std::fmt::Debug for ObjectiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectiveSource")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
