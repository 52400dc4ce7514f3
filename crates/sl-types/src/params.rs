//! Sweep parameter specifications.
//!
//! Mirrors the sweep-config surface: each parameter is described by either a
//! set of categorical `values`, a single constant `value`, or `min`/`max`
//! bounds (integer or float).  Anything else is carried as an opaque blob and
//! reported as unsupported at suggestion time rather than silently dropped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single parameter dimension in the sweep definition.
///
/// The variants are tried in declaration order during deserialization, so the
/// integer range must come before the float range (a float body fails integer
/// parsing and falls through).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterSpec {
    /// Categorical choices: `{"values": [...]}`.
    Categorical { values: Vec<serde_json::Value> },
    /// Fixed value: `{"value": ...}`.
    Constant { value: serde_json::Value },
    /// Integer range `[min, max]` inclusive.
    IntRange { min: i64, max: i64 },
    /// Continuous range `[min, max]`.
    FloatRange { min: f64, max: f64 },
    /// Anything we do not understand.  Kept so the adapter can report the
    /// offending parameter by name instead of dropping it.
    Opaque(serde_json::Value),
}

impl ParameterSpec {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Opaque(_))
    }
}

/// Whether a parameter should be sampled in log space.
///
/// The original sweep scheduler keys this off the parameter name containing
/// "log"; kept for config compatibility.
pub fn log_scaled(name: &str) -> bool {
    name.contains("log")
}

/// The full sweep search space: parameter name → spec, in name order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SweepParameters {
    pub parameters: BTreeMap<String, ParameterSpec>,
}

impl SweepParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_categorical(
        mut self,
        name: impl Into<String>,
        values: Vec<serde_json::Value>,
    ) -> Self {
        self.parameters
            .insert(name.into(), ParameterSpec::Categorical { values });
        self
    }

    pub fn add_constant(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters
            .insert(name.into(), ParameterSpec::Constant { value });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, min: i64, max: i64) -> Self {
        self.parameters
            .insert(name.into(), ParameterSpec::IntRange { min, max });
        self
    }

    pub fn add_float(mut self, name: impl Into<String>, min: f64, max: f64) -> Self {
        self.parameters
            .insert(name.into(), ParameterSpec::FloatRange { min, max });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }
}
