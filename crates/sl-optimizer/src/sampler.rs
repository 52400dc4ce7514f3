//! Parameter samplers: the "suggest" half of the search-algorithm contract.

use rand::Rng;
use serde_json::Value;

use sl_types::{log_scaled, OptimizerError, ParameterSpec};

/// Pluggable value source for a single parameter dimension.
///
/// The scheduler core depends only on this contract, never on a concrete
/// search algorithm.  An unsupported spec must surface as an error so the
/// caller can skip the trial instead of launching it with a hole in its
/// config.
pub trait Sampler: Send {
    fn sample(&mut self, name: &str, spec: &ParameterSpec) -> Result<Value, OptimizerError>;

    /// Human-readable sampler name.
    fn name(&self) -> &str;
}

/// Independent uniform sampling, the system default.
///
/// Ranges whose parameter name contains "log" are sampled log-uniformly,
/// matching the sweep-config convention.
#[derive(Debug, Clone, Default)]
pub struct RandomSampler;

impl RandomSampler {
    pub fn new() -> Self {
        Self
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, name: &str, spec: &ParameterSpec) -> Result<Value, OptimizerError> {
        let mut rng = rand::rng();

        let value = match spec {
            ParameterSpec::Categorical { values } => {
                if values.is_empty() {
                    return Err(OptimizerError::Exhausted {
                        message: format!("categorical parameter '{name}' has no values"),
                    });
                }
                let idx = rng.random_range(0..values.len());
                values[idx].clone()
            }
            ParameterSpec::Constant { value } => value.clone(),
            ParameterSpec::IntRange { min, max } => {
                let (min, max) = (*min.min(max), *min.max(max));
                if log_scaled(name) && min > 0 {
                    let log_val: f64 =
                        rng.random_range((min as f64).ln()..=(max as f64).ln());
                    Value::from((log_val.exp().round() as i64).clamp(min, max))
                } else {
                    Value::from(rng.random_range(min..=max))
                }
            }
            ParameterSpec::FloatRange { min, max } => {
                let (min, max) = (min.min(*max), min.max(*max));
                let sampled = if log_scaled(name) && min > 0.0 {
                    rng.random_range(min.ln()..=max.ln()).exp().clamp(min, max)
                } else {
                    rng.random_range(min..=max)
                };
                Value::from(sampled)
            }
            ParameterSpec::Opaque(_) => {
                return Err(OptimizerError::UnsupportedParameter {
                    name: name.to_string(),
                })
            }
        };

        Ok(value)
    }

    fn name(&self) -> &str {
        "random"
    }
}
