use thiserror::Error;

use crate::run::TrialHandle;

/// Main error type for the Sweepline system
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the search-algorithm adapter.
#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("Unsupported parameter spec for '{name}': expected values, value, or min/max bounds")]
    UnsupportedParameter { name: String },

    #[error("Search algorithm cannot produce a suggestion: {message}")]
    Exhausted { message: String },

    #[error("Unknown trial handle: {trial}")]
    UnknownTrial { trial: TrialHandle },

    #[error("Non-monotonic report for trial {trial}: step {step} after step {last_step}")]
    NonMonotonicStep {
        trial: TrialHandle,
        step: u64,
        last_step: u64,
    },

    #[error("Trial {trial} already received a terminal report")]
    AlreadyTold { trial: TrialHandle },

    #[error("Objective function exceeded its {timeout_ms}ms harvest budget; objective functions must be near-instantaneous configuration generators, not trainable models")]
    ObjectiveTimeout { timeout_ms: u64 },

    #[error("Objective function unavailable: {message}")]
    ObjectiveUnavailable { message: String },
}

/// Errors from the external run-registry collaborator.  Treated as transient:
/// the affected run is marked unknown and revisited on the next tick.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Run registration failed: {message}")]
    RegistrationFailed { message: String },

    #[error("Metric fetch failed for run {run_id}: {message}")]
    MetricFetchFailed { run_id: String, message: String },

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Status lookup failed for run {run_id}: {message}")]
    StatusFailed { run_id: String, message: String },

    #[error("Stop request failed for run {run_id}: {message}")]
    StopFailed { run_id: String, message: String },
}

/// Errors from the external launch collaborator.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Launcher rejected run {run_id}: {message}")]
    Rejected { run_id: String, message: String },

    #[error("Launch payload could not be built: {message}")]
    InvalidPayload { message: String },
}

/// Result type alias for Sweepline operations
pub type SweepResult<T> = Result<T, SweepError>;
