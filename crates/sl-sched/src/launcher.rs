//! Launch collaborator: hands registered runs to the external job executor.

use serde::{Deserialize, Serialize};
use serde_json::json;

use sl_types::{LaunchError, SweepRun};

/// Opaque payload submitted to the external launcher.
///
/// The run's parameter values are nested under `overrides.run_config`, the
/// override format the launch backend expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchPayload {
    pub run_id: String,
    pub overrides: serde_json::Value,
}

/// Translate a run's configuration into the launcher override format.
pub fn build_launch_payload(run: &SweepRun) -> LaunchPayload {
    LaunchPayload {
        run_id: run.id.to_string(),
        overrides: json!({ "run_config": run.config }),
    }
}

/// External job launcher.  The core consumes nothing from a submission
/// beyond success or failure; failed runs are not retried here.
pub trait Launcher {
    fn submit(&mut self, payload: LaunchPayload) -> Result<(), LaunchError>;
}

/// Test/sandbox launcher that records every submission.
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    pub submitted: Vec<LaunchPayload>,
    /// When set, every submission fails with this message.
    pub fail_with: Option<String>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Launcher for RecordingLauncher {
    fn submit(&mut self, payload: LaunchPayload) -> Result<(), LaunchError> {
        if let Some(message) = &self.fail_with {
            return Err(LaunchError::Rejected {
                run_id: payload.run_id,
                message: message.clone(),
            });
        }
        self.submitted.push(payload);
        Ok(())
    }
}
