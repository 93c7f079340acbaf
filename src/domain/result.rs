//! Per-step execution outcome.

use serde::{Deserialize, Serialize};

use crate::core::LauncherError;

/// Exit code reported when a step could not be launched
pub const EXIT_LAUNCH: i32 = 255;

/// Exit code reported when a step's status could not be recovered
pub const EXIT_UNKNOWN: i32 = 254;

/// Exit code of a successful step
pub const EXIT_OK: i32 = 0;

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitClass {
    Success,
    CommandFailed,
    LaunchFailed,
    Undetermined,
}

/// Result of running one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Code reported in the step-stop call
    pub exit_code: i32,

    pub class: ExitClass,

    /// Why the status is launch-failed or undetermined
    pub reason: Option<String>,
}

impl ExecutionResult {
    /// Classify a status recovered from the terminator line
    pub fn from_status(exit_code: i32) -> Self {
        let class = if exit_code == EXIT_OK {
            ExitClass::Success
        } else {
            ExitClass::CommandFailed
        };
        Self {
            exit_code,
            class,
            reason: None,
        }
    }

    pub fn launch_failed(reason: impl Into<String>) -> Self {
        Self {
            exit_code: EXIT_LAUNCH,
            class: ExitClass::LaunchFailed,
            reason: Some(reason.into()),
        }
    }

    pub fn undetermined(reason: impl Into<String>) -> Self {
        Self {
            exit_code: EXIT_UNKNOWN,
            class: ExitClass::Undetermined,
            reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.class == ExitClass::Success
    }

    /// Turn a non-success into the matching error for `step`
    pub fn into_result(self, step: &str) -> Result<(), LauncherError> {
        let reason = self.reason.unwrap_or_default();
        match self.class {
            ExitClass::Success => Ok(()),
            ExitClass::CommandFailed => Err(LauncherError::CommandFailed {
                step: step.to_string(),
                code: self.exit_code,
            }),
            ExitClass::LaunchFailed => Err(LauncherError::LaunchFailed {
                step: step.to_string(),
                reason,
            }),
            ExitClass::Undetermined => Err(LauncherError::UndeterminedExit {
                step: step.to_string(),
                reason,
            }),
        }
    }
}
