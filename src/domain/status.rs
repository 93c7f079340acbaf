//! Build status and the transitions the launcher allows between them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::LauncherError;

/// Status of a build, as reported to the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    /// Not yet started
    Pending,

    /// Steps are executing
    Running,

    /// All steps exited 0
    Success,

    /// Setup failed or a step failed
    Failure,
}

impl Default for BuildStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl BuildStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Pending -> Running -> {Success, Failure}. A setup failure may also go
    /// straight from Pending to Failure.
    pub fn can_transition_to(self, next: BuildStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failure)
                | (Self::Running, Self::Success)
                | (Self::Running, Self::Failure)
        )
    }

    /// Move to `next`, rejecting anything out of a terminal state
    pub fn advance(&mut self, next: BuildStatus) -> Result<(), LauncherError> {
        if !self.can_transition_to(next) {
            return Err(LauncherError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
