//! Launcher error taxonomy.
//!
//! Messages carry step names, paths and exit codes only. Secret values never
//! end up in an error.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::BuildStatus;

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("Cannot create workspace path {path:?}, path already exists")]
    WorkspaceConflict { path: PathBuf },

    #[error("Cannot create workspace path {path:?}: {reason}")]
    WorkspaceCreateFailed { path: PathBuf, reason: String },

    #[error("Writing script for step '{step}': {reason}")]
    ScriptWriteFailed { step: String, reason: String },

    #[error("Launching shell for step '{step}': {reason}")]
    LaunchFailed { step: String, reason: String },

    #[error("Step '{step}' exited with code {code}")]
    CommandFailed { step: String, code: i32 },

    #[error("Step '{step}' ended without an exit status: {reason}")]
    UndeterminedExit { step: String, reason: String },

    #[error("Updating {action}: {reason}")]
    StatusReportFailed { action: String, reason: String },

    #[error("Fetching {what}: {reason}")]
    Fetch { what: String, reason: String },

    #[error("Unable to parse scmUri {scm_uri:?} and scmName {scm_name:?}")]
    Scm { scm_uri: String, scm_name: String },

    #[error("Creating {name} artifact: {reason}")]
    Artifact { name: String, reason: String },

    #[error("Emitter: {0}")]
    Emitter(String),

    #[error("Invalid build status transition {from} -> {to}")]
    InvalidTransition { from: BuildStatus, to: BuildStatus },
}

impl LauncherError {
    /// A step ran and returned nonzero: an expected outcome, not a defect
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }

    /// The step's status could not be recovered
    pub fn is_undetermined(&self) -> bool {
        matches!(self, Self::UndeterminedExit { .. })
    }

    pub(crate) fn report(action: impl Into<String>, err: anyhow::Error) -> Self {
        Self::StatusReportFailed {
            action: action.into(),
            reason: format!("{:#}", err),
        }
    }

    pub(crate) fn fetch(what: impl Into<String>, err: anyhow::Error) -> Self {
        Self::Fetch {
            what: what.into(),
            reason: format!("{:#}", err),
        }
    }
}
