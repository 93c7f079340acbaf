//! Core launcher logic.
//!
//! This module contains:
//! - Workspace: per-build directory layout
//! - Environment: merged step environment and secret masking
//! - Session: the persistent shell and the step runner driving it
//! - Orchestrator: the build state machine

pub mod artifact;
pub mod emitter;
pub mod environment;
pub mod error;
pub mod orchestrator;
pub mod script;
pub mod sentinel;
pub mod session;
pub mod workspace;

// Re-export commonly used types
pub use artifact::{write_artifact, ENVIRONMENT_ARTIFACT, STEPS_ARTIFACT};
pub use emitter::{BufferEmitter, Emitted, Emitter, FileEmitter};
pub use environment::{build_environment, EnvDenylist, Environment, Redactor, REDACTED};
pub use error::LauncherError;
pub use orchestrator::{default_environment, run_steps, Launcher, SETUP_STEP};
pub use script::materialize;
pub use sentinel::{scan_line, CompletionToken, Scan};
pub use session::{Session, StepRunner};
pub use workspace::{absolute, create_workspace, Workspace};
