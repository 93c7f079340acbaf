//! Domain types for the launcher.
//!
//! - Build records: Build, Job, Pipeline, Secret
//! - BuildStatus: the reported build state machine
//! - ExecutionResult: how a single step ended

pub mod build;
pub mod result;
pub mod status;

// Re-export commonly used types
pub use build::{Build, CommandDef, Job, Pipeline, ScmPath, ScmRepo, Secret};
pub use result::{ExecutionResult, ExitClass, EXIT_LAUNCH, EXIT_OK, EXIT_UNKNOWN};
pub use status::BuildStatus;
