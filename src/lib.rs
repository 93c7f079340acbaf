//! sd-launcher - runs the steps of a single CI build
//!
//! The launcher is started inside a build container with a build id. It
//! fetches the build from the control plane, prepares a workspace, and runs
//! every step in one persistent shell so that working directory, exported
//! variables and sourced tool setup carry over between steps.
//!
//! # Modules
//!
//! - `adapters`: Control-plane API and source checkout
//! - `core`: Workspace, environment, shell session, orchestration
//! - `domain`: Data structures (Build, BuildStatus, ExecutionResult)
//! - `config`: Settings resolution
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! SD_TOKEN=... launcher --api-uri https://api.example.com 1234
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{ControlPlane, ScrewdriverApi, SourceCheckout};
pub use config::{LaunchSettings, SessionSettings};
pub use core::{Launcher, LauncherError};
pub use domain::{Build, BuildStatus, CommandDef, ExecutionResult};
