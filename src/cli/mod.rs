//! Command-line interface for the launcher.
//!
//! One invocation runs one build. Settings come from flags (and their
//! environment variables), then the config file, then defaults.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use crate::adapters::{ControlPlane, ScrewdriverApi};
use crate::config::{ConfigFile, LaunchSettings, Overrides, DEFAULT_API_URI};
use crate::core::orchestrator::report_terminal;
use crate::core::Launcher;
use crate::domain::BuildStatus;

pub mod recovery;

/// launcher - run the steps of a single build
#[derive(Parser)]
#[command(name = "launcher")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// ID of the build to run
    pub build_id: u64,

    /// Base URI of the build API [default: http://localhost:8080]
    #[arg(long)]
    pub api_uri: Option<String>,

    /// Credential for the build API
    #[arg(long, env = "SD_TOKEN", hide_env_values = true, default_value = "")]
    pub token: String,

    /// Workspace root [default: /sd/workspace]
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Path the build output is written to [default: /var/run/sd/emitter]
    #[arg(long)]
    pub emitter: Option<PathBuf>,

    /// YAML config file
    #[arg(long, env = "SD_LAUNCHER_CONFIG")]
    pub config: Option<PathBuf>,
}

// Keeps the token out of debug output
impl std::fmt::Debug for Cli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cli")
            .field("build_id", &self.build_id)
            .field("api_uri", &self.api_uri)
            .field("workspace", &self.workspace)
            .field("emitter", &self.emitter)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Cli {
    /// Resolve settings from flags, config file and defaults
    pub fn settings(&self) -> Result<LaunchSettings> {
        let file = self.config.as_deref().map(ConfigFile::load).transpose()?;
        let overrides = Overrides {
            api_uri: self.api_uri.clone(),
            workspace: self.workspace.clone(),
            emitter: self.emitter.clone(),
        };
        Ok(LaunchSettings::resolve(file, overrides))
    }

    /// Run the build and map its terminal status to the process exit code
    pub async fn execute(self) -> Result<ExitCode> {
        let settings = self.settings();

        // A broken config file still gets its FAILURE reported, through the
        // flag (or default) API URI
        let api_uri = match &settings {
            Ok(settings) => settings.api_uri.clone(),
            Err(_) => self
                .api_uri
                .clone()
                .unwrap_or_else(|| DEFAULT_API_URI.to_string()),
        };

        let api: Arc<dyn ControlPlane> = match ScrewdriverApi::new(api_uri, &self.token) {
            Ok(api) => Arc::new(api),
            Err(e) => {
                error!(error = %format!("{:#}", e), "Creating API client");
                return Ok(ExitCode::FAILURE);
            }
        };

        recovery::install_panic_hook();

        let status = run(api, self.build_id, settings).await;
        Ok(ExitCode::from(exit_code(status)))
    }
}

/// Run `build_id` to a terminal status
///
/// Settings that failed to resolve fail the build without running it.
pub async fn run(
    api: Arc<dyn ControlPlane>,
    build_id: u64,
    settings: Result<LaunchSettings>,
) -> BuildStatus {
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Resolving launcher settings");
            report_terminal(api.as_ref(), build_id, BuildStatus::Failure).await;
            return BuildStatus::Failure;
        }
    };

    let launcher = Launcher::new(Arc::clone(&api), settings);
    match tokio::spawn(async move { launcher.run_build(build_id).await }).await {
        Ok(status) => status,
        Err(e) => {
            // The hook already wrote the stacktrace
            error!(error = %e, "Launcher task did not finish");
            report_terminal(api.as_ref(), build_id, BuildStatus::Failure).await;
            BuildStatus::Failure
        }
    }
}

/// 0 on success, 1 for any other terminal status
pub fn exit_code(status: BuildStatus) -> u8 {
    if status == BuildStatus::Success {
        0
    } else {
        1
    }
}
