//! Launcher configuration.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags and their environment variables (SD_TOKEN, ...)
//! 2. Config file (`--config` / SD_LAUNCHER_CONFIG), YAML
//! 3. Defaults
//!
//! Resolved settings are handed to the launcher as constructor arguments;
//! nothing here is cached globally.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_API_URI: &str = "http://localhost:8080";
pub const DEFAULT_WORKSPACE: &str = "/sd/workspace";
pub const DEFAULT_EMITTER: &str = "/var/run/sd/emitter";
pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const DEFAULT_SETUP_SCRIPT: &str = "scripts/setup.sh";
pub const DEFAULT_STEP_TIMEOUT_SECONDS: u64 = 3600;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub api_uri: Option<String>,
    pub workspace: Option<PathBuf>,
    pub emitter: Option<PathBuf>,
    #[serde(default)]
    pub session: SessionConfig,
    /// Extra environment keys (globs) never passed to steps
    #[serde(default)]
    pub env_denylist: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub shell: Option<PathBuf>,
    pub setup_script: Option<PathBuf>,
    pub step_timeout_seconds: Option<u64>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty file is a valid, empty config
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        if config.session.step_timeout_seconds == Some(0) {
            anyhow::bail!("session.step_timeout_seconds must be greater than 0");
        }
        Ok(config)
    }
}

/// Shell session settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Shell binary started once per build
    pub shell: PathBuf,

    /// Sourced before the first step if it exists (relative to the session dir)
    pub setup_script: PathBuf,

    /// Upper bound on a single step's read loop
    pub step_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            setup_script: PathBuf::from(DEFAULT_SETUP_SCRIPT),
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECONDS),
        }
    }
}

/// Everything a launcher needs besides its collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    pub api_uri: String,
    pub workspace_root: PathBuf,
    pub emitter_path: PathBuf,
    pub session: SessionSettings,
    pub env_denylist: Vec<String>,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            api_uri: DEFAULT_API_URI.to_string(),
            workspace_root: PathBuf::from(DEFAULT_WORKSPACE),
            emitter_path: PathBuf::from(DEFAULT_EMITTER),
            session: SessionSettings::default(),
            env_denylist: Vec::new(),
        }
    }
}

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_uri: Option<String>,
    pub workspace: Option<PathBuf>,
    pub emitter: Option<PathBuf>,
}

impl LaunchSettings {
    /// Layer overrides over the config file over defaults
    pub fn resolve(file: Option<ConfigFile>, overrides: Overrides) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let session = SessionSettings {
            shell: file.session.shell.unwrap_or(defaults.session.shell),
            setup_script: file
                .session
                .setup_script
                .unwrap_or(defaults.session.setup_script),
            step_timeout: file
                .session
                .step_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.session.step_timeout),
        };

        Self {
            api_uri: overrides
                .api_uri
                .or(file.api_uri)
                .unwrap_or(defaults.api_uri),
            workspace_root: overrides
                .workspace
                .or(file.workspace)
                .unwrap_or(defaults.workspace_root),
            emitter_path: overrides
                .emitter
                .or(file.emitter)
                .unwrap_or(defaults.emitter_path),
            session,
            env_denylist: file.env_denylist,
        }
    }
}
