//! Build records fetched from the control plane.
//!
//! These mirror the JSON the API returns; everything here is immutable once
//! fetched and owned by the launcher for the duration of one run.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::LauncherError;

/// A single build: the ordered steps to run plus declared environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    /// Build identifier
    pub id: u64,

    /// Job this build belongs to
    pub job_id: u64,

    /// Commit the build was triggered for
    #[serde(default)]
    pub sha: String,

    /// Steps in declaration order
    #[serde(alias = "commands", default)]
    pub steps: Vec<CommandDef>,

    /// Build-declared environment (never contains secrets)
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// One named unit of shell work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDef {
    /// Step name, unique within a build
    pub name: String,

    /// Shell text, possibly multi-line
    #[serde(alias = "cmd")]
    pub command: String,
}

impl CommandDef {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

/// Job record (only the fields the launcher needs)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: u64,
    pub name: String,
    pub pipeline_id: u64,
}

impl Job {
    /// Pull-request number if this job is a `PR-<n>` job
    pub fn pr_number(&self) -> Option<&str> {
        let number = self.name.strip_prefix("PR-")?;
        if !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()) {
            Some(number)
        } else {
            None
        }
    }
}

/// Pipeline record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: u64,

    /// e.g. `github.com:123456:master`
    pub scm_uri: String,

    pub scm_repo: ScmRepo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScmRepo {
    /// e.g. `screwdriver-cd/launcher`
    pub name: String,
}

/// Source location derived from a pipeline's SCM fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScmPath {
    pub host: String,
    pub org: String,
    pub repo: String,
    pub branch: String,
}

impl ScmPath {
    /// Parse `host:repoId:branch` plus `org/repo`
    pub fn parse(scm_uri: &str, scm_name: &str) -> Result<Self, LauncherError> {
        let uri: Vec<&str> = scm_uri.split(':').collect();
        let org_repo: Vec<&str> = scm_name.split('/').collect();

        match (uri.as_slice(), org_repo.as_slice()) {
            ([host, _, branch], [org, repo]) => Ok(Self {
                host: (*host).to_string(),
                org: (*org).to_string(),
                repo: (*repo).to_string(),
                branch: (*branch).to_string(),
            }),
            _ => Err(LauncherError::Scm {
                scm_uri: scm_uri.to_string(),
                scm_name: scm_name.to_string(),
            }),
        }
    }

    pub fn https_string(&self) -> String {
        format!(
            "https://{}/{}/{}#{}",
            self.host, self.org, self.repo, self.branch
        )
    }
}

/// A secret name/value pair, fetched once per build
#[derive(Clone, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    pub value: String,
}

impl Secret {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// Values never appear in `{:?}` output
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("value", &"***")
            .finish()
    }
}
