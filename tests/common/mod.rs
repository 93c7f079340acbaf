//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use launcher::adapters::ControlPlane;
use launcher::config::{LaunchSettings, SessionSettings};
use launcher::core::{EnvDenylist, Environment, Redactor, StepRunner};
use launcher::domain::{Build, BuildStatus, CommandDef, Job, Pipeline, ScmRepo, Secret};

/// A control-plane call, in the order it was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StepStart(String),
    StepStop(String, i32),
    Status(BuildStatus),
}

/// In-memory control plane recording every update
pub struct FakeControlPlane {
    pub build: Build,
    pub secrets: Vec<Secret>,
    pub fail_status_updates: bool,
    calls: Mutex<Vec<Call>>,
}

impl FakeControlPlane {
    pub fn new(steps: Vec<CommandDef>) -> Self {
        let mut environment = BTreeMap::new();
        environment.insert("GREETING".to_string(), "hello".to_string());

        Self {
            build: Build {
                id: 1,
                job_id: 2,
                sha: "0123abcd".to_string(),
                steps,
                environment,
            },
            secrets: Vec::new(),
            fail_status_updates: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_secret(mut self, name: &str, value: &str) -> Self {
        self.secrets.push(Secret::new(name, value));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Statuses reported, in order
    pub fn statuses(&self) -> Vec<BuildStatus> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Status(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    /// Names of steps that were started, in order
    pub fn started(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::StepStart(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// (step, code) pairs reported at step stop, in order
    pub fn stopped(&self) -> Vec<(String, i32)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::StepStop(name, code) => Some((name, code)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn build(&self, build_id: u64) -> Result<Build> {
        if build_id != self.build.id {
            bail!("404 Not Found: build {}", build_id);
        }
        Ok(self.build.clone())
    }

    async fn job(&self, job_id: u64) -> Result<Job> {
        Ok(Job {
            id: job_id,
            name: "main".to_string(),
            pipeline_id: 3,
        })
    }

    async fn pipeline(&self, pipeline_id: u64) -> Result<Pipeline> {
        Ok(Pipeline {
            id: pipeline_id,
            scm_uri: "github.com:123456:main".to_string(),
            scm_repo: ScmRepo {
                name: "screwdriver-cd/launcher".to_string(),
            },
        })
    }

    async fn secrets_for_build(&self, _build: &Build) -> Result<Vec<Secret>> {
        Ok(self.secrets.clone())
    }

    async fn update_step_start(&self, _build_id: u64, step: &str) -> Result<()> {
        self.record(Call::StepStart(step.to_string()));
        Ok(())
    }

    async fn update_step_stop(&self, _build_id: u64, step: &str, code: i32) -> Result<()> {
        self.record(Call::StepStop(step.to_string(), code));
        Ok(())
    }

    async fn update_build_status(&self, _build_id: u64, status: BuildStatus) -> Result<()> {
        self.record(Call::Status(status));
        if self.fail_status_updates && status.is_terminal() {
            bail!("503 Service Unavailable");
        }
        Ok(())
    }
}

/// Settings rooted in `dir` with a short step timeout
pub fn settings_in(dir: &Path) -> LaunchSettings {
    LaunchSettings {
        workspace_root: dir.join("workspace"),
        emitter_path: dir.join("emitter"),
        session: session_settings(),
        ..LaunchSettings::default()
    }
}

pub fn session_settings() -> SessionSettings {
    SessionSettings {
        step_timeout: std::time::Duration::from_secs(30),
        ..SessionSettings::default()
    }
}

/// A runner in `dir` with PATH inherited plus `secrets`
pub fn runner_in(dir: &Path, settings: SessionSettings, secrets: &[Secret]) -> StepRunner {
    let inherited = std::env::vars().filter(|(key, _)| key == "PATH");
    let env = Environment::merge(
        inherited,
        &BTreeMap::new(),
        &BTreeMap::new(),
        secrets,
        &EnvDenylist::default(),
    );

    StepRunner::new(
        settings,
        dir.to_path_buf(),
        env,
        Redactor::new(secrets),
        dir.join("step.sh"),
    )
}

/// True if `line` holds something shaped like a completion token
/// (32 lowercase hex characters in a row)
pub fn has_token(line: &str) -> bool {
    let mut run = 0;
    for c in line.chars() {
        if c.is_ascii_digit() || ('a'..='f').contains(&c) {
            run += 1;
            if run >= 32 {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}
