//! Build orchestration.
//!
//! Drives one build from setup to a terminal status:
//! setup (workspace, artifacts, environment) -> steps in order (fail fast)
//! -> SUCCESS or FAILURE reported to the control plane.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::adapters::{ControlPlane, SourceCheckout, StepCheckout};
use crate::config::LaunchSettings;
use crate::domain::{
    Build, BuildStatus, CommandDef, Job, ScmPath, EXIT_LAUNCH, EXIT_OK, EXIT_UNKNOWN,
};

use super::artifact::{write_artifact, ENVIRONMENT_ARTIFACT, STEPS_ARTIFACT};
use super::emitter::{Emitter, FileEmitter};
use super::environment::{EnvDenylist, Environment, Redactor};
use super::error::LauncherError;
use super::session::StepRunner;
use super::workspace::{absolute, create_workspace, Workspace};

/// Pseudo-step covering everything before the first real step
pub const SETUP_STEP: &str = "sd-setup";

/// Step scripts are written here, relative to the workspace root
pub const STEP_SCRIPT: &str = "step.sh";

/// Runs builds against a control plane
pub struct Launcher {
    api: Arc<dyn ControlPlane>,
    checkout: Arc<dyn SourceCheckout>,
    settings: LaunchSettings,
}

impl Launcher {
    /// Create a launcher with the default checkout
    pub fn new(api: Arc<dyn ControlPlane>, settings: LaunchSettings) -> Self {
        Self {
            api,
            checkout: Arc::new(StepCheckout),
            settings,
        }
    }

    pub fn with_checkout(mut self, checkout: Arc<dyn SourceCheckout>) -> Self {
        self.checkout = checkout;
        self
    }

    pub fn settings(&self) -> &LaunchSettings {
        &self.settings
    }

    /// Run a build to a terminal status and report it
    ///
    /// Never fails: every error is classified into `FAILURE`.
    #[instrument(skip(self))]
    pub async fn run_build(&self, build_id: u64) -> BuildStatus {
        info!("Starting build");
        let mut status = BuildStatus::Pending;

        let terminal = match self.launch(build_id, &mut status).await {
            Ok(()) => BuildStatus::Success,
            Err(e) if e.is_command_failure() => {
                info!(error = %e, "Failure due to non-zero exit code");
                BuildStatus::Failure
            }
            Err(e) if e.is_undetermined() => {
                error!(error = %e, "Step ended without an exit status");
                BuildStatus::Failure
            }
            Err(e) => {
                error!(error = %e, "Error running launcher");
                BuildStatus::Failure
            }
        };

        if let Err(e) = status.advance(terminal) {
            warn!(error = %e, "Unexpected build status transition");
        }
        report_terminal(self.api.as_ref(), build_id, status).await;
        status
    }

    /// Open the emitter, run the build, always close the emitter
    async fn launch(&self, build_id: u64, status: &mut BuildStatus) -> Result<(), LauncherError> {
        let mut emitter = FileEmitter::open(&self.settings.emitter_path).await?;

        let result = self.launch_with(build_id, status, &mut emitter).await;

        if let Err(e) = emitter.close().await {
            warn!(error = %e, "Closing emitter");
        }
        result
    }

    async fn launch_with(
        &self,
        build_id: u64,
        status: &mut BuildStatus,
        emitter: &mut dyn Emitter,
    ) -> Result<(), LauncherError> {
        let api = self.api.as_ref();

        api.update_step_start(build_id, SETUP_STEP)
            .await
            .map_err(|e| LauncherError::report(format!("{} start", SETUP_STEP), e))?;

        info!("Setting build status to RUNNING");
        api.update_build_status(build_id, BuildStatus::Running)
            .await
            .map_err(|e| LauncherError::report("build status to RUNNING", e))?;
        status.advance(BuildStatus::Running)?;

        info!("Fetching build");
        let build = api
            .build(build_id)
            .await
            .map_err(|e| LauncherError::fetch(format!("build {}", build_id), e))?;

        info!(job_id = build.job_id, "Fetching job");
        let job = api
            .job(build.job_id)
            .await
            .map_err(|e| LauncherError::fetch(format!("job {}", build.job_id), e))?;

        info!(pipeline_id = job.pipeline_id, "Fetching pipeline");
        let pipeline = api
            .pipeline(job.pipeline_id)
            .await
            .map_err(|e| LauncherError::fetch(format!("pipeline {}", job.pipeline_id), e))?;

        let scm = ScmPath::parse(&pipeline.scm_uri, &pipeline.scm_repo.name)?;

        let root = absolute(&self.settings.workspace_root).map_err(|e| {
            LauncherError::WorkspaceCreateFailed {
                path: self.settings.workspace_root.clone(),
                reason: e.to_string(),
            }
        })?;
        info!(root = %root.display(), "Creating workspace");
        let workspace = create_workspace(&root, &[scm.host.as_str(), scm.org.as_str()])?;

        write_artifact(&workspace.artifacts, STEPS_ARTIFACT, &build.steps).await?;
        write_artifact(&workspace.artifacts, ENVIRONMENT_ARTIFACT, &build.environment).await?;

        let source_dir = self
            .checkout
            .prepare(&workspace, &scm, &build.sha)
            .await
            .map_err(|e| LauncherError::fetch("source directory", e))?;

        let defaults = default_environment(&build, &job, &workspace, &source_dir);

        let secrets = api
            .secrets_for_build(&build)
            .await
            .map_err(|e| LauncherError::fetch(format!("secrets for build {}", build.id), e))?;

        let env = Environment::merge(
            inherited_environment(),
            &defaults,
            &build.environment,
            &secrets,
            &EnvDenylist::new(&self.settings.env_denylist),
        );
        let redactor = Redactor::new(&secrets);

        api.update_step_stop(build_id, SETUP_STEP, EXIT_OK)
            .await
            .map_err(|e| LauncherError::report(format!("{} stop", SETUP_STEP), e))?;

        let mut runner = StepRunner::new(
            self.settings.session.clone(),
            source_dir,
            env,
            redactor,
            workspace.root.join(STEP_SCRIPT),
        );

        let result = run_steps(api, build_id, &build.steps, &mut runner, emitter).await;
        runner.close().await;
        result
    }
}

/// Run `steps` in order, reporting each start and stop
///
/// Stops at the first failing step; its stop is still reported.
pub async fn run_steps(
    api: &dyn ControlPlane,
    build_id: u64,
    steps: &[CommandDef],
    runner: &mut StepRunner,
    emitter: &mut dyn Emitter,
) -> Result<(), LauncherError> {
    for step in steps {
        api.update_step_start(build_id, &step.name)
            .await
            .map_err(|e| LauncherError::report(format!("step start {:?}", step.name), e))?;

        info!(step = %step.name, "Running step");
        let (code, outcome) = match runner.run(step, emitter).await {
            Ok(result) => (result.exit_code, result.into_result(&step.name)),
            Err(e @ LauncherError::ScriptWriteFailed { .. }) => (EXIT_LAUNCH, Err(e)),
            Err(e) => (EXIT_UNKNOWN, Err(e)),
        };

        if let Err(e) = api.update_step_stop(build_id, &step.name, code).await {
            let report = LauncherError::report(format!("step stop {:?}", step.name), e);
            // A step failure already decides the outcome
            outcome.map_err(|step_err| {
                warn!(error = %report, "Could not report step stop");
                step_err
            })?;
            return Err(report);
        }

        outcome?;
    }

    Ok(())
}

/// Report a terminal status; failures are logged, never propagated
pub async fn report_terminal(api: &dyn ControlPlane, build_id: u64, status: BuildStatus) {
    info!(%status, "Setting build status");
    if let Err(e) = api.update_build_status(build_id, status).await {
        error!(error = %format!("{:#}", e), "Failed updating the build status");
    }
}

/// Variables every build gets
pub fn default_environment(
    build: &Build,
    job: &Job,
    workspace: &Workspace,
    source_dir: &Path,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for key in ["SCREWDRIVER", "CI", "CONTINUOUS_INTEGRATION"] {
        env.insert(key.to_string(), "true".to_string());
    }
    env.insert("SD_JOB_NAME".to_string(), job.name.clone());
    env.insert(
        "SD_PULL_REQUEST".to_string(),
        job.pr_number().unwrap_or_default().to_string(),
    );
    env.insert("SD_BUILD_ID".to_string(), build.id.to_string());
    env.insert("SD_BUILD_SHA".to_string(), build.sha.clone());
    env.insert(
        "SD_SOURCE_DIR".to_string(),
        source_dir.display().to_string(),
    );
    env.insert(
        "SD_ARTIFACTS_DIR".to_string(),
        workspace.artifacts.display().to_string(),
    );
    env
}

/// The launcher's own environment, skipping non-UTF-8 entries
fn inherited_environment() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                warn!(key = ?key, "Skipping non UTF-8 environment value");
                None
            }
        })
        .collect()
}
