//! Interfaces to the systems the launcher talks to.
//!
//! - `ControlPlane`: the build API (records in, statuses out)
//! - `SourceCheckout`: resolves the directory the build's steps run in

pub mod checkout;
pub mod screwdriver;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use crate::core::Workspace;
use crate::domain::{Build, BuildStatus, Job, Pipeline, ScmPath, Secret};

pub use checkout::StepCheckout;
pub use screwdriver::ScrewdriverApi;

/// The build-management API
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn build(&self, build_id: u64) -> Result<Build>;

    async fn job(&self, job_id: u64) -> Result<Job>;

    async fn pipeline(&self, pipeline_id: u64) -> Result<Pipeline>;

    async fn secrets_for_build(&self, build: &Build) -> Result<Vec<Secret>>;

    async fn update_step_start(&self, build_id: u64, step: &str) -> Result<()>;

    async fn update_step_stop(&self, build_id: u64, step: &str, code: i32) -> Result<()>;

    async fn update_build_status(&self, build_id: u64, status: BuildStatus) -> Result<()>;
}

/// Produces the source directory for a build
#[async_trait]
pub trait SourceCheckout: Send + Sync {
    /// Return an absolute path that exists before any step runs
    async fn prepare(&self, workspace: &Workspace, scm: &ScmPath, sha: &str) -> Result<PathBuf>;
}
