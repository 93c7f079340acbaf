//! Default source checkout.
//!
//! Cloning is done by the build's own steps (the first step of a build is
//! the checkout command), so the launcher only provides the directory they
//! clone into and run from.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::core::{absolute, Workspace};
use crate::domain::ScmPath;

use super::SourceCheckout;

/// Resolves `src/<host>/<org>/<repo>` and creates it
#[derive(Debug, Clone, Default)]
pub struct StepCheckout;

#[async_trait]
impl SourceCheckout for StepCheckout {
    async fn prepare(&self, workspace: &Workspace, scm: &ScmPath, sha: &str) -> Result<PathBuf> {
        let dir = absolute(&workspace.src.join(&scm.repo))?;

        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create source directory: {}", dir.display()))?;

        info!(repo = %scm.https_string(), %sha, dir = %dir.display(), "Source directory ready");
        Ok(dir)
    }
}
