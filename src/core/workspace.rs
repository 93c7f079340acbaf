//! Workspace creation.
//!
//! Every build gets a pristine tree:
//!
//! ```text
//! <root>/src/<segments...>    e.g. /sd/workspace/src/github.com/screwdriver-cd
//! <root>/artifacts
//! ```
//!
//! Reusing a workspace is never allowed, so an existing target path is an
//! error rather than something to clean up.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use super::error::LauncherError;

/// Paths available to a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
    pub src: PathBuf,
    pub artifacts: PathBuf,
}

/// Absolute form of `path`, resolved against the current directory
pub fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// A segment must name exactly one directory below its parent
fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == segment
    )
}

/// Create `root/src/<segments...>` and `root/artifacts`
///
/// Both targets are checked before either is created, so a conflict leaves
/// the filesystem as it was. Segments come from the control plane and must
/// stay below `root/src`.
pub fn create_workspace<S: AsRef<str>>(
    root: &Path,
    segments: &[S],
) -> Result<Workspace, LauncherError> {
    let mut src = root.join("src");
    for segment in segments {
        let segment = segment.as_ref();
        if !is_plain_segment(segment) {
            return Err(LauncherError::WorkspaceCreateFailed {
                path: src,
                reason: format!("invalid path segment {:?}", segment),
            });
        }
        src.push(segment);
    }
    let artifacts = root.join("artifacts");

    for path in [&src, &artifacts] {
        if path.exists() {
            return Err(LauncherError::WorkspaceConflict { path: path.clone() });
        }
    }

    for path in [&src, &artifacts] {
        std::fs::create_dir_all(path).map_err(|e| LauncherError::WorkspaceCreateFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "Created workspace path");
    }

    Ok(Workspace {
        root: root.to_path_buf(),
        src,
        artifacts,
    })
}
