//! JSON artifacts written into the workspace's artifacts directory.
//!
//! Written once per build and never read back by the launcher.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use super::error::LauncherError;

pub const STEPS_ARTIFACT: &str = "steps.json";
pub const ENVIRONMENT_ARTIFACT: &str = "environment.json";

/// Serialize `value` as 4-space indented JSON into `dir/name`
pub async fn write_artifact<T: Serialize + ?Sized>(
    dir: &Path,
    name: &str,
    value: &T,
) -> Result<PathBuf, LauncherError> {
    let fail = |reason: String| LauncherError::Artifact {
        name: name.to_string(),
        reason,
    };

    let mut data = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut data, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut serializer)
        .map_err(|e| fail(format!("marshaling artifact: {}", e)))?;

    let path = dir.join(name);
    tokio::fs::write(&path, &data)
        .await
        .map_err(|e| fail(format!("creating file {}: {}", path.display(), e)))?;

    Ok(path)
}
