//! Step script materialization.

use std::path::Path;

use crate::domain::CommandDef;

use super::error::LauncherError;

/// First line of every step script
pub const SCRIPT_HEADER: &str = "#!/bin/sh -e";

/// Write `step` to `path` as an executable script
pub async fn materialize(path: &Path, step: &CommandDef) -> Result<(), LauncherError> {
    let fail = |e: std::io::Error| LauncherError::ScriptWriteFailed {
        step: step.name.clone(),
        reason: format!("{}: {}", path.display(), e),
    };

    let contents = format!("{}\n{}\n", SCRIPT_HEADER, step.command);
    tokio::fs::write(path, contents).await.map_err(fail)?;
    set_executable(path).await.map_err(fail)?;

    Ok(())
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_writes_header_and_body() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("step.sh");
        let step = CommandDef::new("build", "make\nmake test");

        materialize(&path, &step).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "#!/bin/sh -e\nmake\nmake test\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("step.sh");
        materialize(&path, &CommandDef::new("a", "true")).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn test_overwrites_previous_step() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("step.sh");

        materialize(&path, &CommandDef::new("one", "echo one")).await.unwrap();
        materialize(&path, &CommandDef::new("two", "echo two")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("echo two"));
        assert!(!contents.contains("echo one"));
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing").join("step.sh");

        let result = materialize(&path, &CommandDef::new("lint", "true")).await;
        match result {
            Err(LauncherError::ScriptWriteFailed { step, .. }) => assert_eq!(step, "lint"),
            other => panic!("Expected ScriptWriteFailed, got {:?}", other),
        }
    }
}
