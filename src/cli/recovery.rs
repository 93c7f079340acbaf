//! Last-resort panic handling.
//!
//! A panic anywhere in the launcher leaves a stacktrace file in the temp
//! directory so the failure can be diagnosed after the container is gone.

use std::backtrace::Backtrace;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::error;

/// `launcher-stacktrace-<rfc3339>`
pub fn stacktrace_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "launcher-stacktrace-{}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    ))
}

/// Write `message` and a backtrace to a new stacktrace file in `dir`
pub fn write_stacktrace(dir: &Path, message: &str) -> std::io::Result<PathBuf> {
    let path = stacktrace_path(dir);
    let trace = Backtrace::force_capture();
    std::fs::write(&path, format!("{}\n\n{}\n", message, trace))?;
    Ok(path)
}

/// Chain a hook that records the panic before the default handler runs
pub fn install_panic_hook() {
    let default = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = info.to_string();
        match write_stacktrace(&std::env::temp_dir(), &message) {
            Ok(path) => error!(path = %path.display(), "Launcher panicked: {}", message),
            Err(e) => error!(error = %e, "Launcher panicked: {}", message),
        }
        default(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_writes_stacktrace_file() {
        let temp = TempDir::new().unwrap();

        let path = write_stacktrace(temp.path(), "boom").unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("launcher-stacktrace-"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("boom\n"));
    }
}
