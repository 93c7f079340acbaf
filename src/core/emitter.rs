//! Output emitters.
//!
//! An emitter receives every line a build's shell session produces (minus
//! terminator lines) plus a marker at each step boundary. Lines are written
//! as-is with no prefix.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::domain::CommandDef;

use super::error::LauncherError;

/// Sink for live build output
#[async_trait]
pub trait Emitter: Send {
    /// Mark where `step`'s output begins
    async fn announce_step(&mut self, step: &CommandDef) -> Result<(), LauncherError>;

    /// Write one line of output (without its newline)
    async fn write_line(&mut self, line: &str) -> Result<(), LauncherError>;

    /// Release the underlying handle. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), LauncherError>;
}

/// Emitter writing to a file or named pipe
pub struct FileEmitter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileEmitter {
    /// Open (or create) the emitter target for appending
    pub async fn open(path: &Path) -> Result<Self, LauncherError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| {
                LauncherError::Emitter(format!("opening {}: {}", path.display(), e))
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_raw(&mut self, text: &str) -> Result<(), LauncherError> {
        let path = &self.path;
        let writer = self.writer.as_mut().ok_or_else(|| {
            LauncherError::Emitter(format!("{} is already closed", path.display()))
        })?;

        let result = async {
            writer.write_all(text.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            // Line-buffered: readers of the pipe see each line as it arrives
            writer.flush().await
        }
        .await;

        result.map_err(|e| LauncherError::Emitter(format!("writing {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl Emitter for FileEmitter {
    async fn announce_step(&mut self, step: &CommandDef) -> Result<(), LauncherError> {
        self.write_raw(&format!("$ {}", step.command)).await
    }

    async fn write_line(&mut self, line: &str) -> Result<(), LauncherError> {
        self.write_raw(line).await
    }

    async fn close(&mut self) -> Result<(), LauncherError> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await.map_err(|e| {
                LauncherError::Emitter(format!("closing {}: {}", self.path.display(), e))
            })?;
        }
        Ok(())
    }
}

/// Something a [`BufferEmitter`] received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emitted {
    Step(String),
    Line(String),
}

/// In-memory emitter; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct BufferEmitter {
    entries: Arc<Mutex<Vec<Emitted>>>,
    closed: Arc<Mutex<bool>>,
}

impl BufferEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Emitted> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Output lines only, without step markers
    pub fn lines(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                Emitted::Line(line) => Some(line),
                Emitted::Step(_) => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.lock().map(|c| *c).unwrap_or(false)
    }

    fn push(&self, entry: Emitted) -> Result<(), LauncherError> {
        if self.is_closed() {
            return Err(LauncherError::Emitter("buffer is already closed".to_string()));
        }
        self.entries
            .lock()
            .map_err(|_| LauncherError::Emitter("buffer lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}

#[async_trait]
impl Emitter for BufferEmitter {
    async fn announce_step(&mut self, step: &CommandDef) -> Result<(), LauncherError> {
        self.push(Emitted::Step(step.name.clone()))
    }

    async fn write_line(&mut self, line: &str) -> Result<(), LauncherError> {
        self.push(Emitted::Line(line.to_string()))
    }

    async fn close(&mut self) -> Result<(), LauncherError> {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
        Ok(())
    }
}
