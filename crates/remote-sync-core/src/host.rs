//! Host capabilities: database dump/restore and the volume registry.
//!
//! The engine never talks to a database or enumerates data directories itself.
//! It asks a [`DatabaseHost`] to write or read a dump file and a
//! [`VolumeRegistry`] for the directories that make up the file storage.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

/// Environment variable carrying the dump or restore file path to host commands.
pub const PATH_ENV: &str = "REMOTE_SYNC_PATH";

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command `{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("{0}")]
    Other(String),
}

pub trait DatabaseHost: Send + Sync {
    /// Write a complete SQL dump of the site database to `path`.
    fn dump(&self, path: &Path) -> Result<(), HostError>;

    /// Replace the site database with the dump at `path`.
    fn restore_from(&self, path: &Path) -> Result<(), HostError>;
}

pub trait VolumeRegistry: Send + Sync {
    /// Currently registered volumes, in registration order.
    fn volumes(&self) -> Vec<Volume>;
}

/// A named storage area backed by a local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub handle: String,
    #[serde(rename = "path")]
    pub root_path: PathBuf,
}

impl Volume {
    pub fn new(handle: &str, root_path: impl Into<PathBuf>) -> Self {
        Self {
            handle: handle.to_owned(),
            root_path: root_path.into(),
        }
    }

    /// Handles name a top-level directory inside the archive, so they must be
    /// one plain path component.
    pub fn has_valid_handle(&self) -> bool {
        let h = self.handle.as_str();
        !h.is_empty() && h != "." && h != ".." && !h.contains(['/', '\\', '\0'])
    }
}

/// A fixed list of volumes, typically read from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticVolumes {
    volumes: Vec<Volume>,
}

impl StaticVolumes {
    pub fn new(volumes: Vec<Volume>) -> Self {
        Self { volumes }
    }
}

impl VolumeRegistry for StaticVolumes {
    fn volumes(&self) -> Vec<Volume> {
        self.volumes.clone()
    }
}

/// Runs shell commands to dump and restore the database.
///
/// Each command is passed to `sh -c` with the artifact path in
/// [`PATH_ENV`], e.g. `mysqldump site > "$REMOTE_SYNC_PATH"`.
#[derive(Debug, Clone)]
pub struct CommandDatabase {
    dump_command: String,
    restore_command: String,
    working_dir: Option<PathBuf>,
}

impl CommandDatabase {
    pub fn new(dump_command: &str, restore_command: &str) -> Self {
        Self {
            dump_command: dump_command.to_owned(),
            restore_command: restore_command.to_owned(),
            working_dir: None,
        }
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn run(&self, command: &str, path: &Path) -> Result<(), HostError> {
        debug!("running `{command}` with {PATH_ENV}={}", path.display());
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).env(PATH_ENV, path);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(HostError::CommandFailed {
                command: command.to_owned(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }
}

impl DatabaseHost for CommandDatabase {
    fn dump(&self, path: &Path) -> Result<(), HostError> {
        self.run(&self.dump_command, path)?;
        if !path.is_file() {
            return Err(HostError::Other(format!(
                "dump command succeeded but did not create {}",
                path.display()
            )));
        }
        Ok(())
    }

    fn restore_from(&self, path: &Path) -> Result<(), HostError> {
        self.run(&self.restore_command, path)
    }
}

#[derive(Debug, Default)]
struct DatabaseState {
    content: Vec<u8>,
    dumps: Vec<PathBuf>,
    restores: Vec<PathBuf>,
    fail_dump: bool,
    fail_restore: bool,
}

/// An in-process database whose "contents" are a byte buffer.
///
/// Dumps write the buffer to the target file; restores read the file back into
/// it. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<DatabaseState>>,
}

impl MemoryDatabase {
    pub fn new(content: &[u8]) -> Self {
        let db = Self::default();
        db.state().content = content.to_vec();
        db
    }

    fn state(&self) -> MutexGuard<'_, DatabaseState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn content(&self) -> Vec<u8> {
        self.state().content.clone()
    }

    pub fn set_content(&self, content: &[u8]) {
        self.state().content = content.to_vec();
    }

    /// Paths passed to [`DatabaseHost::dump`], including failed attempts.
    pub fn dumps(&self) -> Vec<PathBuf> {
        self.state().dumps.clone()
    }

    pub fn restores(&self) -> Vec<PathBuf> {
        self.state().restores.clone()
    }

    /// Subsequent dumps write a partial file and then fail.
    pub fn fail_dumps(&self, fail: bool) {
        self.state().fail_dump = fail;
    }

    pub fn fail_restores(&self, fail: bool) {
        self.state().fail_restore = fail;
    }
}

impl DatabaseHost for MemoryDatabase {
    fn dump(&self, path: &Path) -> Result<(), HostError> {
        let mut state = self.state();
        state.dumps.push(path.to_path_buf());
        if state.fail_dump {
            std::fs::write(path, b"-- partial")?;
            return Err(HostError::Other("simulated dump failure".to_owned()));
        }
        std::fs::write(path, &state.content)?;
        Ok(())
    }

    fn restore_from(&self, path: &Path) -> Result<(), HostError> {
        let mut state = self.state();
        state.restores.push(path.to_path_buf());
        if state.fail_restore {
            return Err(HostError::Other("simulated restore failure".to_owned()));
        }
        state.content = std::fs::read(path)?;
        Ok(())
    }
}
