use remote_sync_schema::ArtifactKind;
use std::fs;
use std::path::{Path, PathBuf};

const STAGING_DIR: &str = ".staging";
const LOCK_FILE: &str = ".lock";

/// Paths inside the local sync directory.
///
/// Artifacts are written directly under the root; staging trees and the lock
/// file are hidden so they never collide with backup filenames.
#[derive(Debug, Clone)]
pub struct SyncLayout {
    local_dir: PathBuf,
}

impl SyncLayout {
    pub fn new(local_dir: impl Into<PathBuf>) -> Self {
        Self {
            local_dir: local_dir.into(),
        }
    }

    #[inline]
    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    #[inline]
    pub fn staging_dir(&self) -> PathBuf {
        self.local_dir.join(STAGING_DIR)
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.local_dir.join(LOCK_FILE)
    }

    /// `{local_dir}/{name}.{sql|zip}`
    pub fn artifact_path(&self, name: &str, kind: ArtifactKind) -> PathBuf {
        self.local_dir.join(format!("{name}{}", kind.suffix()))
    }

    pub fn initialize(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.staging_dir())
    }

    /// Whether `name` would collide with a file this layout manages itself.
    pub fn is_reserved(name: &str) -> bool {
        name.starts_with('.')
    }
}
