use crate::{key_for, transfer_io, validate_key, write_atomic, RemoteError, RemoteProvider};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A provider backed by a plain directory, e.g. a mounted network share.
///
/// Keys map one-to-one onto files directly under `root`. Writes go through a
/// temp file and a rename, so a half-copied backup is never listed.
pub struct FilesystemProvider {
    root: PathBuf,
}

impl FilesystemProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, RemoteError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl RemoteProvider for FilesystemProvider {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn list(&self, extension: &str) -> Result<Vec<String>, RemoteError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root).map_err(|e| transfer_io(&self.root, &e))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| transfer_io(&self.root, &e))?;
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(extension) && !name.starts_with('.') {
                    keys.push(name.to_owned());
                }
            }
        }
        debug!("listed {} '{extension}' keys in {}", keys.len(), self.root.display());
        Ok(keys)
    }

    fn push(&self, local_path: &Path) -> Result<(), RemoteError> {
        let key = key_for(local_path)?;
        let dest = self.key_path(&key)?;
        let mut src = File::open(local_path).map_err(|e| transfer_io(local_path, &e))?;
        let bytes = write_atomic(&dest, &mut src)?;
        debug!("copied {} ({bytes} bytes) to {}", local_path.display(), dest.display());
        Ok(())
    }

    fn pull(&self, key: &str, dest: &Path) -> Result<(), RemoteError> {
        let src_path = self.key_path(key)?;
        let mut src = match File::open(&src_path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RemoteError::NotFound(key.to_owned()));
            }
            Err(e) => return Err(transfer_io(&src_path, &e)),
        };
        let bytes = write_atomic(dest, &mut src)?;
        debug!("copied {} ({bytes} bytes) to {}", src_path.display(), dest.display());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), RemoteError> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(RemoteError::NotFound(key.to_owned()))
            }
            Err(e) => Err(transfer_io(&path, &e)),
        }
    }
}
