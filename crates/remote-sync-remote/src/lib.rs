//! Remote storage providers for remote-sync.
//!
//! This crate defines the `RemoteProvider` capability (list, push, pull, delete
//! of whole backup files keyed by their base filename), the error taxonomy
//! shared by every provider, provider configuration, and three concrete
//! providers: an HTTP object store client, a plain directory, and an in-memory
//! store used by tests.

pub mod config;
pub mod fs;
pub mod http;
pub mod memory;

pub use config::{select_provider, HttpConfig, ProviderConfig};
pub use fs::FilesystemProvider;
pub use http::HttpProvider;
pub use memory::{MemoryProvider, ProviderCall};

use std::io::{self, Read};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Protocol version sent as `X-Remote-Sync-Protocol` header on all HTTP requests.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid key '{0}': keys are bare filenames of [A-Za-z0-9._-]")]
    InvalidKey(String),
    #[error("remote config error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A remote store holding backup files under flat keys.
///
/// Every operation is all-or-nothing for a single key. Keys equal the base
/// filename of the pushed file.
pub trait RemoteProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Keys whose name ends with `extension` (e.g. `".sql"`). Order is unspecified.
    fn list(&self, extension: &str) -> Result<Vec<String>, RemoteError>;

    /// Upload the file at `local_path` under its base filename.
    fn push(&self, local_path: &Path) -> Result<(), RemoteError>;

    /// Download `key` to `dest`. `dest` is either fully written or untouched.
    fn pull(&self, key: &str, dest: &Path) -> Result<(), RemoteError>;

    /// Remove `key`. Fails with [`RemoteError::NotFound`] if it does not exist.
    fn delete(&self, key: &str) -> Result<(), RemoteError>;
}

/// Reject anything that is not a bare filename made of URL- and path-safe characters.
pub fn validate_key(key: &str) -> Result<(), RemoteError> {
    let safe = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if safe {
        Ok(())
    } else {
        Err(RemoteError::InvalidKey(key.to_owned()))
    }
}

/// The remote key for a local file: its validated base filename.
pub fn key_for(local_path: &Path) -> Result<String, RemoteError> {
    let key = local_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RemoteError::InvalidKey(local_path.display().to_string()))?;
    validate_key(key)?;
    Ok(key.to_owned())
}

/// Stream `reader` into a temp file next to `dest`, then rename it into place.
pub(crate) fn write_atomic(dest: &Path, reader: &mut dyn Read) -> Result<u64, RemoteError> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| transfer_io(parent, &e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| transfer_io(parent, &e))?;
    let written = io::copy(reader, &mut tmp).map_err(|e| transfer_io(dest, &e))?;
    tmp.as_file().sync_all().map_err(|e| transfer_io(dest, &e))?;
    tmp.persist(dest).map_err(|e| transfer_io(dest, &e.error))?;
    Ok(written)
}

pub(crate) fn transfer_io(path: &Path, err: &io::Error) -> RemoteError {
    RemoteError::Transfer(format!("{}: {err}", path.display()))
}
