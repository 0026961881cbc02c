//! Backup naming and cataloguing for remote-sync.
//!
//! This crate defines the persisted "schema" of the system: the canonical backup
//! filename grammar (`encode_stem` / `decode`), the structured `BackupDescriptor`
//! recovered from a filename, token sanitization, and the newest-first `Catalog`
//! built from a set of raw remote keys.

pub mod catalog;
pub mod filename;

pub use catalog::{catalog, BackupOption, Catalog};
pub use filename::{
    decode, encode_stem, generate_random_token, normalize_version, sanitize_token, ArtifactKind,
    BackupDescriptor, BackupStem, RANDOM_TOKEN_LEN, TIMESTAMP_FORMAT,
};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilenameError {
    #[error("system name '{0}' contains no usable characters")]
    EmptySystemName(String),
    #[error("random token must be non-empty ASCII alphanumeric, got '{0}'")]
    InvalidToken(String),
    #[error("application version '{0}' does not start with a dotted numeric version")]
    InvalidVersion(String),
}
