//! Backup artifacts and push/pull orchestration for remote-sync.
//!
//! This crate turns the host's database and registered volume directories into
//! named local artifacts (a `.sql` dump, a `.zip` archive), ships them through a
//! [`RemoteProvider`](remote_sync_remote::RemoteProvider), and restores them
//! again on pull. The [`SyncEngine`] is the central API; it takes a local
//! emergency backup before every pull and cleans up every transferred file.

pub mod archive;
pub mod artifacts;
pub mod concurrency;
pub mod engine;
pub mod fsutil;
pub mod host;
pub mod layout;

pub use artifacts::{ArtifactBuilder, RestoreReport, ScopedFile};
pub use concurrency::{install_signal_handler, CancelFlag, SyncLock};
pub use engine::{PullResult, SyncEngine, SyncSettings, EMERGENCY_BACKUP_NAME};
pub use host::{
    CommandDatabase, DatabaseHost, HostError, MemoryDatabase, StaticVolumes, Volume,
    VolumeRegistry,
};
pub use layout::SyncLayout;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("filename error: {0}")]
    Filename(#[from] remote_sync_schema::FilenameError),
    #[error("remote error: {0}")]
    Remote(#[from] remote_sync_remote::RemoteError),
    #[error("database dump failed: {0}")]
    Dump(#[source] HostError),
    #[error("database restore failed: {0}")]
    Restore(#[source] HostError),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("invalid volume handle '{0}': handles must be a single path component")]
    InvalidVolume(String),
    #[error("volume '{handle}' at {root} overlaps the local sync directory {local_dir}")]
    VolumeOverlap {
        handle: String,
        root: String,
        local_dir: String,
    },
    #[error("'{0}' is reserved for local use and cannot be pulled")]
    ReservedName(String),
    #[error("another remote-sync operation holds the lock at {0}")]
    Locked(String),
    #[error("cancelled before {0}")]
    Cancelled(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
