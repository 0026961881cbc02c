//! Building local artifacts from host state, and restoring volume archives.

use crate::archive::{unzip, zip_dir};
use crate::fsutil::{
    copy_dir_recursive, paths_overlap, remove_file_if_exists, replace_dir_contents,
};
use crate::host::{DatabaseHost, Volume, VolumeRegistry};
use crate::layout::SyncLayout;
use crate::CoreError;
use remote_sync_schema::ArtifactKind;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Removes its file on drop, whatever happened in between.
#[derive(Debug)]
pub struct ScopedFile {
    path: PathBuf,
}

impl ScopedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        match remove_file_if_exists(&self.path) {
            Ok(()) => debug!("removed local artifact {}", self.path.display()),
            Err(e) => warn!("failed to remove local artifact {}: {e}", self.path.display()),
        }
    }
}

/// Outcome of restoring a volumes archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Volume handles whose directories were replaced.
    pub restored: Vec<String>,
    /// Top-level archive entries that matched no registered volume.
    pub skipped: Vec<String>,
}

pub struct ArtifactBuilder<'a> {
    layout: &'a SyncLayout,
    database: &'a dyn DatabaseHost,
    volumes: &'a dyn VolumeRegistry,
}

impl<'a> ArtifactBuilder<'a> {
    pub fn new(
        layout: &'a SyncLayout,
        database: &'a dyn DatabaseHost,
        volumes: &'a dyn VolumeRegistry,
    ) -> Self {
        Self {
            layout,
            database,
            volumes,
        }
    }

    /// Dump the database to `{local_dir}/{name}.sql`.
    ///
    /// On failure nothing is left at the target path.
    pub fn create_database_dump(&self, name: &str) -> Result<PathBuf, CoreError> {
        fs::create_dir_all(self.layout.local_dir())?;
        let path = self.layout.artifact_path(name, ArtifactKind::Database);
        if let Err(e) = self.database.dump(&path) {
            if let Err(cleanup) = remove_file_if_exists(&path) {
                warn!("failed to remove partial dump {}: {cleanup}", path.display());
            }
            return Err(CoreError::Dump(e));
        }
        debug!("database dumped to {}", path.display());
        Ok(path)
    }

    /// Archive every registered volume into `{local_dir}/{name}.zip`.
    ///
    /// Each volume's tree lands under a top-level directory named after its
    /// handle. Returns `None` when no volumes are registered.
    pub fn create_volumes_archive(&self, name: &str) -> Result<Option<PathBuf>, CoreError> {
        let target = self.layout.artifact_path(name, ArtifactKind::Volumes);
        remove_file_if_exists(&target)?;

        let volumes = self.volumes.volumes();
        if volumes.is_empty() {
            debug!("no volumes registered; skipping archive");
            return Ok(None);
        }
        self.check_volumes(&volumes)?;

        self.layout.initialize()?;
        let staging = tempfile::Builder::new()
            .prefix("archive-")
            .tempdir_in(self.layout.staging_dir())?;

        for volume in &volumes {
            let dest = staging.path().join(&volume.handle);
            if volume.root_path.is_dir() {
                let files = copy_dir_recursive(&volume.root_path, &dest)?;
                debug!("staged {files} files from volume '{}'", volume.handle);
            } else {
                warn!(
                    "volume '{}' root {} does not exist; archiving it empty",
                    volume.handle,
                    volume.root_path.display()
                );
                fs::create_dir_all(&dest)?;
            }
        }

        if let Err(e) = zip_dir(staging.path(), &target) {
            remove_file_if_exists(&target)?;
            return Err(e);
        }
        info!("archived {} volumes to {}", volumes.len(), target.display());
        Ok(Some(target))
    }

    /// Unpack `archive` and replace each matching volume's contents with the
    /// directory of the same handle.
    ///
    /// Volumes with no entry in the archive are left untouched; entries with no
    /// registered volume are skipped and reported.
    pub fn restore_volumes_archive(&self, archive: &Path) -> Result<RestoreReport, CoreError> {
        let volumes = self.volumes.volumes();
        self.check_volumes(&volumes)?;

        self.layout.initialize()?;
        let staging = tempfile::Builder::new()
            .prefix("restore-")
            .tempdir_in(self.layout.staging_dir())?;
        unzip(archive, staging.path())?;

        let mut entries = fs::read_dir(staging.path())?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(fs::DirEntry::file_name);

        let mut report = RestoreReport::default();
        for entry in entries {
            let handle = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type()?.is_dir() {
                warn!("archive entry '{handle}' is not a directory; skipping");
                report.skipped.push(handle);
                continue;
            }
            let mut matched = false;
            for volume in volumes.iter().filter(|v| v.handle == handle) {
                let files = replace_dir_contents(&entry.path(), &volume.root_path)?;
                info!(
                    "restored volume '{handle}' ({files} files) into {}",
                    volume.root_path.display()
                );
                matched = true;
            }
            if matched {
                report.restored.push(handle);
            } else {
                warn!("archive entry '{handle}' matches no registered volume; skipping");
                report.skipped.push(handle);
            }
        }
        Ok(report)
    }
}

impl ArtifactBuilder<'_> {
    pub(crate) fn check_registered_volumes(&self) -> Result<(), CoreError> {
        self.check_volumes(&self.volumes.volumes())
    }

    // Staging, pulled archives and emergency backups live under local_dir, so
    // a volume root on either side of it would copy or clear them.
    fn check_volumes(&self, volumes: &[Volume]) -> Result<(), CoreError> {
        for volume in volumes {
            if !volume.has_valid_handle() {
                return Err(CoreError::InvalidVolume(volume.handle.clone()));
            }
            if paths_overlap(&volume.root_path, self.layout.local_dir()) {
                return Err(CoreError::VolumeOverlap {
                    handle: volume.handle.clone(),
                    root: volume.root_path.display().to_string(),
                    local_dir: self.layout.local_dir().display().to_string(),
                });
            }
        }
        Ok(())
    }
}
