use crate::artifacts::{ArtifactBuilder, ScopedFile};
use crate::concurrency::{CancelFlag, SyncLock};
use crate::host::{DatabaseHost, VolumeRegistry};
use crate::layout::SyncLayout;
use crate::CoreError;
use chrono::Utc;
use remote_sync_remote::{validate_key, RemoteProvider};
use remote_sync_schema::{
    encode_stem, generate_random_token, ArtifactKind, BackupOption, BackupStem, Catalog,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Local name of the safety copy taken before a pull overwrites anything.
pub const EMERGENCY_BACKUP_NAME: &str = "emergency-backup";

/// Per-site settings the engine needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub system_name: String,
    pub environment: Option<String>,
    pub app_version: String,
    pub local_dir: PathBuf,
    pub keep_emergency_backup: bool,
}

/// What a pull did on the local side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PullResult {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_backup: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub restored_volumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_entries: Vec<String>,
}

/// Orchestrates backup push, pull, listing, and deletion.
///
/// Every local artifact created for a transfer is removed when the operation
/// ends, successfully or not. The only file left behind on purpose is the
/// emergency backup taken before a pull.
pub struct SyncEngine {
    settings: SyncSettings,
    layout: SyncLayout,
    provider: Box<dyn RemoteProvider>,
    database: Box<dyn DatabaseHost>,
    volumes: Box<dyn VolumeRegistry>,
    cancel: CancelFlag,
}

impl SyncEngine {
    pub fn new(
        settings: SyncSettings,
        provider: Box<dyn RemoteProvider>,
        database: Box<dyn DatabaseHost>,
        volumes: Box<dyn VolumeRegistry>,
    ) -> Self {
        let layout = SyncLayout::new(&settings.local_dir);
        Self {
            settings,
            layout,
            provider,
            database,
            volumes,
            cancel: CancelFlag::new(),
        }
    }

    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn layout(&self) -> &SyncLayout {
        &self.layout
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn builder(&self) -> ArtifactBuilder<'_> {
        ArtifactBuilder::new(&self.layout, self.database.as_ref(), self.volumes.as_ref())
    }

    fn lock(&self) -> Result<SyncLock, CoreError> {
        let path = self.layout.lock_file();
        SyncLock::try_acquire(&path)?.ok_or_else(|| CoreError::Locked(path.display().to_string()))
    }

    fn checkpoint(&self, stage: &'static str) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled(stage));
        }
        Ok(())
    }

    /// A fresh stem for the current instant: system, environment, UTC
    /// timestamp, random token and application version.
    pub fn generate_stem(&self) -> Result<BackupStem, CoreError> {
        Ok(encode_stem(
            &self.settings.system_name,
            self.settings.environment.as_deref(),
            Utc::now(),
            &generate_random_token(),
            &self.settings.app_version,
        )?)
    }

    /// Dump the database and upload it. Returns the remote filename.
    pub fn push_database(&self) -> Result<String, CoreError> {
        let _lock = self.lock()?;
        let stem = self.generate_stem()?;
        info!("pushing database backup {stem}");

        let artifact = ScopedFile::new(self.builder().create_database_dump(stem.as_str())?);
        self.checkpoint("push")?;
        self.provider.push(artifact.path())?;

        let filename = stem.filename(ArtifactKind::Database);
        info!("pushed {filename} to {}", self.provider.name());
        Ok(filename)
    }

    /// Archive all volumes and upload the archive. `None` when there are no
    /// volumes, in which case nothing is uploaded.
    pub fn push_volumes(&self) -> Result<Option<String>, CoreError> {
        let _lock = self.lock()?;
        let stem = self.generate_stem()?;
        info!("pushing volumes backup {stem}");

        let Some(path) = self.builder().create_volumes_archive(stem.as_str())? else {
            info!("no volumes registered; nothing to push");
            return Ok(None);
        };
        let artifact = ScopedFile::new(path);
        self.checkpoint("push")?;
        self.provider.push(artifact.path())?;

        let filename = stem.filename(ArtifactKind::Volumes);
        info!("pushed {filename} to {}", self.provider.name());
        Ok(Some(filename))
    }

    /// Replace the database with the remote dump `filename`.
    ///
    /// When emergency backups are enabled the current database is dumped to
    /// `emergency-backup.sql` first; that dump stays on disk.
    pub fn pull_database(&self, filename: &str) -> Result<PullResult, CoreError> {
        self.check_pull_key(filename)?;
        let _lock = self.lock()?;
        info!("pulling database backup {filename}");

        let emergency_backup = if self.settings.keep_emergency_backup {
            let path = self.builder().create_database_dump(EMERGENCY_BACKUP_NAME)?;
            info!("emergency database backup written to {}", path.display());
            Some(path)
        } else {
            None
        };

        let local = ScopedFile::new(self.layout.local_dir().join(filename));
        self.checkpoint("pull")?;
        self.provider.pull(filename, local.path())?;
        self.database
            .restore_from(local.path())
            .map_err(CoreError::Restore)?;

        info!("database restored from {filename}");
        Ok(PullResult {
            filename: filename.to_owned(),
            emergency_backup,
            ..PullResult::default()
        })
    }

    /// Replace matching volumes with the contents of the remote archive `filename`.
    pub fn pull_volumes(&self, filename: &str) -> Result<PullResult, CoreError> {
        self.check_pull_key(filename)?;
        self.builder().check_registered_volumes()?;
        let _lock = self.lock()?;
        info!("pulling volumes backup {filename}");

        let emergency_backup = if self.settings.keep_emergency_backup {
            let path = self.builder().create_volumes_archive(EMERGENCY_BACKUP_NAME)?;
            if let Some(path) = &path {
                info!("emergency volumes backup written to {}", path.display());
            }
            path
        } else {
            None
        };

        let local = ScopedFile::new(self.layout.local_dir().join(filename));
        self.checkpoint("pull")?;
        self.provider.pull(filename, local.path())?;
        let report = self.builder().restore_volumes_archive(local.path())?;

        info!(
            "restored {} volumes from {filename} ({} entries skipped)",
            report.restored.len(),
            report.skipped.len()
        );
        Ok(PullResult {
            filename: filename.to_owned(),
            emergency_backup,
            restored_volumes: report.restored,
            skipped_entries: report.skipped,
        })
    }

    /// Remote database backups, newest first.
    pub fn database_catalog(&self) -> Result<Catalog, CoreError> {
        self.catalog(ArtifactKind::Database)
    }

    /// Remote volume backups, newest first.
    pub fn volume_catalog(&self) -> Result<Catalog, CoreError> {
        self.catalog(ArtifactKind::Volumes)
    }

    pub fn list_databases(&self) -> Result<Vec<BackupOption>, CoreError> {
        Ok(self.database_catalog()?.options())
    }

    pub fn list_volumes(&self) -> Result<Vec<BackupOption>, CoreError> {
        Ok(self.volume_catalog()?.options())
    }

    pub fn delete_database(&self, filename: &str) -> Result<(), CoreError> {
        self.delete(filename)
    }

    pub fn delete_volume(&self, filename: &str) -> Result<(), CoreError> {
        self.delete(filename)
    }

    fn delete(&self, filename: &str) -> Result<(), CoreError> {
        self.provider.delete(filename)?;
        info!("deleted {filename} from {}", self.provider.name());
        Ok(())
    }

    fn catalog(&self, kind: ArtifactKind) -> Result<Catalog, CoreError> {
        let keys = self.provider.list(kind.suffix())?;
        let catalog = remote_sync_schema::catalog(keys);
        if !catalog.skipped.is_empty() {
            debug!(
                "ignoring {} {kind} keys that are not backup filenames: {:?}",
                catalog.skipped.len(),
                catalog.skipped
            );
        }
        Ok(catalog)
    }

    // Pulled files land in local_dir under their own name and are removed
    // afterwards, so they must not shadow the emergency backup or hidden files.
    fn check_pull_key(&self, filename: &str) -> Result<(), CoreError> {
        validate_key(filename)?;
        let reserved = SyncLayout::is_reserved(filename)
            || [ArtifactKind::Database, ArtifactKind::Volumes]
                .into_iter()
                .any(|kind| filename == format!("{EMERGENCY_BACKUP_NAME}{}", kind.suffix()));
        if reserved {
            return Err(CoreError::ReservedName(filename.to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryDatabase, StaticVolumes, Volume};
    use remote_sync_remote::{MemoryProvider, ProviderCall, RemoteError};
    use std::fs;

    struct Harness {
        dir: tempfile::TempDir,
        provider: MemoryProvider,
        database: MemoryDatabase,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                provider: MemoryProvider::new(),
                database: MemoryDatabase::new(b"CREATE TABLE live;"),
            }
        }

        fn local_dir(&self) -> PathBuf {
            self.dir.path().join("local")
        }

        fn settings(&self, keep_emergency_backup: bool) -> SyncSettings {
            SyncSettings {
                system_name: "My Site".to_owned(),
                environment: Some("prod".to_owned()),
                app_version: "4.2.0".to_owned(),
                local_dir: self.local_dir(),
                keep_emergency_backup,
            }
        }

        fn engine(&self, volumes: Vec<Volume>) -> SyncEngine {
            self.engine_with(volumes, true)
        }

        fn engine_with(&self, volumes: Vec<Volume>, keep_emergency_backup: bool) -> SyncEngine {
            SyncEngine::new(
                self.settings(keep_emergency_backup),
                Box::new(self.provider.clone()),
                Box::new(self.database.clone()),
                Box::new(StaticVolumes::new(volumes)),
            )
        }

        fn volume(&self, handle: &str, file: &str, body: &str) -> Volume {
            let root = self.dir.path().join("volumes").join(handle);
            fs::create_dir_all(&root).unwrap();
            fs::write(root.join(file), body).unwrap();
            Volume::new(handle, root)
        }

        fn staging_is_empty(&self) -> bool {
            fs::read_dir(self.local_dir().join(".staging"))
                .map_or(true, |mut entries| entries.next().is_none())
        }

        fn local_artifacts(&self) -> Vec<String> {
            let Ok(entries) = fs::read_dir(self.local_dir()) else {
                return Vec::new();
            };
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|n| !n.starts_with('.'))
                .collect()
        }
    }

    #[test]
    fn generated_stem_decodes() {
        let h = Harness::new();
        let stem = h.engine(vec![]).generate_stem().unwrap();
        let name = stem.filename(ArtifactKind::Database);
        let desc = remote_sync_schema::decode(&name).unwrap();
        assert_eq!(desc.system_name, "my-site");
        assert_eq!(desc.environment.as_deref(), Some("prod"));
        assert_eq!(desc.version, "4.2.0");
        assert_eq!(desc.random_token.len(), remote_sync_schema::RANDOM_TOKEN_LEN);
    }

    #[test]
    fn push_database_uploads_and_cleans_up() {
        let h = Harness::new();
        let filename = h.engine(vec![]).push_database().unwrap();
        assert!(filename.ends_with(".sql"));
        assert_eq!(h.provider.get(&filename).unwrap(), b"CREATE TABLE live;");
        assert!(h.local_artifacts().is_empty());
        assert_eq!(h.database.dumps().len(), 1);
    }

    #[test]
    fn failed_dump_never_pushes() {
        let h = Harness::new();
        h.database.fail_dumps(true);
        let err = h.engine(vec![]).push_database().unwrap_err();
        assert!(matches!(err, CoreError::Dump(_)));
        assert!(h.provider.calls().is_empty());
        assert!(h.local_artifacts().is_empty());
    }

    #[test]
    fn failed_push_still_removes_local_dump() {
        let h = Harness::new();
        h.provider.fail_transfers(true);
        let err = h.engine(vec![]).push_database().unwrap_err();
        assert!(matches!(err, CoreError::Remote(RemoteError::Transfer(_))));
        assert!(h.local_artifacts().is_empty());
    }

    #[test]
    fn push_volumes_without_volumes_is_none() {
        let h = Harness::new();
        assert!(h.engine(vec![]).push_volumes().unwrap().is_none());
        assert!(h.provider.calls().is_empty());
    }

    #[test]
    fn push_volumes_uploads_archive() {
        let h = Harness::new();
        let public = h.volume("public", "a.txt", "A");
        let filename = h.engine(vec![public]).push_volumes().unwrap().unwrap();
        assert!(filename.ends_with(".zip"));
        assert!(h.provider.get(&filename).is_some());
        assert!(h.local_artifacts().is_empty());
        assert!(h.staging_is_empty());
    }

    #[test]
    fn emergency_dump_precedes_failed_pull() {
        let h = Harness::new();
        let err = h
            .engine(vec![])
            .pull_database("site_230101_120000_abc_v1.sql")
            .unwrap_err();
        assert!(matches!(err, CoreError::Remote(RemoteError::NotFound(_))));

        assert_eq!(h.database.dumps().len(), 1);
        assert_eq!(
            fs::read(h.local_dir().join("emergency-backup.sql")).unwrap(),
            b"CREATE TABLE live;"
        );
        assert_eq!(
            h.provider.calls(),
            vec![ProviderCall::Pull("site_230101_120000_abc_v1.sql".to_owned())]
        );
        assert!(h.database.restores().is_empty());
    }

    #[test]
    fn pull_database_restores_and_keeps_emergency_copy() {
        let h = Harness::new();
        let key = "site_230101_120000_abc_v1.sql";
        h.provider.insert(key, b"CREATE TABLE remote;");

        let result = h.engine(vec![]).pull_database(key).unwrap();
        assert_eq!(h.database.content(), b"CREATE TABLE remote;");
        assert_eq!(
            result.emergency_backup,
            Some(h.local_dir().join("emergency-backup.sql"))
        );
        assert_eq!(h.local_artifacts(), vec!["emergency-backup.sql"]);
        assert!(!h.provider.calls().iter().any(|c| matches!(c, ProviderCall::Push(_))));
    }

    #[test]
    fn pull_without_emergency_backup() {
        let h = Harness::new();
        let key = "site_230101_120000_abc_v1.sql";
        h.provider.insert(key, b"remote");
        let result = h.engine_with(vec![], false).pull_database(key).unwrap();
        assert!(result.emergency_backup.is_none());
        assert!(h.database.dumps().is_empty());
        assert!(h.local_artifacts().is_empty());
    }

    #[test]
    fn failed_restore_removes_pulled_file() {
        let h = Harness::new();
        let key = "site_230101_120000_abc_v1.sql";
        h.provider.insert(key, b"remote");
        h.database.fail_restores(true);
        let err = h.engine_with(vec![], false).pull_database(key).unwrap_err();
        assert!(matches!(err, CoreError::Restore(_)));
        assert!(h.local_artifacts().is_empty());
    }

    #[test]
    fn pull_volumes_restores_matching_handles() {
        let h = Harness::new();
        let public = h.volume("public", "a.txt", "original");
        let engine = h.engine(vec![public.clone()]);
        let filename = engine.push_volumes().unwrap().unwrap();

        fs::write(public.root_path.join("a.txt"), "edited").unwrap();
        let result = engine.pull_volumes(&filename).unwrap();
        assert_eq!(result.restored_volumes, vec!["public"]);
        assert_eq!(fs::read_to_string(public.root_path.join("a.txt")).unwrap(), "original");
        assert_eq!(h.local_artifacts(), vec!["emergency-backup.zip"]);
        assert!(h.staging_is_empty());
    }

    #[test]
    fn pull_volumes_rejects_volume_around_local_dir() {
        let h = Harness::new();
        let key = "site_230101_120000_abc_v1.zip";
        h.provider.insert(key, b"PK");
        fs::create_dir_all(h.local_dir()).unwrap();
        fs::write(h.local_dir().join("emergency-backup.zip"), "previous").unwrap();

        let site = Volume::new("site", h.dir.path());
        let err = h.engine_with(vec![site], false).pull_volumes(key).unwrap_err();
        assert!(matches!(err, CoreError::VolumeOverlap { .. }));
        assert!(h.provider.calls().is_empty());
        assert_eq!(
            fs::read_to_string(h.local_dir().join("emergency-backup.zip")).unwrap(),
            "previous"
        );
    }

    #[test]
    fn reserved_names_cannot_be_pulled() {
        let h = Harness::new();
        let engine = h.engine(vec![]);
        for name in ["emergency-backup.sql", "emergency-backup.zip", ".lock"] {
            assert!(matches!(
                engine.pull_database(name),
                Err(CoreError::ReservedName(_))
            ));
        }
        assert!(matches!(
            engine.pull_database("../x.sql"),
            Err(CoreError::Remote(RemoteError::InvalidKey(_)))
        ));
        assert!(h.database.dumps().is_empty());
    }

    #[test]
    fn cancellation_stops_before_transfer() {
        let h = Harness::new();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let engine = h.engine(vec![]).with_cancel_flag(cancel);
        assert!(matches!(
            engine.push_database(),
            Err(CoreError::Cancelled("push"))
        ));
        assert!(h.provider.calls().is_empty());
        assert!(h.local_artifacts().is_empty());
    }

    #[test]
    fn concurrent_operation_is_rejected() {
        let h = Harness::new();
        let engine = h.engine(vec![]);
        let _held = SyncLock::acquire(&engine.layout().lock_file()).unwrap();
        assert!(matches!(engine.push_database(), Err(CoreError::Locked(_))));
    }

    #[test]
    fn list_orders_newest_first_and_skips_malformed() {
        let h = Harness::new();
        h.provider.insert("site_prod_230101_120000_abc_v1.sql", b"");
        h.provider.insert("site_230102_093000_def_v1.sql", b"");
        h.provider.insert("not_a_backup.sql", b"");
        h.provider.insert("site_230103_000000_ghi_v1.zip", b"");

        let engine = h.engine(vec![]);
        let catalog = engine.database_catalog().unwrap();
        assert_eq!(catalog.skipped, vec!["not_a_backup.sql"]);

        let options = engine.list_databases().unwrap();
        let labels: Vec<_> = options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["2023-01-02 09:30:00", "2023-01-01 12:00:00 (prod)"]);
        assert_eq!(engine.list_volumes().unwrap().len(), 1);
    }

    #[test]
    fn delete_passes_through() {
        let h = Harness::new();
        h.provider.insert("a_230101_120000_x_v1.zip", b"z");
        let engine = h.engine(vec![]);
        engine.delete_volume("a_230101_120000_x_v1.zip").unwrap();
        assert!(h.provider.keys().is_empty());
        assert!(matches!(
            engine.delete_database("missing.sql"),
            Err(CoreError::Remote(RemoteError::NotFound(_)))
        ));
    }
}
