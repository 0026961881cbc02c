use remote_sync_core::{
    CommandDatabase, DatabaseHost, HostError, StaticVolumes, SyncSettings, Volume,
};
use remote_sync_remote::{select_provider, HttpConfig, ProviderConfig, RemoteProvider};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "remote-sync.toml";
pub const CONFIG_ENV: &str = "REMOTE_SYNC_CONFIG";

fn default_local_dir() -> PathBuf {
    PathBuf::from("sync")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseCommands {
    pub dump_command: String,
    pub restore_command: String,
}

/// Contents of `remote-sync.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub system_name: String,
    #[serde(default)]
    pub environment: Option<String>,
    pub app_version: String,
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    #[serde(default = "default_true")]
    pub keep_emergency_backup: bool,
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
    #[serde(default)]
    pub database: Option<DatabaseCommands>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    /// Directory relative paths were resolved against; commands run here.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("config error: failed to read {}: {e}", path.display()))?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::parse(&content, &base_dir)
            .map_err(|e| format!("config error: {}: {e}", path.display()))
    }

    pub fn parse(content: &str, base_dir: &Path) -> Result<Self, String> {
        let mut config: SyncConfig = toml::from_str(content).map_err(|e| e.to_string())?;
        config.base_dir = base_dir.to_path_buf();
        config.local_dir = resolve(base_dir, &config.local_dir);
        for volume in &mut config.volumes {
            volume.root_path = resolve(base_dir, &volume.root_path);
        }
        if let Some(ProviderConfig::Filesystem { root }) = &mut config.provider {
            *root = resolve(base_dir, root);
        }
        Ok(config)
    }

    pub fn settings(&self, keep_emergency_backup: bool) -> SyncSettings {
        SyncSettings {
            system_name: self.system_name.clone(),
            environment: self.environment.clone(),
            app_version: self.app_version.clone(),
            local_dir: self.local_dir.clone(),
            keep_emergency_backup: self.keep_emergency_backup && keep_emergency_backup,
        }
    }

    /// The provider from `--remote` if given, else the `[provider]` section.
    pub fn provider(&self, remote_override: Option<&str>) -> Result<Box<dyn RemoteProvider>, String> {
        let config = match (remote_override, &self.provider) {
            (Some(url), Some(ProviderConfig::Http(http))) => {
                let mut overridden = HttpConfig::new(url);
                overridden.auth_token.clone_from(&http.auth_token);
                ProviderConfig::Http(overridden)
            }
            (Some(url), _) => ProviderConfig::Http(HttpConfig::new(url)),
            (None, Some(config)) => config.clone(),
            (None, None) => {
                return Err("config error: no [provider] section and no --remote given".to_owned())
            }
        };
        select_provider(&config).map_err(|e| format!("config error: {e}"))
    }

    pub fn require_database(&self) -> Result<(), String> {
        if self.database.is_none() {
            return Err("config error: this command needs a [database] section".to_owned());
        }
        Ok(())
    }

    pub fn database_host(&self) -> Box<dyn DatabaseHost> {
        match &self.database {
            Some(db) => Box::new(
                CommandDatabase::new(&db.dump_command, &db.restore_command)
                    .with_working_dir(&self.base_dir),
            ),
            None => Box::new(Unconfigured),
        }
    }

    pub fn volume_registry(&self) -> StaticVolumes {
        StaticVolumes::new(self.volumes.clone())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

struct Unconfigured;

impl DatabaseHost for Unconfigured {
    fn dump(&self, _path: &Path) -> Result<(), HostError> {
        Err(HostError::Other("no [database] section configured".to_owned()))
    }

    fn restore_from(&self, _path: &Path) -> Result<(), HostError> {
        Err(HostError::Other("no [database] section configured".to_owned()))
    }
}
