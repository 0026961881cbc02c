use crate::{FilesystemProvider, HttpProvider, RemoteError, RemoteProvider};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Connection settings for an HTTP object store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpConfig {
    pub url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl HttpConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_owned(),
            auth_token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }
}

/// Which provider to talk to, chosen once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
    Http(HttpConfig),
    Filesystem { root: PathBuf },
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), RemoteError> {
        match self {
            ProviderConfig::Http(http) => {
                if !(http.url.starts_with("http://") || http.url.starts_with("https://")) {
                    return Err(RemoteError::Config(format!(
                        "provider url must be http(s), got '{}'",
                        http.url
                    )));
                }
            }
            ProviderConfig::Filesystem { root } => {
                if root.as_os_str().is_empty() {
                    return Err(RemoteError::Config(
                        "filesystem provider needs a root directory".to_owned(),
                    ));
                }
            }
        }
        Ok(())
    }
}

pub fn select_provider(config: &ProviderConfig) -> Result<Box<dyn RemoteProvider>, RemoteError> {
    config.validate()?;
    match config {
        ProviderConfig::Http(http) => {
            let mut http = http.clone();
            http.url = http.url.trim_end_matches('/').to_owned();
            Ok(Box::new(HttpProvider::new(http)))
        }
        ProviderConfig::Filesystem { root } => Ok(Box::new(FilesystemProvider::new(root.clone()))),
    }
}
