use crate::{
    key_for, transfer_io, validate_key, write_atomic, HttpConfig, RemoteError, RemoteProvider,
};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

const PROTOCOL_HEADER: &str = "X-Remote-Sync-Protocol";

/// HTTP object store provider.
///
/// Expects a flat REST namespace under the configured base URL:
/// - `PUT    /<key>` upload a backup (streamed request body)
/// - `GET    /<key>` download a backup
/// - `DELETE /<key>` remove a backup
/// - `GET    /`      list keys (JSON array of strings)
///
/// S3-compatible gateways and presigning proxies can expose exactly this shape.
pub struct HttpProvider {
    config: HttpConfig,
    agent: ureq::Agent,
}

impl HttpProvider {
    pub fn new(config: HttpConfig) -> Self {
        let agent = ureq::Agent::new_with_defaults();
        Self { config, agent }
    }

    fn key_url(&self, key: &str) -> String {
        format!("{}/{}", self.config.url, key)
    }

    fn map_error(key: &str, url: &str, err: ureq::Error) -> RemoteError {
        match err {
            ureq::Error::StatusCode(404) => RemoteError::NotFound(key.to_owned()),
            ureq::Error::StatusCode(code) => {
                RemoteError::Transfer(format!("HTTP {code} for {url}"))
            }
            e => RemoteError::Transfer(format!("{url}: {e}")),
        }
    }
}

impl RemoteProvider for HttpProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    fn list(&self, extension: &str) -> Result<Vec<String>, RemoteError> {
        let url = format!("{}/", self.config.url);
        debug!("GET {url}");
        let mut req = self
            .agent
            .get(&url)
            .header(PROTOCOL_HEADER, &crate::PROTOCOL_VERSION.to_string());
        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        let resp = req.call().map_err(|e| Self::map_error("/", &url, e))?;

        let mut body = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Transfer(format!("{url}: {e}")))?;
        let keys: Vec<String> = serde_json::from_slice(&body)
            .map_err(|e| RemoteError::Serialization(format!("invalid listing from {url}: {e}")))?;

        Ok(keys
            .into_iter()
            .filter(|k| k.ends_with(extension))
            .collect())
    }

    fn push(&self, local_path: &Path) -> Result<(), RemoteError> {
        let key = key_for(local_path)?;
        let mut file = File::open(local_path).map_err(|e| transfer_io(local_path, &e))?;
        let size = file.metadata().map(|m| m.len()).unwrap_or_default();

        let url = self.key_url(&key);
        debug!("PUT {url} ({size} bytes)");
        let mut req = self
            .agent
            .put(&url)
            .header("Content-Type", "application/octet-stream")
            .header(PROTOCOL_HEADER, &crate::PROTOCOL_VERSION.to_string());
        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        req.send(ureq::SendBody::from_reader(&mut file))
            .map_err(|e| Self::map_error(&key, &url, e))?;
        Ok(())
    }

    fn pull(&self, key: &str, dest: &Path) -> Result<(), RemoteError> {
        validate_key(key)?;
        let url = self.key_url(key);
        debug!("GET {url}");
        let mut req = self
            .agent
            .get(&url)
            .header(PROTOCOL_HEADER, &crate::PROTOCOL_VERSION.to_string());
        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        let resp = req.call().map_err(|e| Self::map_error(key, &url, e))?;

        let mut reader = resp.into_body().into_reader();
        let bytes = write_atomic(dest, &mut reader)?;
        debug!("downloaded {key} ({bytes} bytes) to {}", dest.display());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), RemoteError> {
        validate_key(key)?;
        let url = self.key_url(key);
        debug!("DELETE {url}");
        let mut req = self
            .agent
            .delete(&url)
            .header(PROTOCOL_HEADER, &crate::PROTOCOL_VERSION.to_string());
        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        req.call().map_err(|e| Self::map_error(key, &url, e))?;
        Ok(())
    }
}
