//! Server configuration.
//!
//! Loaded once at startup from a TOML file and shared read-only by every
//! session afterwards.
//!
//! ```toml
//! address = "0.0.0.0"
//! port = 2022
//! host_key_path = "~/.config/hako/ssh_host_ed25519_key"
//! authorized_keys_file = "~/.ssh/authorized_keys"
//!
//! [store]
//! backend = "s3"
//! region = "auto"
//! endpoint_url = "https://storage.googleapis.com"
//! force_path_style = true
//! access_key_id = "GOOG..."
//! secret_access_key = "..."
//!
//! [[accounts]]
//! username = "amy"
//! password = "hunter2"
//! bucket = "amy-dropbox"
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use hako_vfs::S3StoreConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_MAX_OBJECT_SIZE, DEFAULT_REGION, DEFAULT_SSH_PORT};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which object store sessions talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// S3-compatible endpoint (AWS, GCS interoperability, MinIO).
    #[default]
    S3,
    /// Process-local, lost on exit.
    Memory,
}

/// Object store connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

/// One login and the bucket it is rooted in.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Account {
    pub username: String,
    /// Password login; `None` allows public-key login only.
    #[serde(default)]
    pub password: Option<String>,
    pub bucket: String,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// OpenSSH private key; an ephemeral key is generated when absent.
    #[serde(default)]
    pub host_key_path: Option<PathBuf>,
    #[serde(default)]
    pub authorized_keys_file: Option<PathBuf>,
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,
    #[serde(default)]
    pub store: StoreConfig,
    pub accounts: Vec<Account>,
}

fn default_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_max_object_size() -> u64 {
    DEFAULT_MAX_OBJECT_SIZE
}

/// Expand `~` in a configured path.
fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).as_ref())
}

impl ServerConfig {
    /// Read, parse, and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = expand(path.as_ref());
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate config text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: ServerConfig = toml::from_str(text)?;
        config.host_key_path = config.host_key_path.as_deref().map(expand);
        config.authorized_keys_file = config.authorized_keys_file.as_deref().map(expand);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::Invalid("at least one account is required".into()));
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.username.is_empty() {
                return Err(ConfigError::Invalid("account with empty username".into()));
            }
            if account.bucket.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "account {} has no bucket",
                    account.username
                )));
            }
            if !seen.insert(account.username.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate account {}",
                    account.username
                )));
            }
        }

        if self.store.access_key_id.is_some() != self.store.secret_access_key.is_some() {
            return Err(ConfigError::Invalid(
                "access_key_id and secret_access_key must be set together".into(),
            ));
        }

        self.bind_addr()?;
        Ok(())
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.address, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bad listen address {}: {e}", self.address)))
    }

    /// Look up an account by login name.
    pub fn account(&self, username: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.username == username)
    }

    /// S3 client settings derived from the `[store]` table.
    pub fn s3_config(&self) -> S3StoreConfig {
        let credentials = self
            .store
            .access_key_id
            .clone()
            .zip(self.store.secret_access_key.clone());
        S3StoreConfig {
            region: self.store.region.clone(),
            endpoint_url: self.store.endpoint_url.clone(),
            force_path_style: self.store.force_path_style,
            credentials,
        }
    }
}
