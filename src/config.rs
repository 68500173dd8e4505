//! TOML configuration for the relay daemon.
//!
//! On first run, `relayd --generate-config` writes a commented default file;
//! missing keys fall back to defaults so old config files keep loading.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity of this node on the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Publicly reachable base URL peers use to contact this node.
    pub url: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Peer base URLs to contact on startup.
    #[serde(default)]
    pub peers: Vec<String>,

    /// When set, only the configured peers are trusted and announcements
    /// from anyone else are dropped.
    #[serde(default)]
    pub disable_peer_discovery: bool,

    /// Outbound HTTP request timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            peers: vec![],
            disable_peer_discovery: false,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between peer sync rounds.
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,

    /// Seconds between enclave key re-synchronisations.
    #[serde(default = "default_key_sync_interval")]
    pub key_sync_interval_secs: u64,

    /// Upper bound on transactions per batch-resend page.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: u64,

    /// Page size when sweeping the store for a legacy full resend.
    #[serde(default = "default_resend_fetch_size")]
    pub resend_fetch_size: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval(),
            key_sync_interval_secs: default_key_sync_interval(),
            max_batch_size: default_max_batch_size(),
            resend_fetch_size: default_resend_fetch_size(),
        }
    }
}

fn default_sync_interval() -> u64 {
    60
}

fn default_key_sync_interval() -> u64 {
    120
}

fn default_max_batch_size() -> u64 {
    100
}

fn default_resend_fetch_size() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeysConfig {
    /// Base64-encoded x25519 static secrets, 32 bytes each. Empty means a
    /// fresh keypair is generated at startup (useful for local testing).
    #[serde(default)]
    pub secrets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the sled database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), AppError> {
        let contents = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Load the file if it exists, otherwise write out the defaults.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            let config = Config::default();
            config.save_to_file(path)?;
            tracing::info!("Generated default configuration at {}", path.display());
            Ok(config)
        }
    }
}
