//! Configuration for stockroom

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stockroom")
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("stockroom.db")
}

/// Configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub access: AccessConfig,
}

/// Durable store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Maximum pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a writer waits for the database lock before giving up
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_pool_size() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Allocation / redemption tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Attempts a claim makes when its compare-and-swap loses a race
    #[serde(default = "default_claim_retry_limit")]
    pub claim_retry_limit: u32,

    /// Upper bound for audit log reads
    #[serde(default = "default_audit_limit_max")]
    pub audit_limit_max: i64,
}

fn default_claim_retry_limit() -> u32 {
    5
}

fn default_audit_limit_max() -> i64 {
    200
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            claim_retry_limit: default_claim_retry_limit(),
            audit_limit_max: default_audit_limit_max(),
        }
    }
}

/// Identity settings consumed by the authorization layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// User IDs registered as owners at startup
    #[serde(default)]
    pub default_owners: Vec<i64>,
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.toml")
    }
}
