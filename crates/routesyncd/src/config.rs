//! Configuration file support for routesyncd
//!
//! Loads and validates routesyncd configuration from TOML files.
//! Default location: /etc/sonic/routesyncd.conf
//!
//! ```toml
//! log_level = "info"
//!
//! [database]
//! redis_host = "127.0.0.1"
//! redis_port = 6379
//! appl_db_number = 0
//!
//! [sync]
//! table_id = 254
//! list_existing = true
//!
//! [metrics]
//! enabled = false
//! port = 9093
//! ```

use crate::error::{Result, RoutesyncError};
use crate::metrics_server::DEFAULT_METRICS_PORT;
use crate::redis_adapter::{APPL_DB, redis_url};
use crate::route_sync::SyncOptions;
use crate::types::RT_TABLE_MAIN;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/routesyncd.conf";

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Redis database number for APPL_DB
    #[serde(default = "default_appl_db_number")]
    pub appl_db_number: i64,
}

/// Synchronization configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Kernel routing table to mirror
    #[serde(default = "default_table_id")]
    pub table_id: u32,

    /// Replay the installed table at startup
    #[serde(default = "default_list_existing")]
    pub list_existing: bool,
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Complete routesyncd configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutesyncConfig {
    /// Default tracing filter, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

// Default functions
fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_appl_db_number() -> i64 {
    APPL_DB
}

fn default_table_id() -> u32 {
    RT_TABLE_MAIN
}

fn default_list_existing() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            appl_db_number: default_appl_db_number(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            table_id: default_table_id(),
            list_existing: default_list_existing(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for RoutesyncConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            database: DatabaseConfig::default(),
            sync: SyncConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl RoutesyncConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| {
                RoutesyncError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Logging is not initialized yet
                eprintln!(
                    "routesyncd: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(RoutesyncError::Io(e)),
        }
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RoutesyncError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.redis_host.is_empty() {
            return Err(RoutesyncError::Config("redis_host must not be empty".to_string()));
        }

        if self.database.redis_port == 0 {
            return Err(RoutesyncError::Config("redis_port must be > 0".to_string()));
        }

        if self.database.appl_db_number < 0 {
            return Err(RoutesyncError::Config(
                "appl_db_number must be >= 0".to_string(),
            ));
        }

        // RT_TABLE_UNSPEC
        if self.sync.table_id == 0 {
            return Err(RoutesyncError::Config("table_id must be > 0".to_string()));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(RoutesyncError::Config(
                "metrics port must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Redis URL of APPL_DB
    pub fn redis_url(&self) -> String {
        redis_url(
            &self.database.redis_host,
            self.database.redis_port,
            self.database.appl_db_number,
        )
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            table_id: self.sync.table_id,
            list_existing: self.sync.list_existing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = RoutesyncConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.database.redis_host, "127.0.0.1");
        assert_eq!(config.database.redis_port, 6379);
        assert_eq!(config.database.appl_db_number, 0);
        assert_eq!(config.sync.table_id, 254);
        assert!(config.sync.list_existing);
        assert!(!config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RoutesyncConfig::from_toml(
            r#"
            [sync]
            list_existing = false

            [metrics]
            enabled = true
            "#,
        )
        .unwrap();

        assert!(!config.sync.list_existing);
        assert_eq!(config.sync.table_id, RT_TABLE_MAIN);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, DEFAULT_METRICS_PORT);
        assert_eq!(config.database, DatabaseConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let err = RoutesyncConfig::from_toml("[database]\nredis_port = \"high\"").unwrap_err();
        assert!(matches!(err, RoutesyncError::Config(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = RoutesyncConfig::default();
        config.database.redis_port = 0;
        assert!(config.validate().is_err());

        let mut config = RoutesyncConfig::default();
        config.sync.table_id = 0;
        assert!(config.validate().is_err());

        let mut config = RoutesyncConfig::default();
        config.metrics.port = 0;
        assert!(config.validate().is_ok());
        config.metrics.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "log_level = \"debug\"\n[database]\nredis_host = \"10.0.0.5\"\nredis_port = 6380"
        )
        .unwrap();

        let config = RoutesyncConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.redis_url(), "redis://10.0.0.5:6380/0");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = RoutesyncConfig::load_or_default(dir.path().join("absent.conf")).unwrap();
        assert_eq!(config, RoutesyncConfig::default());
    }

    #[test]
    fn test_sync_options() {
        let mut config = RoutesyncConfig::default();
        config.sync.table_id = 100;
        config.sync.list_existing = false;

        let options = config.sync_options();
        assert_eq!(options.table_id, 100);
        assert!(!options.list_existing);
    }
}
