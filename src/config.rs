//! Configuration for the ledger server

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which transaction engine the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerVariant {
    /// Relational ledger; the database is the source of truth.
    External,
    /// In-memory map behind an exclusive lock.
    Mutex,
    /// In-memory map owned by a single applier task behind a bounded queue.
    SingleWriter,
}

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the write-ahead log file
    pub wal_path: PathBuf,

    /// Engine variant selector
    pub variant: LedgerVariant,

    /// Queue capacity (single-writer variant only); the backpressure bound
    pub queue_capacity: usize,

    /// Allow balance reads under the shared lock (mutex variant only)
    pub shared_balance_reads: bool,

    /// gRPC listen address
    pub grpc_listen_addr: String,

    /// Health/metrics listen address
    pub metrics_listen_addr: String,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// External store configuration
    pub database: DatabaseConfig,
}

/// Connection pool configuration for the external store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// MySQL connection URL
    pub url: String,

    /// Maximum pooled connections
    pub max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wal_path: PathBuf::from("./data/ledger.wal"),
            variant: LedgerVariant::Mutex,
            queue_capacity: 1024,
            shared_balance_reads: true,
            grpc_listen_addr: "0.0.0.0:50051".to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            service_name: "memledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "mysql://root@localhost:3306/ledger".to_string(),
            max_connections: 100,
        }
    }
}

impl Config {
    /// Load from a toml file; missing keys fall back to defaults.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    /// `LEDGER_CONFIG` file (if set), then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("LEDGER_CONFIG") {
            Ok(path) => Config::from_file(path)?,
            Err(_) => Config::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("LEDGER_WAL_PATH") {
            self.wal_path = PathBuf::from(path);
        }
        if let Ok(variant) = std::env::var("LEDGER_VARIANT") {
            self.variant = match variant.as_str() {
                "external" => LedgerVariant::External,
                "mutex" => LedgerVariant::Mutex,
                "single_writer" => LedgerVariant::SingleWriter,
                other => {
                    return Err(Error::Config(format!("unknown ledger variant: {other}")));
                }
            };
        }
        if let Ok(capacity) = std::env::var("LEDGER_QUEUE_CAPACITY") {
            self.queue_capacity = capacity
                .parse()
                .map_err(|e| Error::Config(format!("bad queue capacity: {e}")))?;
        }
        if let Ok(addr) = std::env::var("LEDGER_GRPC_ADDR") {
            self.grpc_listen_addr = addr;
        }
        if let Ok(addr) = std::env::var("LEDGER_METRICS_ADDR") {
            self.metrics_listen_addr = addr;
        }
        if let Ok(url) = std::env::var("LEDGER_DATABASE_URL") {
            self.database.url = url;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "memledger");
        assert_eq!(config.variant, LedgerVariant::Mutex);
        assert_eq!(config.queue_capacity, 1024);
        assert!(config.shared_balance_reads);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            variant = "single_writer"
            wal_path = "/var/lib/memledger/ledger.wal"

            [database]
            url = "mysql://ledger@db:3306/ledger"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.variant, LedgerVariant::SingleWriter);
        assert_eq!(
            parsed.wal_path,
            PathBuf::from("/var/lib/memledger/ledger.wal")
        );
        assert_eq!(parsed.database.url, "mysql://ledger@db:3306/ledger");
        // Untouched keys keep their defaults.
        assert_eq!(parsed.queue_capacity, 1024);
        assert_eq!(parsed.grpc_listen_addr, "0.0.0.0:50051");
    }
}
