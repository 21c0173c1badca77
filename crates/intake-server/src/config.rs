//! Configuration management

use intake_repair::RepairConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::handoff::WriteMode;
use crate::storage::config::StagingConfig;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/intake";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Ingest Configuration Constants
// ============================================================================

/// Default prefix under which files land.
pub const DEFAULT_LANDING_PREFIX: &str = "landing";

/// Default prefix under which artifacts are staged.
pub const DEFAULT_STAGING_PREFIX: &str = "staging";

/// Default namespace the loader writes into.
pub const DEFAULT_TARGET_NAMESPACE: &str = "bronze";

/// Default claiming attempts before a fingerprint is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default age in seconds after which an unfinished claim is reclaimable.
pub const DEFAULT_STALE_CLAIM_SECS: u64 = 900;

/// Default repair pipeline time bound in seconds.
pub const DEFAULT_REPAIR_TIMEOUT_SECS: u64 = 300;

/// Default time bound for landing reads, staging writes and store calls.
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 60;

/// Default publisher request timeout in seconds.
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 30;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub lifecycle: LifecycleConfig,
    pub database: DatabaseConfig,
    pub staging: StagingConfig,
    pub ingest: IngestConfig,
    pub repair: RepairConfig,
    pub publisher: PublisherConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for LifecycleBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(LifecycleBackend::Memory),
            "postgres" | "postgresql" => Ok(LifecycleBackend::Postgres),
            _ => Err(anyhow::anyhow!("Invalid lifecycle backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    pub backend: LifecycleBackend,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Delivery processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub landing_prefix: String,
    pub staging_prefix: String,
    pub target_namespace: String,
    pub write_mode: WriteMode,
    /// Merge keys sent with UPSERT hand-offs
    pub upsert_keys: Vec<String>,
    /// Declared primary-key columns per target table
    pub primary_keys: HashMap<String, Vec<String>>,
    pub max_attempts: u32,
    pub stale_claim_secs: u64,
    pub repair_timeout_secs: u64,
    pub io_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            landing_prefix: DEFAULT_LANDING_PREFIX.to_string(),
            staging_prefix: DEFAULT_STAGING_PREFIX.to_string(),
            target_namespace: DEFAULT_TARGET_NAMESPACE.to_string(),
            write_mode: WriteMode::Append,
            upsert_keys: Vec::new(),
            primary_keys: HashMap::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            stale_claim_secs: DEFAULT_STALE_CLAIM_SECS,
            repair_timeout_secs: DEFAULT_REPAIR_TIMEOUT_SECS,
            io_timeout_secs: DEFAULT_IO_TIMEOUT_SECS,
        }
    }
}

/// Outbound endpoints; unset URLs are logged instead of sent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub handoff_url: Option<String>,
    pub events_url: Option<String>,
    pub dead_letter_url: Option<String>,
    pub timeout_secs: u64,
    pub header_classifier_url: Option<String>,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|s| split_list(&s, ','))
        .unwrap_or_default()
}

fn split_list(s: &str, sep: char) -> Vec<String> {
    s.split(sep)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Parse `table=col1,col2;table2=col` into per-table key lists
pub fn parse_primary_keys(raw: &str) -> anyhow::Result<HashMap<String, Vec<String>>> {
    let mut keys = HashMap::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((table, columns)) = entry.split_once('=') else {
            anyhow::bail!("Primary key entry '{}' is not of the form table=col1,col2", entry);
        };
        let columns = split_list(columns, ',');
        if table.trim().is_empty() || columns.is_empty() {
            anyhow::bail!("Primary key entry '{}' names no table or no columns", entry);
        }
        keys.insert(table.trim().to_string(), columns);
    }
    Ok(keys)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("INTAKE_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("INTAKE_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or("INTAKE_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            lifecycle: LifecycleConfig {
                backend: std::env::var("LIFECYCLE_BACKEND")
                    .ok()
                    .map(|s| s.parse())
                    .transpose()?
                    .unwrap_or(LifecycleBackend::Memory),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            staging: StagingConfig::from_env()?,
            ingest: IngestConfig {
                landing_prefix: std::env::var("INGEST_LANDING_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_LANDING_PREFIX.to_string()),
                staging_prefix: std::env::var("INGEST_STAGING_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_STAGING_PREFIX.to_string()),
                target_namespace: std::env::var("INGEST_TARGET_NAMESPACE")
                    .unwrap_or_else(|_| DEFAULT_TARGET_NAMESPACE.to_string()),
                write_mode: std::env::var("INGEST_WRITE_MODE")
                    .ok()
                    .map(|s| s.parse())
                    .transpose()?
                    .unwrap_or(WriteMode::Append),
                upsert_keys: env_list("INGEST_UPSERT_KEYS"),
                primary_keys: match std::env::var("INGEST_PRIMARY_KEYS") {
                    Ok(raw) => parse_primary_keys(&raw)?,
                    Err(_) => HashMap::new(),
                },
                max_attempts: env_or("INGEST_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
                stale_claim_secs: env_or("INGEST_STALE_CLAIM_SECS", DEFAULT_STALE_CLAIM_SECS),
                repair_timeout_secs: env_or("INGEST_REPAIR_TIMEOUT_SECS", DEFAULT_REPAIR_TIMEOUT_SECS),
                io_timeout_secs: env_or("INGEST_IO_TIMEOUT_SECS", DEFAULT_IO_TIMEOUT_SECS),
            },
            repair: RepairConfig::from_env(),
            publisher: PublisherConfig {
                handoff_url: std::env::var("HANDOFF_URL").ok(),
                events_url: std::env::var("EVENTS_URL").ok(),
                dead_letter_url: std::env::var("DEAD_LETTER_URL").ok(),
                timeout_secs: env_or("PUBLISH_TIMEOUT_SECS", DEFAULT_PUBLISH_TIMEOUT_SECS),
                header_classifier_url: std::env::var("HEADER_CLASSIFIER_URL").ok(),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.lifecycle.backend == LifecycleBackend::Postgres {
            if self.database.url.is_empty() {
                anyhow::bail!("Database URL cannot be empty");
            }
            if self.database.max_connections == 0 {
                anyhow::bail!("Database max_connections must be greater than 0");
            }
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.ingest.max_attempts == 0 {
            anyhow::bail!("Ingest max_attempts must be greater than 0");
        }

        if self.ingest.write_mode == WriteMode::Upsert && self.ingest.upsert_keys.is_empty() {
            anyhow::bail!("UPSERT write mode requires INGEST_UPSERT_KEYS");
        }

        if self.ingest.repair_timeout_secs == 0 || self.ingest.io_timeout_secs == 0 {
            anyhow::bail!("Ingest timeouts must be greater than 0");
        }

        self.repair.validate()?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            lifecycle: LifecycleConfig {
                backend: LifecycleBackend::Memory,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            staging: StagingConfig::default(),
            ingest: IngestConfig::default(),
            repair: RepairConfig::default(),
            publisher: PublisherConfig {
                timeout_secs: DEFAULT_PUBLISH_TIMEOUT_SECS,
                ..PublisherConfig::default()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.ingest.target_namespace, "bronze");
        assert_eq!(config.ingest.max_attempts, 3);
    }

    #[test]
    fn test_parse_primary_keys() {
        let keys = parse_primary_keys("orders=order_id, line_no; customers=id").unwrap();
        assert_eq!(keys["orders"], vec!["order_id", "line_no"]);
        assert_eq!(keys["customers"], vec!["id"]);
        assert!(parse_primary_keys("").unwrap().is_empty());
        assert!(parse_primary_keys("orders").is_err());
        assert!(parse_primary_keys("orders=").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = Config::default();
        config.ingest.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ingest.write_mode = WriteMode::Upsert;
        assert!(config.validate().is_err());
        config.ingest.upsert_keys = vec!["id".to_string()];
        config.validate().unwrap();

        let mut config = Config::default();
        config.repair.max_overflow_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_load_from_env() {
        std::env::set_var("INGEST_WRITE_MODE", "UPSERT");
        std::env::set_var("INGEST_UPSERT_KEYS", "order_id, line_no");
        std::env::set_var("INGEST_PRIMARY_KEYS", "orders=order_id");
        std::env::set_var("INGEST_MAX_ATTEMPTS", "5");

        let config = Config::load().unwrap();
        assert_eq!(config.ingest.write_mode, WriteMode::Upsert);
        assert_eq!(config.ingest.upsert_keys, vec!["order_id", "line_no"]);
        assert_eq!(config.ingest.primary_keys["orders"], vec!["order_id"]);
        assert_eq!(config.ingest.max_attempts, 5);

        std::env::set_var("INGEST_UPSERT_KEYS", "");
        assert!(Config::load().is_err());

        for name in [
            "INGEST_WRITE_MODE",
            "INGEST_UPSERT_KEYS",
            "INGEST_PRIMARY_KEYS",
            "INGEST_MAX_ATTEMPTS",
        ] {
            std::env::remove_var(name);
        }
    }
}
