//! Configuration management

use std::path::PathBuf;

use crate::identity::SidHashAlgorithm;

// ============================================================================
// Inbox Configuration Constants
// ============================================================================

/// Default drop zone watched for exports.
pub const DEFAULT_INBOX_DIR: &str = "./inbox";

/// Extension of raw exports as dropped by the collector (no dot).
pub const DEFAULT_RAW_EXTENSION: &str = "txt";

/// Extension of converted files in the working area (no dot).
pub const DEFAULT_NORMALIZED_EXTENSION: &str = "csv";

/// Default inbox polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

// ============================================================================
// Database Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/mwt";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub inbox: InboxConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone)]
pub struct InboxConfig {
    pub root: PathBuf,
    pub raw_extension: String,
    pub normalized_extension: String,
    pub poll_interval_ms: u64,
    pub sid_hash: SidHashAlgorithm,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Build configuration from process environment variables only
    pub fn from_env() -> anyhow::Result<Self> {
        let sid_hash = match std::env::var("MWT_SID_HASH") {
            Ok(value) => value.parse()?,
            Err(_) => SidHashAlgorithm::default(),
        };

        let config = Config {
            inbox: InboxConfig {
                root: std::env::var("MWT_INBOX_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_INBOX_DIR)),
                raw_extension: std::env::var("MWT_RAW_EXTENSION")
                    .map(|e| normalize_extension(&e))
                    .unwrap_or_else(|_| DEFAULT_RAW_EXTENSION.to_string()),
                normalized_extension: std::env::var("MWT_NORMALIZED_EXTENSION")
                    .map(|e| normalize_extension(&e))
                    .unwrap_or_else(|_| DEFAULT_NORMALIZED_EXTENSION.to_string()),
                poll_interval_ms: env_or("MWT_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
                sid_hash,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or("DB_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DB_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DB_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.inbox.raw_extension.is_empty() || self.inbox.normalized_extension.is_empty() {
            anyhow::bail!("Raw and normalized file extensions cannot be empty");
        }

        if self
            .inbox
            .raw_extension
            .eq_ignore_ascii_case(&self.inbox.normalized_extension)
        {
            anyhow::bail!(
                "Raw and normalized extensions must differ (both are '{}')",
                self.inbox.raw_extension
            );
        }

        if self.inbox.poll_interval_ms == 0 {
            anyhow::bail!("Poll interval must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inbox: InboxConfig::default(),
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
        }
    }
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_INBOX_DIR),
            raw_extension: DEFAULT_RAW_EXTENSION.to_string(),
            normalized_extension: DEFAULT_NORMALIZED_EXTENSION.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            sid_hash: SidHashAlgorithm::default(),
        }
    }
}

/// Accept ".txt", "txt" or "TXT"
fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}
