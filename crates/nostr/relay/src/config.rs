//! Relay store configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
    /// Maximum number of reader connections
    pub max_reader_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("relay.db"),
            max_reader_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database: DatabaseConfig,
    /// Capacity of the bounded queue in front of the writer thread
    pub queue_capacity: usize,
    /// Per-filter row cap when a filter has no `limit`
    pub default_limit: usize,
    /// Largest `limit` a filter may ask for
    pub max_limit: usize,
    pub submit_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            queue_capacity: 256,
            default_limit: 500,
            max_limit: 5000,
            submit_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Store rooted at `path` with default settings.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseConfig {
                path: path.into(),
                ..DatabaseConfig::default()
            },
            ..Self::default()
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("RELAY_DB_PATH") {
            config.database.path = PathBuf::from(path);
        }

        if let Some(readers) = env_parse::<u32>("RELAY_MAX_READERS") {
            config.database.max_reader_connections = readers.max(1);
        }

        if let Some(capacity) = env_parse::<usize>("RELAY_QUEUE_CAPACITY") {
            config.queue_capacity = capacity.max(1);
        }

        if let Some(limit) = env_parse::<usize>("RELAY_DEFAULT_LIMIT") {
            config.default_limit = limit;
        }

        if let Some(limit) = env_parse::<usize>("RELAY_MAX_LIMIT") {
            config.max_limit = limit;
        }

        if let Some(ms) = env_parse::<u64>("RELAY_SUBMIT_TIMEOUT_MS") {
            config.submit_timeout = Duration::from_millis(ms);
        }

        // default_limit never exceeds max_limit.
        config.default_limit = config.default_limit.min(config.max_limit);
        config
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", name, raw);
            None
        }
    }
}
