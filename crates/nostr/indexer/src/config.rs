//! Indexer configuration

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Capacity of the bounded submission queue
    pub queue_capacity: usize,
    /// Capacity of the change broadcast channel; slow subscribers lag past it
    pub notify_capacity: usize,
    /// How long `submit` waits for queue space and for the writer's reply
    pub submit_timeout: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            notify_capacity: 1024,
            submit_timeout: Duration::from_secs(5),
        }
    }
}

impl IndexerConfig {
    /// Defaults overridden by `INDEXER_QUEUE_CAPACITY`, `INDEXER_NOTIFY_CAPACITY`
    /// and `INDEXER_SUBMIT_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(capacity) = env_parse::<usize>("INDEXER_QUEUE_CAPACITY") {
            config.queue_capacity = capacity.max(1);
        }

        if let Some(capacity) = env_parse::<usize>("INDEXER_NOTIFY_CAPACITY") {
            config.notify_capacity = capacity.max(1);
        }

        if let Some(ms) = env_parse::<u64>("INDEXER_SUBMIT_TIMEOUT_MS") {
            config.submit_timeout = Duration::from_millis(ms);
        }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexerConfig::default();
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.submit_timeout, Duration::from_secs(5));
    }
}
