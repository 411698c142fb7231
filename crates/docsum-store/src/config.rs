//! Store configuration.

use std::time::Duration;

/// Default delay before a retried job becomes claimable again.
pub const DEFAULT_REQUEUE_DELAY_SECS: u64 = 30;

/// Persistence configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Postgres URL; the in-memory store is used when unset
    pub database_url: Option<String>,
    /// Pool size
    pub max_connections: u32,
    /// Pool acquire timeout
    pub acquire_timeout: Duration,
    /// Backoff applied by `fail` when a job is requeued
    pub requeue_delay: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            requeue_delay: Duration::from_secs(DEFAULT_REQUEUE_DELAY_SECS),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(5),
            acquire_timeout: Duration::from_secs(
                std::env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            requeue_delay: Duration::from_secs(
                std::env::var("QUEUE_REQUEUE_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_REQUEUE_DELAY_SECS),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("DATABASE_MAX_CONNECTIONS");
        std::env::remove_var("QUEUE_REQUEUE_DELAY_SECS");

        let config = StoreConfig::from_env();
        assert!(config.database_url.is_none());
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.requeue_delay, Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("DATABASE_URL", "  postgres://localhost/docsum  ");
        std::env::set_var("DATABASE_MAX_CONNECTIONS", "0");
        std::env::set_var("QUEUE_REQUEUE_DELAY_SECS", "5");

        let config = StoreConfig::from_env();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/docsum"));
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.requeue_delay, Duration::from_secs(5));

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("DATABASE_MAX_CONNECTIONS");
        std::env::remove_var("QUEUE_REQUEUE_DELAY_SECS");
    }
}
