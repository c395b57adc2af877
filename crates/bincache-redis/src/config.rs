//! Redis connection settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis connection pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379/0")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Wait, create and recycle timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("redis://")
            || self.url.starts_with("rediss://")
            || self.url.starts_with("redis+unix://")
            || self.url.starts_with("unix://"))
        {
            return Err(format!("unsupported Redis URL '{}'", self.url));
        }

        if self.pool_size == 0 {
            return Err("pool_size must be greater than 0".to_string());
        }

        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Pool configuration for `deadpool-redis`
    pub fn pool_config(&self) -> deadpool_redis::Config {
        let mut pool = deadpool_redis::PoolConfig::new(self.pool_size);
        pool.timeouts.wait = Some(self.timeout());
        pool.timeouts.create = Some(self.timeout());
        pool.timeouts.recycle = Some(self.timeout());

        let mut config = deadpool_redis::Config::from_url(&self.url);
        config.pool = Some(pool);
        config
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: RedisConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RedisConfig::default());
        assert_eq!(config.url, "redis://127.0.0.1:6379");
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_builder_and_validation() {
        let config = RedisConfig::new("redis://cache.internal:6380/2")
            .with_pool_size(32)
            .with_timeout(Duration::from_millis(250));
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout_ms, 250);

        assert!(RedisConfig::new("http://localhost").validate().is_err());
        assert!(RedisConfig::default().with_pool_size(0).validate().is_err());
        assert!(
            RedisConfig::default()
                .with_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_pool_config_carries_limits() {
        let config = RedisConfig::default().with_pool_size(4).pool_config();
        let pool = config.pool.unwrap();
        assert_eq!(pool.max_size, 4);
        assert_eq!(pool.timeouts.wait, Some(Duration::from_secs(5)));
    }
}
