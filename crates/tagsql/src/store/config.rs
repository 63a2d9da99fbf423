use crate::error::{OrmError, OrmResult};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Configuration for [`Store`](super::Store).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Postgres connection URL.
    pub database_url: String,
    /// Timeout for contexts and transactions. Read from `timeout_secs`.
    #[serde(rename = "timeout_secs", deserialize_with = "duration_from_secs")]
    pub timeout: Duration,
    /// Extra attempts made when checking out a connection fails.
    pub retry_count: u32,
    /// Pool size.
    pub max_connections: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            timeout: Duration::from_secs(30),
            retry_count: 0,
            max_connections: 16,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with defaults.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Read `DATABASE_URL`, `TAGSQL_TIMEOUT_SECS`, `TAGSQL_RETRY_COUNT` and
    /// `TAGSQL_MAX_CONNECTIONS`. Unset numeric variables keep their defaults.
    pub fn from_env() -> OrmResult<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| OrmError::Connection("DATABASE_URL is not set".to_string()))?;
        let mut config = Self::new(database_url);

        if let Some(secs) = env_number::<u64>("TAGSQL_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = env_number("TAGSQL_RETRY_COUNT")? {
            config.retry_count = retries;
        }
        if let Some(max) = env_number("TAGSQL_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        Ok(config)
    }

    /// Set the context/transaction timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of checkout retries.
    pub fn retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }

    /// Set the pool size.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> OrmResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| OrmError::validation(format!("{key} must be a number, got '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn duration_from_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}
