//! Configuration loading from environment.

use std::env;

use chrono::Duration;

use provider_client::ProviderConfig;
use provider_repo::StoreConfig;
use provider_types::domain::{DEFAULT_IDEMPOTENCY_TTL_SECS, MAX_IDEMPOTENCY_TTL_SECS};

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub idempotency_ttl: Duration,
    pub provider: ProviderConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = text("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("PORT must be a port number: {}", e))?;

        let ttl_secs = match text("IDEMPOTENCY_TTL_SECONDS") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(secs) if secs > 0 && secs <= MAX_IDEMPOTENCY_TTL_SECS => secs,
                _ => {
                    tracing::warn!(value = %raw, "invalid IDEMPOTENCY_TTL_SECONDS, using default");
                    DEFAULT_IDEMPOTENCY_TTL_SECS
                }
            },
            None => DEFAULT_IDEMPOTENCY_TTL_SECS,
        };

        Ok(Self {
            port,
            database_url: text("DATABASE_URL"),
            redis_url: text("IDEMPOTENCY_REDIS_URL").or_else(|| text("REDIS_URL")),
            idempotency_ttl: Duration::seconds(ttl_secs),
            provider: ProviderConfig::from_lookup(&get),
        })
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url.clone(),
            redis_url: self.redis_url.clone(),
            ttl: self.idempotency_ttl,
        }
    }
}
