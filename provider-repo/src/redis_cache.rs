//! Redis idempotency tier.
//!
//! Payloads are stored under [`IdempotencyKey::cache_key`] with a server-side
//! TTL, so expiry is enforced by Redis rather than by the caller's clock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, RedisError, aio::ConnectionManager};

use provider_types::{IdempotencyBackend, IdempotencyKey, IdempotencyRecord, RepoError};

pub struct RedisBackend {
    connection: Arc<ConnectionManager>,
}

impl RedisBackend {
    /// Connects to `redis_url`, e.g. `redis://127.0.0.1:6379/0`.
    pub async fn new(redis_url: &str) -> Result<Self, RedisError> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection: Arc::new(connection),
        })
    }
}

#[async_trait]
impl IdempotencyBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn fetch(
        &self,
        key: &IdempotencyKey,
        _now: DateTime<Utc>,
    ) -> Result<Option<String>, RepoError> {
        let mut conn = (*self.connection).clone();
        let payload: Option<String> = conn
            .get(key.cache_key())
            .await
            .map_err(|e: RedisError| RepoError::Cache(e.to_string()))?;
        Ok(payload)
    }

    async fn save(
        &self,
        record: &IdempotencyRecord,
        now: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let mut conn = (*self.connection).clone();
        let ttl = record.remaining_ttl_secs(now);

        let _: () = conn
            .set_ex(record.key.cache_key(), &record.response_payload, ttl)
            .await
            .map_err(|e: RedisError| RepoError::Cache(e.to_string()))?;

        Ok(())
    }
}
