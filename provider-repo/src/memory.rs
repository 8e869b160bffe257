//! In-process idempotency tier.
//!
//! Always available. Survives tier outages but not restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use provider_types::{IdempotencyBackend, IdempotencyKey, IdempotencyRecord, RepoError};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: DashMap<String, IdempotencyRecord>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops every record expired at `now`; returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        before.saturating_sub(self.records.len())
    }
}

#[async_trait]
impl IdempotencyBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, RepoError> {
        let cache_key = key.cache_key();
        let payload = match self.records.get(&cache_key) {
            Some(record) if !record.is_expired(now) => Some(record.response_payload.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if payload.is_none() {
            self.records.remove_if(&cache_key, |_, record| record.is_expired(now));
        }
        Ok(payload)
    }

    async fn save(
        &self,
        record: &IdempotencyRecord,
        _now: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        self.records.insert(record.key.cache_key(), record.clone());
        Ok(())
    }
}
