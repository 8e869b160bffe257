//! Database row types shared by the SQLite and PostgreSQL adapters.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use provider_types::{IdempotencyKey, IdempotencyRecord, RepoError};

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs
// ─────────────────────────────────────────────────────────────────────────────

/// Idempotency row. Timestamps are epoch milliseconds so both engines agree.
#[derive(Debug, FromRow)]
pub struct DbIdempotencyRecord {
    pub idem_key: String,
    pub route: String,
    pub method: String,
    pub body_hash: String,
    pub response_payload: String,
    pub expires_at: i64,
}

impl DbIdempotencyRecord {
    pub fn into_domain(self) -> Result<IdempotencyRecord, RepoError> {
        let expires_at = from_millis(self.expires_at)?;
        Ok(IdempotencyRecord {
            key: IdempotencyKey {
                key: self.idem_key,
                route: self.route,
                method: self.method,
                body_hash: self.body_hash,
            },
            response_payload: self.response_payload,
            expires_at,
        })
    }
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>, RepoError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| RepoError::Serialization(format!("timestamp out of range: {}", ms)))
}
