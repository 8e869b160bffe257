//! Idempotency keys and cached responses.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::signed_request::body_hash;

/// Request header carrying the client-supplied key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

pub const DEFAULT_IDEMPOTENCY_TTL_SECS: i64 = 86_400;

/// Longest TTL a deployment may configure: ten years.
pub const MAX_IDEMPOTENCY_TTL_SECS: i64 = 10 * 365 * 86_400;

pub fn default_ttl() -> Duration {
    Duration::seconds(DEFAULT_IDEMPOTENCY_TTL_SECS)
}

/// Identity of an idempotent operation: `(key, route, method, body_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub key: String,
    pub route: String,
    pub method: String,
    pub body_hash: String,
}

impl IdempotencyKey {
    /// Fingerprints the exact serialized request body.
    pub fn new(key: &str, route: &str, method: &str, body: &[u8]) -> Self {
        Self {
            key: key.to_string(),
            route: route.to_string(),
            method: method.to_ascii_uppercase(),
            body_hash: body_hash(body),
        }
    }

    /// `idem:<key>:<route>:<method>:<body_hash>`
    pub fn cache_key(&self) -> String {
        format!(
            "idem:{}:{}:{}:{}",
            self.key, self.route, self.method, self.body_hash
        )
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.method, self.route, self.key)
    }
}

/// A stored response. Expired records are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    /// Serialized response, replayed byte for byte.
    pub response_payload: String,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(
        key: IdempotencyKey,
        response_payload: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            key,
            response_payload,
            expires_at: now
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Seconds left to live, never below one.
    pub fn remaining_ttl_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(1) as u64
    }
}
