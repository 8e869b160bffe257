//! RSA2 canonical request representation.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Algorithm label carried in the `Authorization` header.
pub const SIGNATURE_ALGORITHM: &str = "RSA2";

/// `base64(sha256(body))`, used both for signatures and idempotency fingerprints.
pub fn body_hash(body: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(body))
}

/// The fields covered by a gateway signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: String,
    pub path: String,
    pub app_id: String,
    pub timestamp_ms: String,
    pub body_hash: String,
}

impl SignedRequest {
    /// Builds the request from raw parts, hashing `body`.
    ///
    /// Reads sign an empty body; writes sign the compact JSON they send.
    pub fn new(
        method: &str,
        path: &str,
        app_id: &str,
        timestamp_ms: impl Into<String>,
        body: &[u8],
    ) -> Self {
        Self::from_parts(method, path, app_id, timestamp_ms, body_hash(body))
    }

    pub fn from_parts(
        method: &str,
        path: &str,
        app_id: &str,
        timestamp_ms: impl Into<String>,
        body_hash: String,
    ) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            app_id: app_id.to_string(),
            timestamp_ms: timestamp_ms.into(),
            body_hash,
        }
    }

    /// `"{METHOD} {path}\n{app_id}\n{timestamp_ms}\n{body_hash}\n"`
    pub fn canonical_string(&self) -> String {
        format!(
            "{} {}\n{}\n{}\n{}\n",
            self.method, self.path, self.app_id, self.timestamp_ms, self.body_hash
        )
    }
}
