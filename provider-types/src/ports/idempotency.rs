//! Idempotency tier port.
//!
//! Adapters (Redis, SQLite, Postgres, in-process) implement this trait.
//! The layered store composes them and never lets one tier's failure abort a request.

use chrono::{DateTime, Utc};

use crate::domain::{IdempotencyKey, IdempotencyRecord};
use crate::error::RepoError;

#[async_trait::async_trait]
pub trait IdempotencyBackend: Send + Sync {
    /// Short tier name used in logs and outcome reports.
    fn name(&self) -> &'static str;

    /// Returns the stored payload if a non-expired record exists at `now`.
    async fn fetch(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, RepoError>;

    /// Inserts or replaces the record for its key. `now` is the store's clock
    /// reading when the record was built.
    async fn save(
        &self,
        record: &IdempotencyRecord,
        now: DateTime<Utc>,
    ) -> Result<(), RepoError>;
}
