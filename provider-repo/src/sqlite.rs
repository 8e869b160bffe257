//! SQLite idempotency tier.
#![allow(clippy::collapsible_if)]

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use provider_types::{IdempotencyBackend, IdempotencyKey, IdempotencyRecord, RepoError};

use crate::types::DbIdempotencyRecord;

const MIGRATIONS: [(&str, &str); 2] = [
    (
        "0001",
        include_str!("../migrations/0001_create_idempotency_records.sql"),
    ),
    (
        "0002",
        include_str!("../migrations/0002_index_idempotency_expiry.sql"),
    ),
];

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

pub struct SqliteIdempotencyRepo {
    pool: SqlitePool,
}

impl SqliteIdempotencyRepo {
    /// Connects and creates the schema if needed.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory database sees its own empty database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let repo = Self { pool };
        repo.create_schema().await?;
        Ok(repo)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_schema(&self) -> Result<(), RepoError> {
        for (name, ddl) in MIGRATIONS {
            for statement in ddl.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| RepoError::Database(format!("migration {}: {}", name, e)))?;
            }
        }
        Ok(())
    }

    /// Deletes expired rows; returns how many were removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    /// Reads the full row, ignoring expiry.
    pub async fn find(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, RepoError> {
        let row: Option<DbIdempotencyRecord> = sqlx::query_as(
            r#"
            SELECT idem_key, route, method, body_hash, response_payload, expires_at
            FROM idempotency_records
            WHERE idem_key = ? AND route = ? AND method = ? AND body_hash = ?
            "#,
        )
        .bind(&key.key)
        .bind(&key.route)
        .bind(&key.method)
        .bind(&key.body_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbIdempotencyRecord::into_domain).transpose()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl IdempotencyBackend for SqliteIdempotencyRepo {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn fetch(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, RepoError> {
        let payload: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT response_payload
            FROM idempotency_records
            WHERE idem_key = ? AND route = ? AND method = ? AND body_hash = ?
              AND expires_at > ?
            "#,
        )
        .bind(&key.key)
        .bind(&key.route)
        .bind(&key.method)
        .bind(&key.body_hash)
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(payload.map(|(p,)| p))
    }

    async fn save(
        &self,
        record: &IdempotencyRecord,
        now: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_records
                (idem_key, route, method, body_hash, response_payload, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (idem_key, route, method, body_hash) DO UPDATE SET
                response_payload = excluded.response_payload,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#,
        )
        .bind(&record.key.key)
        .bind(&record.key.route)
        .bind(&record.key.method)
        .bind(&record.key.body_hash)
        .bind(&record.response_payload)
        .bind(record.expires_at.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if let Err(e) = self.purge_expired(now).await {
            tracing::warn!(error = %e, "failed to purge expired idempotency rows");
        }
        Ok(())
    }
}
