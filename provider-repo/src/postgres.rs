//! PostgreSQL idempotency tier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use provider_types::{IdempotencyBackend, IdempotencyKey, IdempotencyRecord, RepoError};

use crate::types::DbIdempotencyRecord;

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

pub struct PostgresIdempotencyRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_idempotency_records.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_index_idempotency_expiry.sql"),
        "0002",
    )
    .await?;

    Ok(())
}

impl PostgresIdempotencyRepo {
    /// Connects and runs migrations.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= $1")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    pub async fn find(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, RepoError> {
        let row: Option<DbIdempotencyRecord> = sqlx::query_as(
            r#"
            SELECT idem_key, route, method, body_hash, response_payload, expires_at
            FROM idempotency_records
            WHERE idem_key = $1 AND route = $2 AND method = $3 AND body_hash = $4
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

#[async_trait]
impl IdempotencyBackend for PostgresIdempotencyRepo {
    fn name(&self) -> &'static str {
        "postgres"
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
            WHERE idem_key = $1 AND route = $2 AND method = $3 AND body_hash = $4
              AND expires_at > $5
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
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (idem_key, route, method, body_hash) DO UPDATE SET
                response_payload = EXCLUDED.response_payload,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
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
