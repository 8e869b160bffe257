//! # Provider Repository
//!
//! Idempotency tiers (adapters implementing the `IdempotencyBackend` port) and
//! the layered [`IdempotencyStore`] composing them.
//!
//! Lookup order is volatile (Redis), then durable (SQLite or PostgreSQL), then
//! the in-process fallback. Writes go to every configured tier. A failing tier
//! is reported and skipped; it never fails the request.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use provider_types::domain::default_ttl;
use provider_types::{Clock, IdempotencyBackend, IdempotencyKey, IdempotencyRecord, SystemClock};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "redis")]
pub mod redis_cache;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "postgres", feature = "sqlite"))]
mod types;

#[cfg(test)]
mod store_tests;

pub use memory::MemoryBackend;
#[cfg(feature = "postgres")]
pub use postgres::PostgresIdempotencyRepo;
#[cfg(feature = "redis")]
pub use redis_cache::RedisBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteIdempotencyRepo;

// ─────────────────────────────────────────────────────────────────────────────
// Tier outcomes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierOutcome {
    Hit,
    Miss,
    Written,
    /// Not consulted because an earlier tier answered.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierReport {
    pub tier: &'static str,
    pub outcome: TierOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupResult {
    pub payload: Option<String>,
    pub tiers: Vec<TierReport>,
}

impl LookupResult {
    pub fn is_hit(&self) -> bool {
        self.payload.is_some()
    }

    /// Name of the tier that answered, if any.
    pub fn hit_tier(&self) -> Option<&'static str> {
        self.tiers
            .iter()
            .find(|r| r.outcome == TierOutcome::Hit)
            .map(|r| r.tier)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreReport {
    pub tiers: Vec<TierReport>,
}

impl StoreReport {
    pub fn written(&self) -> usize {
        self.tiers
            .iter()
            .filter(|r| r.outcome == TierOutcome::Written)
            .count()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Layered store
// ─────────────────────────────────────────────────────────────────────────────

pub struct IdempotencyStore {
    volatile: Option<Arc<dyn IdempotencyBackend>>,
    durable: Option<Arc<dyn IdempotencyBackend>>,
    fallback: Arc<dyn IdempotencyBackend>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdempotencyStore {
    /// A store backed only by the in-process tier.
    pub fn new() -> Self {
        Self {
            volatile: None,
            durable: None,
            fallback: Arc::new(MemoryBackend::new()),
            ttl: default_ttl(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_volatile(mut self, tier: Arc<dyn IdempotencyBackend>) -> Self {
        self.volatile = Some(tier);
        self
    }

    pub fn with_durable(mut self, tier: Arc<dyn IdempotencyBackend>) -> Self {
        self.durable = Some(tier);
        self
    }

    pub fn with_fallback(mut self, tier: Arc<dyn IdempotencyBackend>) -> Self {
        self.fallback = tier;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Names of the configured tiers, in lookup order.
    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers().map(|t| t.name()).collect()
    }

    fn tiers(&self) -> impl Iterator<Item = &Arc<dyn IdempotencyBackend>> {
        self.volatile
            .iter()
            .chain(self.durable.iter())
            .chain(std::iter::once(&self.fallback))
    }

    /// Returns the stored payload from the first tier that has a live record.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn lookup(&self, key: &IdempotencyKey) -> LookupResult {
        let now = self.clock.now();
        let mut result = LookupResult::default();

        for tier in self.tiers() {
            if result.payload.is_some() {
                result.tiers.push(TierReport {
                    tier: tier.name(),
                    outcome: TierOutcome::Skipped,
                });
                continue;
            }

            let outcome = match tier.fetch(key, now).await {
                Ok(Some(payload)) => {
                    result.payload = Some(payload);
                    TierOutcome::Hit
                }
                Ok(None) => TierOutcome::Miss,
                Err(e) => {
                    warn!(tier = tier.name(), error = %e, "idempotency lookup failed, skipping tier");
                    TierOutcome::Failed(e.to_string())
                }
            };
            result.tiers.push(TierReport {
                tier: tier.name(),
                outcome,
            });
        }

        debug!(hit = ?result.hit_tier(), "idempotency lookup");
        result
    }

    /// Writes the payload to every tier with the configured TTL.
    #[tracing::instrument(skip(self, payload), fields(key = %key))]
    pub async fn store(&self, key: &IdempotencyKey, payload: &str) -> StoreReport {
        let now = self.clock.now();
        let record = IdempotencyRecord::new(key.clone(), payload.to_string(), now, self.ttl);
        let mut report = StoreReport::default();

        for tier in self.tiers() {
            let outcome = match tier.save(&record, now).await {
                Ok(()) => TierOutcome::Written,
                Err(e) => {
                    warn!(tier = tier.name(), error = %e, "idempotency write failed, skipping tier");
                    TierOutcome::Failed(e.to_string())
                }
            };
            report.tiers.push(TierReport {
                tier: tier.name(),
                outcome,
            });
        }

        report
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Construction from configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            ttl: default_ttl(),
        }
    }
}

/// Build the layered store from configuration.
///
/// Tiers that cannot be reached at startup are left out with a warning; the
/// in-process tier is always present.
///
/// # Examples
///
/// ```ignore
/// let store = build_store(&StoreConfig {
///     database_url: Some("sqlite://data/idempotency.db".into()),
///     redis_url: Some("redis://127.0.0.1:6379/0".into()),
///     ..Default::default()
/// })
/// .await;
/// ```
pub async fn build_store(config: &StoreConfig) -> IdempotencyStore {
    let mut store = IdempotencyStore::new().with_ttl(config.ttl);

    if let Some(url) = config.redis_url.as_deref().filter(|u| !u.is_empty()) {
        if let Some(tier) = connect_volatile(url).await {
            store = store.with_volatile(tier);
        }
    }

    if let Some(url) = config.database_url.as_deref().filter(|u| !u.is_empty()) {
        if let Some(tier) = connect_durable(url).await {
            store = store.with_durable(tier);
        }
    }

    info!(tiers = ?store.tier_names(), ttl_secs = store.ttl.num_seconds(), "idempotency store ready");
    store
}

#[cfg(feature = "redis")]
async fn connect_volatile(url: &str) -> Option<Arc<dyn IdempotencyBackend>> {
    match RedisBackend::new(url).await {
        Ok(tier) => Some(Arc::new(tier)),
        Err(e) => {
            warn!(error = %e, "redis tier unavailable");
            None
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_volatile(_url: &str) -> Option<Arc<dyn IdempotencyBackend>> {
    warn!("redis url configured but the `redis` feature is disabled");
    None
}

async fn connect_durable(url: &str) -> Option<Arc<dyn IdempotencyBackend>> {
    if url.starts_with("sqlite:") {
        return connect_sqlite(url).await;
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        return connect_postgres(url).await;
    }
    warn!("unsupported database url scheme, durable tier disabled");
    None
}

#[cfg(feature = "sqlite")]
async fn connect_sqlite(url: &str) -> Option<Arc<dyn IdempotencyBackend>> {
    match SqliteIdempotencyRepo::new(url).await {
        Ok(tier) => Some(Arc::new(tier)),
        Err(e) => {
            warn!(error = %e, "sqlite tier unavailable");
            None
        }
    }
}

#[cfg(not(feature = "sqlite"))]
async fn connect_sqlite(_url: &str) -> Option<Arc<dyn IdempotencyBackend>> {
    warn!("sqlite url configured but the `sqlite` feature is disabled");
    None
}

#[cfg(feature = "postgres")]
async fn connect_postgres(url: &str) -> Option<Arc<dyn IdempotencyBackend>> {
    match PostgresIdempotencyRepo::new(url).await {
        Ok(tier) => Some(Arc::new(tier)),
        Err(e) => {
            warn!(error = %e, "postgres tier unavailable");
            None
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_url: &str) -> Option<Arc<dyn IdempotencyBackend>> {
    warn!("postgres url configured but the `postgres` feature is disabled");
    None
}
