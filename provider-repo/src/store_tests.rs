//! Layered idempotency store tests.

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    use provider_types::{Clock, IdempotencyBackend, IdempotencyKey, IdempotencyRecord, RepoError};

    use crate::{IdempotencyStore, MemoryBackend, TierOutcome, TierReport};

    /// A clock that only moves when told to.
    pub(crate) struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub(crate) fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        pub(crate) fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    /// A tier that is always down.
    #[derive(Default)]
    struct BrokenTier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdempotencyBackend for BrokenTier {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn fetch(
            &self,
            _key: &IdempotencyKey,
            _now: DateTime<Utc>,
        ) -> Result<Option<String>, RepoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RepoError::Cache("connection refused".into()))
        }

        async fn save(
            &self,
            _record: &IdempotencyRecord,
            _now: DateTime<Utc>,
        ) -> Result<(), RepoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RepoError::Cache("connection refused".into()))
        }
    }

    /// A second in-process tier with its own name so reports can tell tiers apart.
    #[derive(Default)]
    struct NamedTier {
        inner: MemoryBackend,
    }

    #[async_trait]
    impl IdempotencyBackend for NamedTier {
        fn name(&self) -> &'static str {
            "durable"
        }

        async fn fetch(
            &self,
            key: &IdempotencyKey,
            now: DateTime<Utc>,
        ) -> Result<Option<String>, RepoError> {
            self.inner.fetch(key, now).await
        }

        async fn save(
            &self,
            record: &IdempotencyRecord,
            now: DateTime<Utc>,
        ) -> Result<(), RepoError> {
            self.inner.save(record, now).await
        }
    }

    fn key() -> IdempotencyKey {
        IdempotencyKey::new(
            "K1",
            "/payments/gateway/create",
            "POST",
            br#"{"orderId":"O1","amount":9.99}"#,
        )
    }

    const PAYLOAD: &str = r#"{"checkout_url":"https://pay.example/c/1","payment_id":"P1"}"#;

    #[tokio::test]
    async fn test_lookup_within_ttl_returns_identical_payload() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = IdempotencyStore::new()
            .with_ttl(Duration::seconds(60))
            .with_clock(clock.clone());

        assert!(!store.lookup(&key()).await.is_hit());
        store.store(&key(), PAYLOAD).await;

        clock.advance(Duration::seconds(59));
        let result = store.lookup(&key()).await;
        assert_eq!(result.payload.as_deref(), Some(PAYLOAD));
        assert_eq!(result.hit_tier(), Some("memory"));
    }

    #[tokio::test]
    async fn test_lookup_after_ttl_is_a_miss() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = IdempotencyStore::new()
            .with_ttl(Duration::seconds(60))
            .with_clock(clock.clone());

        store.store(&key(), PAYLOAD).await;
        clock.advance(Duration::seconds(60));

        let result = store.lookup(&key()).await;
        assert_eq!(result.payload, None);
        assert_eq!(
            result.tiers,
            vec![TierReport {
                tier: "memory",
                outcome: TierOutcome::Miss
            }]
        );
    }

    #[tokio::test]
    async fn test_huge_ttl_is_stored_without_overflow() {
        let store = IdempotencyStore::new().with_ttl(Duration::seconds(10_000_000_000_000));

        let report = store.store(&key(), PAYLOAD).await;
        assert_eq!(report.written(), 1);
        assert_eq!(store.lookup(&key()).await.payload.as_deref(), Some(PAYLOAD));
    }

    #[tokio::test]
    async fn test_different_body_is_a_different_operation() {
        let store = IdempotencyStore::new();
        store.store(&key(), PAYLOAD).await;

        let other = IdempotencyKey::new(
            "K1",
            "/payments/gateway/create",
            "POST",
            br#"{"orderId":"O1","amount":19.99}"#,
        );
        assert!(!store.lookup(&other).await.is_hit());
    }

    #[tokio::test]
    async fn test_failing_volatile_tier_is_skipped() {
        let broken = Arc::new(BrokenTier::default());
        let store = IdempotencyStore::new().with_volatile(broken.clone());

        let written = store.store(&key(), PAYLOAD).await;
        assert_eq!(written.written(), 1);
        assert!(matches!(written.tiers[0].outcome, TierOutcome::Failed(_)));
        assert_eq!(written.tiers[1].outcome, TierOutcome::Written);

        let result = store.lookup(&key()).await;
        assert_eq!(result.payload.as_deref(), Some(PAYLOAD));
        assert_eq!(result.tiers[0].tier, "broken");
        assert!(matches!(result.tiers[0].outcome, TierOutcome::Failed(_)));
        assert_eq!(result.hit_tier(), Some("memory"));
        assert_eq!(broken.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tiers_after_a_hit_are_skipped() {
        let durable = Arc::new(NamedTier::default());
        let store = IdempotencyStore::new().with_durable(durable.clone());

        let report = store.store(&key(), PAYLOAD).await;
        assert_eq!(report.written(), 2);

        let result = store.lookup(&key()).await;
        assert_eq!(result.hit_tier(), Some("durable"));
        assert_eq!(
            result.tiers,
            vec![
                TierReport {
                    tier: "durable",
                    outcome: TierOutcome::Hit
                },
                TierReport {
                    tier: "memory",
                    outcome: TierOutcome::Skipped
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_durable_record_survives_a_fresh_fallback() {
        let durable: Arc<NamedTier> = Arc::new(NamedTier::default());
        IdempotencyStore::new()
            .with_durable(durable.clone())
            .store(&key(), PAYLOAD)
            .await;

        let restarted = IdempotencyStore::new().with_durable(durable);
        let result = restarted.lookup(&key()).await;
        assert_eq!(result.payload.as_deref(), Some(PAYLOAD));
    }

    #[tokio::test]
    async fn test_tier_names_in_lookup_order() {
        let store = IdempotencyStore::new()
            .with_durable(Arc::new(NamedTier::default()))
            .with_volatile(Arc::new(BrokenTier::default()));
        assert_eq!(store.tier_names(), vec!["broken", "durable", "memory"]);
    }

    #[tokio::test]
    async fn test_build_store_without_urls_is_memory_only() {
        let store = crate::build_store(&crate::StoreConfig::default()).await;
        assert_eq!(store.tier_names(), vec!["memory"]);
        assert_eq!(store.ttl(), Duration::seconds(86_400));
    }

    #[tokio::test]
    async fn test_build_store_drops_unknown_scheme() {
        let store = crate::build_store(&crate::StoreConfig {
            database_url: Some("mysql://localhost/db".into()),
            ..Default::default()
        })
        .await;
        assert_eq!(store.tier_names(), vec!["memory"]);
    }
}
