//! Generic tiered resolution engine
//!
//! One [`ResolutionOrchestrator`] per domain executes:
//!
//! ```text
//! cache check ──hit──────────────────────────────▶ record
//!      │ miss
//!      ▼
//! tier 1 ──hit──▶ cache store ──▶ record
//!      │ miss / recoverable error
//!      ▼
//! tier 2 … tier N ──all miss──▶ NotFound (nothing cached)
//! ```
//!
//! Tiers run strictly in order; the first hit wins and is never merged with
//! data from other tiers. Datastore, external and cache failures are logged as
//! degraded tiers and treated as misses. Each tier call holds a permit from a
//! shared semaphore and carries its own timeout.

pub mod single_flight;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cache::{CacheKeyPolicy, CacheStore};
use crate::types::{AttributeRecord, Domain, LookupRequest, TierError, TierKind, TierResolver};
use crate::units::ConversionError;
use single_flight::KeyedLocks;

/// Why a single ingredient produced no record
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// No tier produced data
    #[error("No {domain} data found for '{name}'")]
    NotFound { domain: Domain, name: String },

    /// A tier found data but the quantity cannot be converted to grams
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Domain-specific cache settings
#[derive(Debug, Clone, Copy)]
pub struct DomainConfig {
    pub domain: Domain,
    pub key_policy: CacheKeyPolicy,
    pub ttl: Duration,
}

/// Limits shared by every orchestrator in the process
#[derive(Clone)]
pub struct ResolutionLimits {
    /// Bounds simultaneous datastore/external calls across all domains
    pub permits: Arc<Semaphore>,
    pub datastore_timeout: Duration,
    pub external_timeout: Duration,
    pub single_flight: bool,
}

impl ResolutionLimits {
    pub fn new(max_concurrent: usize, datastore_timeout: Duration, external_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            datastore_timeout,
            external_timeout,
            single_flight: true,
        }
    }

    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    fn timeout_for(&self, kind: TierKind) -> Duration {
        match kind {
            TierKind::Datastore => self.datastore_timeout,
            TierKind::External | TierKind::Inference => self.external_timeout,
        }
    }
}

/// Ordered tier sequence plus read-through cache for one domain
pub struct ResolutionOrchestrator<T> {
    config: DomainConfig,
    tiers: Vec<Arc<dyn TierResolver<T>>>,
    cache: Option<Arc<dyn CacheStore>>,
    limits: ResolutionLimits,
    in_flight: KeyedLocks,
}

impl<T> ResolutionOrchestrator<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Build an orchestrator, validating the tier table
    ///
    /// # Errors
    /// `Error::Config` when there are no tiers, tier numbers decrease,
    /// a confidence lies outside [0, 1], or confidence increases with tier number.
    pub fn new(
        config: DomainConfig,
        tiers: Vec<Arc<dyn TierResolver<T>>>,
        cache: Option<Arc<dyn CacheStore>>,
        limits: ResolutionLimits,
    ) -> larder_common::Result<Self> {
        validate_tiers(config.domain, &tiers)?;
        Ok(Self {
            config,
            tiers,
            cache,
            limits,
            in_flight: KeyedLocks::new(),
        })
    }

    pub fn domain(&self) -> Domain {
        self.config.domain
    }

    /// `(tier, confidence, resolver name)` for each configured tier
    pub fn tier_table(&self) -> Vec<(u8, f64, &'static str)> {
        self.tiers
            .iter()
            .map(|t| (t.tier(), t.confidence(), t.name()))
            .collect()
    }

    /// Resolve one ingredient
    ///
    /// # Errors
    /// - `ResolutionError::NotFound` when every tier misses
    /// - `ResolutionError::Conversion` when a tier has data but the requested
    ///   quantity cannot be expressed in grams
    pub async fn resolve(&self, request: &LookupRequest) -> Result<AttributeRecord<T>, ResolutionError> {
        let domain = self.config.domain;
        let key = self
            .cache
            .as_ref()
            .and_then(|_| self.config.key_policy.key_for(domain, request));

        if let Some(key) = key.as_deref() {
            if let Some(record) = self.cache_get(key).await {
                debug!(domain = %domain, key, tier = record.tier, "Cache hit");
                return Ok(record);
            }
        }

        let _flight = match key.as_deref() {
            Some(key) if self.limits.single_flight => {
                let guard = self.in_flight.lock(key).await;
                // A concurrent resolution of this key may have finished while we waited
                if let Some(record) = self.cache_get(key).await {
                    debug!(domain = %domain, key, "Resolved by concurrent request");
                    return Ok(record);
                }
                Some(guard)
            }
            _ => None,
        };

        for tier in &self.tiers {
            match self.run_tier(tier.as_ref(), request).await {
                Ok(Some(hit)) => {
                    let record = AttributeRecord {
                        payload: hit.payload,
                        tier: tier.tier(),
                        confidence: tier.confidence(),
                        data_source: hit.data_source,
                        resolved_at: Utc::now(),
                    };
                    debug!(
                        domain = %domain,
                        ingredient = %request.name,
                        tier = record.tier,
                        resolver = tier.name(),
                        confidence = record.confidence,
                        "Resolved"
                    );
                    if let Some(key) = key.as_deref() {
                        self.cache_put(key, &record).await;
                    }
                    return Ok(record);
                }
                Ok(None) => {
                    debug!(
                        domain = %domain,
                        ingredient = %request.name,
                        tier = tier.tier(),
                        resolver = tier.name(),
                        "Tier miss"
                    );
                }
                Err(TierError::Conversion(e)) => return Err(ResolutionError::Conversion(e)),
                Err(e) => {
                    warn!(
                        domain = %domain,
                        ingredient = %request.name,
                        tier = tier.tier(),
                        resolver = tier.name(),
                        error = %e,
                        "Degraded tier, treating as miss"
                    );
                }
            }
        }

        debug!(domain = %domain, ingredient = %request.name, "Not found in any tier");
        Err(ResolutionError::NotFound {
            domain,
            name: request.name.clone(),
        })
    }

    async fn run_tier(
        &self,
        tier: &dyn TierResolver<T>,
        request: &LookupRequest,
    ) -> Result<Option<crate::types::TierHit<T>>, TierError> {
        let _permit = self.limits.permits.acquire().await.map_err(|_| {
            TierError::Datastore(larder_common::Error::Internal("lookup limiter closed".to_string()))
        })?;

        let timeout = self.limits.timeout_for(tier.kind());
        match tokio::time::timeout(timeout, tier.resolve(request)).await {
            Ok(result) => result,
            Err(_) => Err(TierError::Timeout(timeout)),
        }
    }

    async fn cache_get(&self, key: &str) -> Option<AttributeRecord<T>> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(key, error = %e, "Discarding undecodable cache entry");
                    if let Err(e) = cache.delete(key).await {
                        warn!(key, error = %e, "Cache delete failed");
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, resolving from sources");
                None
            }
        }
    }

    async fn cache_put(&self, key: &str, record: &AttributeRecord<T>) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "Cannot encode record for cache");
                return;
            }
        };
        if let Err(e) = cache.set(key, &json, self.config.ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }
}

fn validate_tiers<T>(domain: Domain, tiers: &[Arc<dyn TierResolver<T>>]) -> larder_common::Result<()> {
    use larder_common::Error;

    if tiers.is_empty() {
        return Err(Error::Config(format!("{} resolution has no tiers", domain)));
    }

    for tier in tiers {
        let c = tier.confidence();
        if !(0.0..=1.0).contains(&c) {
            return Err(Error::Config(format!(
                "{} tier {} ({}) confidence {} outside [0, 1]",
                domain,
                tier.tier(),
                tier.name(),
                c
            )));
        }
    }

    for pair in tiers.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.tier() < prev.tier() {
            return Err(Error::Config(format!(
                "{} tiers out of order: {} ({}) after {} ({})",
                domain,
                next.tier(),
                next.name(),
                prev.tier(),
                prev.name()
            )));
        }
        if next.confidence() > prev.confidence() {
            return Err(Error::Config(format!(
                "{} tier {} ({}) confidence {} exceeds tier {} ({}) confidence {}",
                domain,
                next.tier(),
                next.name(),
                next.confidence(),
                prev.tier(),
                prev.name(),
                prev.confidence()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryCache};
    use crate::types::mock::MockTier;
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;

    fn limits() -> ResolutionLimits {
        ResolutionLimits::new(4, Duration::from_millis(200), Duration::from_millis(200))
    }

    fn config() -> DomainConfig {
        DomainConfig {
            domain: Domain::Allergen,
            key_policy: CacheKeyPolicy::ByName,
            ttl: Duration::from_secs(60),
        }
    }

    fn orchestrator(
        tiers: Vec<Arc<dyn TierResolver<String>>>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> ResolutionOrchestrator<String> {
        ResolutionOrchestrator::new(config(), tiers, cache, limits()).unwrap()
    }

    struct BrokenCache;

    #[async_trait]
    impl CacheStore for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("connection reset".to_string()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection reset".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection reset".to_string()))
        }
        async fn purge_expired(&self) -> Result<u64, CacheError> {
            Err(CacheError::Backend("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_first_hit_wins() {
        let t1 = MockTier::hit(1, 1.0, "exact".to_string());
        let t2 = MockTier::hit(2, 0.9, "fuzzy".to_string());
        let t2_calls = t2.call_counter();
        let orch = orchestrator(vec![Arc::new(t1), Arc::new(t2)], None);

        let record = orch.resolve(&LookupRequest::by_name("milk")).await.unwrap();
        assert_eq!(record.payload, "exact");
        assert_eq!(record.tier, 1);
        assert_eq!(record.confidence, 1.0);
        assert_eq!(t2_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_through_misses_and_errors() {
        let orch = orchestrator(
            vec![
                Arc::new(MockTier::<String>::miss(1, 1.0)),
                Arc::new(MockTier::<String>::failing(2, 0.95)),
                Arc::new(MockTier::hit(3, 0.95, "external".to_string())),
            ],
            None,
        );

        let record = orch.resolve(&LookupRequest::by_name("wheat flour")).await.unwrap();
        assert_eq!(record.payload, "external");
        assert_eq!(record.tier, 3);
        assert_eq!(record.confidence, 0.95);
    }

    #[tokio::test]
    async fn test_timeout_is_a_miss() {
        let slow = MockTier::hit(1, 1.0, "slow".to_string()).with_delay(Duration::from_secs(5));
        let orch = orchestrator(
            vec![Arc::new(slow), Arc::new(MockTier::hit(2, 0.6, "fallback".to_string()))],
            None,
        );

        let record = orch.resolve(&LookupRequest::by_name("rice")).await.unwrap();
        assert_eq!(record.payload, "fallback");
        assert_eq!(record.tier, 2);
    }

    #[tokio::test]
    async fn test_not_found_is_never_cached() {
        let cache = Arc::new(MemoryCache::new());
        let t1 = MockTier::<String>::miss(1, 1.0);
        let backfill = t1.payload_handle();
        let orch = orchestrator(vec![Arc::new(t1)], Some(cache.clone() as Arc<dyn CacheStore>));

        let request = LookupRequest::by_name("unicorn-meat");
        assert!(matches!(
            orch.resolve(&request).await,
            Err(ResolutionError::NotFound { .. })
        ));
        assert!(cache.is_empty().await);

        *backfill.lock().unwrap() = Some("backfilled".to_string());
        let record = orch.resolve(&request).await.unwrap();
        assert_eq!(record.payload, "backfilled");
    }

    #[tokio::test]
    async fn test_second_resolution_is_served_from_cache() {
        let cache = Arc::new(MemoryCache::new());
        let t1 = MockTier::hit(1, 1.0, "exact".to_string());
        let calls = t1.call_counter();
        let orch = orchestrator(vec![Arc::new(t1)], Some(cache as Arc<dyn CacheStore>));

        let first = orch.resolve(&LookupRequest::by_name("Butter")).await.unwrap();
        let second = orch.resolve(&LookupRequest::by_name("  butter ")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_broken_cache_degrades_to_sources() {
        let orch = orchestrator(
            vec![Arc::new(MockTier::hit(1, 1.0, "exact".to_string()))],
            Some(Arc::new(BrokenCache)),
        );
        let record = orch.resolve(&LookupRequest::by_name("eggs")).await.unwrap();
        assert_eq!(record.payload, "exact");
    }

    #[tokio::test]
    async fn test_undecodable_cache_entry_is_replaced() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("allergen:eggs", "not json", Duration::from_secs(60)).await.unwrap();
        let orch = orchestrator(
            vec![Arc::new(MockTier::hit(1, 1.0, "exact".to_string()))],
            Some(cache.clone() as Arc<dyn CacheStore>),
        );

        let record = orch.resolve(&LookupRequest::by_name("eggs")).await.unwrap();
        assert_eq!(record.payload, "exact");
        let cached = cache.get("allergen:eggs").await.unwrap().unwrap();
        assert!(cached.contains("\"exact\""));
    }

    #[tokio::test]
    async fn test_single_flight_shares_one_resolution() {
        let cache = Arc::new(MemoryCache::new());
        let slow = MockTier::hit(1, 1.0, "exact".to_string()).with_delay(Duration::from_millis(50));
        let calls = slow.call_counter();
        let orch = Arc::new(orchestrator(vec![Arc::new(slow)], Some(cache as Arc<dyn CacheStore>)));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let orch = Arc::clone(&orch);
                tokio::spawn(async move { orch.resolve(&LookupRequest::by_name("sesame")).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().payload, "exact");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejects_increasing_confidence() {
        let result = ResolutionOrchestrator::<String>::new(
            config(),
            vec![
                Arc::new(MockTier::<String>::miss(1, 0.6)),
                Arc::new(MockTier::<String>::miss(2, 0.95)),
            ],
            None,
            limits(),
        );
        assert!(matches!(result, Err(larder_common::Error::Config(_))));
    }

    #[test]
    fn test_rejects_out_of_order_tiers_and_bad_confidence() {
        let out_of_order = ResolutionOrchestrator::<String>::new(
            config(),
            vec![
                Arc::new(MockTier::<String>::miss(2, 0.9)),
                Arc::new(MockTier::<String>::miss(1, 0.9)),
            ],
            None,
            limits(),
        );
        assert!(out_of_order.is_err());

        let too_high = ResolutionOrchestrator::<String>::new(
            config(),
            vec![Arc::new(MockTier::<String>::miss(1, 1.5))],
            None,
            limits(),
        );
        assert!(too_high.is_err());

        let empty = ResolutionOrchestrator::<String>::new(config(), vec![], None, limits());
        assert!(empty.is_err());
    }
}
