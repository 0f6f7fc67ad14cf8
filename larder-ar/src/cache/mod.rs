//! Read-through cache for resolved attribute records
//!
//! Values are the JSON encoding of a tier-tagged
//! [`AttributeRecord`](crate::types::AttributeRecord). Only successful
//! resolutions are written; "not found" is never cached.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use async_trait::async_trait;
use larder_common::{normalize_name, Quantity};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::types::{Domain, LookupRequest};

/// Cache backend failure; always recovered by the caller
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// Key/value store with per-entry TTL
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value for `key`, `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key` for `ttl` (last write wins)
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Drop every expired entry; returns how many were removed
    async fn purge_expired(&self) -> Result<u64, CacheError>;
}

/// Sweep expired entries from `cache` every `every`
///
/// Keys that are never read again (most `shopping:` keys) would otherwise
/// stay in the backend forever. The task runs until aborted.
pub fn spawn_purge_task(cache: Arc<dyn CacheStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        timer.tick().await;

        loop {
            timer.tick().await;
            match cache.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Purged expired cache entries"),
                Err(e) => warn!(error = %e, "Cache purge failed"),
            }
        }
    })
}

// ============================================================================
// Key policy
// ============================================================================

/// How a domain derives cache keys from a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKeyPolicy {
    /// `{prefix}:{normalized_name}`; payload is unscaled and reusable across quantities
    ByName,
    /// `{prefix}:{ingredient_id}:{amount}:{unit}`; payload is pre-scaled
    ByIdAndQuantity,
}

/// Cache prefix per domain
pub fn key_prefix(domain: Domain) -> &'static str {
    match domain {
        Domain::Nutrition => "nutrition",
        Domain::Allergen => "allergen",
        Domain::Pricing => "shopping",
    }
}

/// `{domain}:{normalized_name}`
pub fn name_key(domain: Domain, name: &str) -> String {
    format!("{}:{}", key_prefix(domain), normalize_name(name))
}

/// `shopping:{ingredient_id}:{amount}:{unit}`
pub fn quantity_key(domain: Domain, ingredient_id: i64, quantity: &Quantity) -> String {
    format!(
        "{}:{}:{}:{}",
        key_prefix(domain),
        ingredient_id,
        quantity.amount,
        quantity.measurement
    )
}

impl CacheKeyPolicy {
    /// Key for `request`, `None` when the request lacks what the policy needs
    pub fn key_for(self, domain: Domain, request: &LookupRequest) -> Option<String> {
        match self {
            CacheKeyPolicy::ByName => {
                let normalized = request.normalized_name();
                if normalized.is_empty() {
                    None
                } else {
                    Some(name_key(domain, &normalized))
                }
            }
            CacheKeyPolicy::ByIdAndQuantity => {
                let id = request.ingredient_id?;
                let quantity = request.quantity.unwrap_or_else(Quantity::default_serving);
                Some(quantity_key(domain, id, &quantity))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_common::Unit;

    #[test]
    fn test_name_keys_are_normalized() {
        assert_eq!(name_key(Domain::Nutrition, "  Chicken  Breast"), "nutrition:chicken breast");
        assert_eq!(name_key(Domain::Allergen, "WHEAT FLOUR"), "allergen:wheat flour");
    }

    #[test]
    fn test_quantity_key_format() {
        let q = Quantity::new(1.5, Unit::Cup).unwrap();
        assert_eq!(quantity_key(Domain::Pricing, 42, &q), "shopping:42:1.5:CUP");
        assert_eq!(
            quantity_key(Domain::Pricing, 7, &Quantity::default_serving()),
            "shopping:7:100:G"
        );
    }

    #[tokio::test]
    async fn test_purge_task_sweeps_unread_keys() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("shopping:1:2:CUP", "a", Duration::from_millis(5)).await.unwrap();
        cache.set("shopping:1:3:CUP", "b", Duration::from_millis(5)).await.unwrap();
        cache.set("nutrition:rice", "c", Duration::from_secs(60)).await.unwrap();

        let task = spawn_purge_task(cache.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;
        task.abort();

        // Already swept by the task, so nothing is left to remove
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
        assert_eq!(cache.stored().await, 1);
    }

    #[test]
    fn test_policy_requires_identity() {
        let by_name = LookupRequest::by_name("   ");
        assert_eq!(CacheKeyPolicy::ByName.key_for(Domain::Allergen, &by_name), None);

        let no_id = LookupRequest::by_name("rice");
        assert_eq!(CacheKeyPolicy::ByIdAndQuantity.key_for(Domain::Pricing, &no_id), None);

        let with_id = LookupRequest::by_name("rice").with_id(3);
        assert_eq!(
            CacheKeyPolicy::ByIdAndQuantity.key_for(Domain::Pricing, &with_id),
            Some("shopping:3:100:G".to_string())
        );
    }
}
