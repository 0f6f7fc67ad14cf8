//! Core resolution types
//!
//! A *tier* is one data source attempted in priority order for an ingredient.
//! Every tier implements [`TierResolver`]; the orchestrator tags the winning
//! payload with tier number, confidence and provenance to form an
//! [`AttributeRecord`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use larder_common::{normalize_name, Quantity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::units::ConversionError;

// ============================================================================
// Domains
// ============================================================================

/// Attribute domain served by an orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Nutrition,
    Allergen,
    Pricing,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Nutrition => "nutrition",
            Domain::Allergen => "allergen",
            Domain::Pricing => "pricing",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// Resolved, tier-tagged attribute payload
///
/// This is what the cache stores. Nutrition and allergen payloads are unscaled
/// (per 100 g); pricing payloads are already scaled to the requested quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeRecord<T> {
    pub payload: T,
    /// 1-based position of the winning tier
    pub tier: u8,
    /// Fixed per tier per domain, in [0, 1]
    pub confidence: f64,
    pub data_source: String,
    pub resolved_at: DateTime<Utc>,
}

/// Payload returned by a tier before the orchestrator tags it
#[derive(Debug, Clone, PartialEq)]
pub struct TierHit<T> {
    pub payload: T,
    pub data_source: String,
}

impl<T> TierHit<T> {
    pub fn new(payload: T, data_source: impl Into<String>) -> Self {
        Self {
            payload,
            data_source: data_source.into(),
        }
    }
}

/// Identity of the ingredient being resolved
#[derive(Debug, Clone, PartialEq)]
pub struct LookupRequest {
    /// Datastore id when the caller knows it (required by id-keyed tiers)
    pub ingredient_id: Option<i64>,
    pub name: String,
    /// Requested quantity, for domains whose payload is pre-scaled
    pub quantity: Option<Quantity>,
}

impl LookupRequest {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            ingredient_id: None,
            name: name.into(),
            quantity: None,
        }
    }

    pub fn with_id(mut self, ingredient_id: i64) -> Self {
        self.ingredient_id = Some(ingredient_id);
        self
    }

    pub fn with_quantity(mut self, quantity: Quantity) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

// ============================================================================
// Tiers
// ============================================================================

/// What a tier talks to; decides which timeout the orchestrator applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    /// Relational datastore query
    Datastore,
    /// Third-party HTTP source
    External,
    /// Inference provider
    Inference,
}

/// Tier-local failure
///
/// Everything except [`TierError::Conversion`] is recovered by the
/// orchestrator as a miss for that tier.
#[derive(Debug, Error)]
pub enum TierError {
    #[error("Datastore error: {0}")]
    Datastore(#[from] larder_common::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    /// The tier found data but the requested quantity cannot be expressed in grams
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl From<sqlx::Error> for TierError {
    fn from(err: sqlx::Error) -> Self {
        TierError::Datastore(larder_common::Error::Database(err))
    }
}

impl TierError {
    /// Whether the orchestrator may treat this error as a plain miss
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TierError::Conversion(_))
    }
}

/// One data source in a domain's tier sequence
///
/// Implementations return `Ok(None)` for "no data" and reserve `Err` for
/// failures. They do not apply timeouts or caching themselves.
#[async_trait]
pub trait TierResolver<T>: Send + Sync {
    /// Resolver name for logs
    fn name(&self) -> &'static str;

    /// 1-based tier number within its domain
    fn tier(&self) -> u8;

    /// Confidence attached to every record this tier produces
    fn confidence(&self) -> f64;

    fn kind(&self) -> TierKind;

    async fn resolve(&self, request: &LookupRequest) -> Result<Option<TierHit<T>>, TierError>;
}

/// Round to two decimals for response payloads
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub mod mock {
    //! Test doubles shared by unit tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scriptable tier: returns a fixed payload, a miss, an error or a delayed value
    pub struct MockTier<T: Clone + Send + Sync> {
        name: &'static str,
        tier: u8,
        confidence: f64,
        kind: TierKind,
        payload: Arc<Mutex<Option<T>>>,
        fail: bool,
        delay: Option<Duration>,
        calls: Arc<AtomicUsize>,
    }

    impl<T: Clone + Send + Sync> MockTier<T> {
        pub fn miss(tier: u8, confidence: f64) -> Self {
            Self {
                name: "mock",
                tier,
                confidence,
                kind: TierKind::Datastore,
                payload: Arc::new(Mutex::new(None)),
                fail: false,
                delay: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn hit(tier: u8, confidence: f64, payload: T) -> Self {
            let tier = Self::miss(tier, confidence);
            *tier.payload.lock().unwrap() = Some(payload);
            tier
        }

        pub fn failing(tier: u8, confidence: f64) -> Self {
            Self {
                fail: true,
                ..Self::miss(tier, confidence)
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn with_kind(mut self, kind: TierKind) -> Self {
            self.kind = kind;
            self
        }

        /// Handle for changing the payload after the tier is installed
        pub fn payload_handle(&self) -> Arc<Mutex<Option<T>>> {
            Arc::clone(&self.payload)
        }

        pub fn call_counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl<T: Clone + Send + Sync> TierResolver<T> for MockTier<T> {
        fn name(&self) -> &'static str {
            self.name
        }

        fn tier(&self) -> u8 {
            self.tier
        }

        fn confidence(&self) -> f64 {
            self.confidence
        }

        fn kind(&self) -> TierKind {
            self.kind
        }

        async fn resolve(&self, _request: &LookupRequest) -> Result<Option<TierHit<T>>, TierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(TierError::Network("connection refused".to_string()));
            }
            let payload = self.payload.lock().unwrap().clone();
            Ok(payload.map(|p| TierHit::new(p, "MOCK")))
        }
    }
}
