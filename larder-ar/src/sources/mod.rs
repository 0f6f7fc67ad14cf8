//! Secondary data sources queried when the datastore has no match
//!
//! Sources answer `search_by_name` with a record or `None`. Transport and
//! decode failures are logged inside the source and reported as `None`.
//! [`ExternalTier`] and [`InferenceTier`] adapt sources into tiers.

pub mod food_group;
pub mod inference;
pub mod open_food_facts;

pub use food_group::FoodGroupAverageSource;
pub use inference::{InferenceSource, InferenceTier};
pub use open_food_facts::OpenFoodFactsClient;

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{LookupRequest, TierError, TierHit, TierKind, TierResolver};

/// Secondary source for records of type `R`
#[async_trait]
pub trait ExternalAttributeSource<R>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Provenance label attached to records from this source
    fn data_source(&self) -> &'static str;

    /// Look up `name`; errors are reported as `None`
    async fn search_by_name(&self, name: &str) -> Option<R>;
}

/// Tier backed by an [`ExternalAttributeSource`]
pub struct ExternalTier<R> {
    source: Arc<dyn ExternalAttributeSource<R>>,
    tier: u8,
    confidence: f64,
}

impl<R> ExternalTier<R> {
    pub fn new(source: Arc<dyn ExternalAttributeSource<R>>, tier: u8, confidence: f64) -> Self {
        Self {
            source,
            tier,
            confidence,
        }
    }
}

#[async_trait]
impl<R: Send + Sync + 'static> TierResolver<R> for ExternalTier<R> {
    fn name(&self) -> &'static str {
        self.source.name()
    }

    fn tier(&self) -> u8 {
        self.tier
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }

    fn kind(&self) -> TierKind {
        TierKind::External
    }

    async fn resolve(&self, request: &LookupRequest) -> Result<Option<TierHit<R>>, TierError> {
        Ok(self
            .source
            .search_by_name(request.name.trim())
            .await
            .map(|record| TierHit::new(record, self.source.data_source())))
    }
}
