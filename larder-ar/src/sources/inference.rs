//! Inference extension point
//!
//! No provider ships with the resolver. A deployment that has one implements
//! [`InferenceSource`] and installs it through [`InferenceTier`]; without one
//! the tier is simply absent from the domain's tier list.

use async_trait::async_trait;
use larder_common::DataSource;
use std::sync::Arc;

use crate::types::{LookupRequest, TierError, TierHit, TierKind, TierResolver};

/// Inference provider answering the same name-search contract as external sources
#[async_trait]
pub trait InferenceSource<R>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inferred record for `name`; provider failures are reported as `None`
    async fn search_by_name(&self, name: &str) -> Option<R>;
}

/// Tier backed by an [`InferenceSource`]; records are tagged `LLM_INFERRED`
pub struct InferenceTier<R> {
    source: Arc<dyn InferenceSource<R>>,
    tier: u8,
    confidence: f64,
}

impl<R> InferenceTier<R> {
    pub fn new(source: Arc<dyn InferenceSource<R>>, tier: u8, confidence: f64) -> Self {
        Self {
            source,
            tier,
            confidence,
        }
    }
}

#[async_trait]
impl<R: Send + Sync + 'static> TierResolver<R> for InferenceTier<R> {
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
        TierKind::Inference
    }

    async fn resolve(&self, request: &LookupRequest) -> Result<Option<TierHit<R>>, TierError> {
        Ok(self
            .source
            .search_by_name(request.name.trim())
            .await
            .map(|record| TierHit::new(record, DataSource::LlmInferred.as_str())))
    }
}
