//! Allergen domain
//!
//! Tier table:
//!
//! | Tier | Source | Confidence |
//! |------|--------|-----------|
//! | 1 | datastore exact name | 1.00 |
//! | 2 | datastore fuzzy name (prefix, contains, trigram) | 0.95 |
//! | 3 | Open Food Facts product search | 0.95 |
//! | 4 | inference provider, when installed | 0.50 |
//!
//! Recipe aggregation unions the ingredients' allergens. CONTAINS in any
//! ingredient outranks MAY_CONTAIN or TRACES elsewhere.

use async_trait::async_trait;
use larder_common::{Allergen, PresenceType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::{resolve_all, AggregationPolicy, RecipeAttributeResult, RecipeIngredient};
use crate::db::AllergenRepository;
use crate::resolution::{ResolutionError, ResolutionOrchestrator};
use crate::types::{AttributeRecord, LookupRequest, TierError, TierHit, TierKind, TierResolver};

pub const EXACT_CONFIDENCE: f64 = 1.0;
pub const FUZZY_CONFIDENCE: f64 = 0.95;
pub const EXTERNAL_CONFIDENCE: f64 = 0.95;
pub const INFERENCE_CONFIDENCE: f64 = 0.5;

/// One allergen of an ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllergenEntry {
    pub allergen: Allergen,
    pub presence_type: PresenceType,
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_notes: Option<String>,
}

/// Cached allergen payload for one ingredient
///
/// The datastore and Open Food Facts tiers only produce profiles with at least
/// one entry; a source with nothing to declare is a miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllergenProfile {
    pub ingredient_id: Option<i64>,
    pub ingredient_name: Option<String>,
    pub usda_food_description: Option<String>,
    pub allergens: Vec<AllergenEntry>,
}

// ============================================================================
// Datastore tiers
// ============================================================================

/// Tier 1: case-insensitive exact name match
pub struct AllergenExactTier {
    repository: AllergenRepository,
}

impl AllergenExactTier {
    pub fn new(repository: AllergenRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl TierResolver<AllergenProfile> for AllergenExactTier {
    fn name(&self) -> &'static str {
        "allergen_exact"
    }

    fn tier(&self) -> u8 {
        1
    }

    fn confidence(&self) -> f64 {
        EXACT_CONFIDENCE
    }

    fn kind(&self) -> TierKind {
        TierKind::Datastore
    }

    async fn resolve(&self, request: &LookupRequest) -> Result<Option<TierHit<AllergenProfile>>, TierError> {
        let row = self.repository.exact_match(&request.name).await?;
        Ok(row.map(|r| TierHit::new(r.profile, r.data_source)))
    }
}

/// Tier 2: best single fuzzy name match
pub struct AllergenFuzzyTier {
    repository: AllergenRepository,
}

impl AllergenFuzzyTier {
    pub fn new(repository: AllergenRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl TierResolver<AllergenProfile> for AllergenFuzzyTier {
    fn name(&self) -> &'static str {
        "allergen_fuzzy"
    }

    fn tier(&self) -> u8 {
        2
    }

    fn confidence(&self) -> f64 {
        FUZZY_CONFIDENCE
    }

    fn kind(&self) -> TierKind {
        TierKind::Datastore
    }

    async fn resolve(&self, request: &LookupRequest) -> Result<Option<TierHit<AllergenProfile>>, TierError> {
        let row = self.repository.fuzzy_match(&request.name).await?;
        Ok(row.map(|r| TierHit::new(r.profile, r.data_source)))
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Recipe-level allergen summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllergenSummary {
    /// Allergens some ingredient definitely contains, sorted by name
    pub contains: Vec<Allergen>,
    /// Possible allergens not in `contains`, sorted by name
    pub may_contain: Vec<Allergen>,
    /// One merged entry per allergen, sorted by name
    pub allergens: Vec<AllergenEntry>,
}

/// Union with CONTAINS precedence and highest-confidence merge
pub struct AllergenPolicy;

impl AggregationPolicy for AllergenPolicy {
    type Resolved = AttributeRecord<AllergenProfile>;
    type Summary = BTreeMap<&'static str, AllergenEntry>;

    fn empty(&self) -> Self::Summary {
        BTreeMap::new()
    }

    fn accumulate(
        &self,
        merged: &mut Self::Summary,
        _ingredient: &RecipeIngredient,
        record: &AttributeRecord<AllergenProfile>,
    ) {
        for entry in &record.payload.allergens {
            merged
                .entry(entry.allergen.as_str())
                .and_modify(|existing| merge_entry(existing, entry))
                .or_insert_with(|| entry.clone());
        }
    }
}

fn presence_rank(presence: PresenceType) -> u8 {
    match presence {
        PresenceType::Contains => 2,
        PresenceType::MayContain => 1,
        PresenceType::Traces => 0,
    }
}

/// Strongest presence wins; confidence and notes come from the most confident entry
fn merge_entry(existing: &mut AllergenEntry, entry: &AllergenEntry) {
    if presence_rank(entry.presence_type) > presence_rank(existing.presence_type) {
        existing.presence_type = entry.presence_type;
    }
    if entry.confidence_score > existing.confidence_score {
        existing.confidence_score = entry.confidence_score;
        existing.source_notes = entry.source_notes.clone();
    }
}

impl From<BTreeMap<&'static str, AllergenEntry>> for AllergenSummary {
    fn from(merged: BTreeMap<&'static str, AllergenEntry>) -> Self {
        // Keys are allergen names, so iteration order is already sorted
        let mut contains = Vec::new();
        let mut may_contain = Vec::new();
        for entry in merged.values() {
            match entry.presence_type {
                PresenceType::Contains => contains.push(entry.allergen),
                PresenceType::MayContain | PresenceType::Traces => may_contain.push(entry.allergen),
            }
        }

        Self {
            contains,
            may_contain,
            allergens: merged.into_values().collect(),
        }
    }
}

pub type RecipeAllergens = RecipeAttributeResult<AllergenSummary, AttributeRecord<AllergenProfile>>;

// ============================================================================
// Service
// ============================================================================

pub struct AllergenService {
    orchestrator: Arc<ResolutionOrchestrator<AllergenProfile>>,
}

impl AllergenService {
    pub fn new(orchestrator: Arc<ResolutionOrchestrator<AllergenProfile>>) -> Self {
        Self { orchestrator }
    }

    /// `(tier, confidence, resolver)` rows of the installed tier table
    pub fn tier_table(&self) -> Vec<(u8, f64, &'static str)> {
        self.orchestrator.tier_table()
    }

    /// Allergen profile for one ingredient
    ///
    /// # Errors
    /// `NotFound` when no tier has data.
    pub async fn ingredient(&self, request: &LookupRequest) -> Result<AttributeRecord<AllergenProfile>, ResolutionError> {
        self.orchestrator.resolve(request).await
    }

    /// Aggregated allergens for a recipe's ingredient list
    pub async fn recipe(&self, ingredients: &[RecipeIngredient]) -> RecipeAllergens {
        let outcomes = resolve_all(ingredients, |ingredient| async move {
            let request = ingredient.lookup()?;
            match self.ingredient(&request).await {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(ingredient_id = ingredient.ingredient_id, error = %e, "Ingredient allergens missing");
                    None
                }
            }
        })
        .await;

        let result = AllergenPolicy.aggregate(outcomes);
        RecipeAttributeResult {
            summary: AllergenSummary::from(result.summary),
            resolved: result.resolved,
            missing_ingredient_ids: result.missing_ingredient_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn entry(allergen: Allergen, presence_type: PresenceType, confidence_score: f64) -> AllergenEntry {
        AllergenEntry {
            allergen,
            presence_type,
            confidence_score,
            source_notes: None,
        }
    }

    fn record(allergens: Vec<AllergenEntry>) -> AttributeRecord<AllergenProfile> {
        AttributeRecord {
            payload: AllergenProfile {
                ingredient_id: None,
                ingredient_name: None,
                usda_food_description: None,
                allergens,
            },
            tier: 1,
            confidence: 1.0,
            data_source: "USDA".to_string(),
            resolved_at: Utc::now(),
        }
    }

    fn line(id: i64) -> RecipeIngredient {
        RecipeIngredient {
            ingredient_id: id,
            name: Some(format!("ingredient {id}")),
            quantity: None,
        }
    }

    fn summarize(outcomes: Vec<(RecipeIngredient, Option<AttributeRecord<AllergenProfile>>)>) -> AllergenSummary {
        AllergenSummary::from(AllergenPolicy.aggregate(outcomes).summary)
    }

    #[test]
    fn test_contains_takes_precedence() {
        let summary = summarize(vec![
            (line(1), Some(record(vec![entry(Allergen::Milk, PresenceType::Contains, 0.9)]))),
            (line(2), Some(record(vec![entry(Allergen::Milk, PresenceType::MayContain, 1.0)]))),
        ]);

        assert_eq!(summary.contains, vec![Allergen::Milk]);
        assert!(summary.may_contain.is_empty());
        assert_eq!(summary.allergens.len(), 1);
        assert_eq!(summary.allergens[0].presence_type, PresenceType::Contains);
        assert_eq!(summary.allergens[0].confidence_score, 1.0);
    }

    #[test]
    fn test_may_contain_only_without_contains() {
        let summary = summarize(vec![
            (
                line(1),
                Some(record(vec![
                    entry(Allergen::Wheat, PresenceType::Contains, 1.0),
                    entry(Allergen::Soybeans, PresenceType::Traces, 0.8),
                ])),
            ),
            (line(2), Some(record(vec![entry(Allergen::Eggs, PresenceType::MayContain, 0.95)]))),
            (line(3), None),
        ]);

        assert_eq!(summary.contains, vec![Allergen::Wheat]);
        assert_eq!(summary.may_contain, vec![Allergen::Eggs, Allergen::Soybeans]);
        let names: Vec<_> = summary.allergens.iter().map(|e| e.allergen.as_str()).collect();
        assert_eq!(names, vec!["EGGS", "SOYBEANS", "WHEAT"]);
    }

    #[test]
    fn test_empty_profile_is_resolved_not_missing() {
        let result = AllergenPolicy.aggregate(vec![(line(1), Some(record(vec![]))), (line(2), None)]);
        assert_eq!(result.resolved.len(), 1);
        assert_eq!(result.missing_ingredient_ids, BTreeSet::from([2]));
        assert!(result.summary.is_empty());
    }

    #[test]
    fn test_profile_wire_format() {
        let json = serde_json::to_value(entry(Allergen::TreeNuts, PresenceType::MayContain, 0.95)).unwrap();
        assert_eq!(json["allergen"], "TREE_NUTS");
        assert_eq!(json["presenceType"], "MAY_CONTAIN");
        assert_eq!(json["confidenceScore"], 0.95);
        assert!(json.get("sourceNotes").is_none());
    }
}
