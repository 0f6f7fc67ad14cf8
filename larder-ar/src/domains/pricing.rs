//! Pricing domain (shopping estimates)
//!
//! | Tier | Source | Confidence |
//! |------|--------|-----------|
//! | 1 | ingredient-specific price | 0.95 |
//! | 2 | food-group average price | 0.60 |
//!
//! Unlike nutrition and allergens, the payload is scaled to the requested
//! quantity before caching (`shopping:{id}:{amount}:{unit}`). Tiers convert
//! the quantity only after finding a price, so an unpriced ingredient is
//! "not found" rather than a conversion failure.

use async_trait::async_trait;
use larder_common::Quantity;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{resolve_all, AggregationPolicy, RecipeAttributeResult, RecipeIngredient};
use crate::db::{IngredientRepository, PriceRow, PricingRepository};
use crate::resolution::{ResolutionError, ResolutionOrchestrator};
use crate::sources::{ExternalAttributeSource, FoodGroupAverageSource};
use crate::types::{AttributeRecord, LookupRequest, TierError, TierHit, TierKind, TierResolver};
use crate::units::UnitConverter;

pub const INGREDIENT_PRICE_CONFIDENCE: f64 = 0.95;
pub const FOOD_GROUP_CONFIDENCE: f64 = 0.60;

/// Currency reported when a recipe has no priced ingredient
pub const DEFAULT_CURRENCY: &str = "USD";

/// Price for a concrete quantity of one ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedQuantity {
    pub ingredient_name: String,
    pub quantity: Quantity,
    pub grams: f64,
    pub price_per_100g: f64,
    pub estimated_price: f64,
    pub currency: String,
}

async fn price_quantity(
    converter: &UnitConverter,
    request: &LookupRequest,
    row: PriceRow,
) -> Result<TierHit<PricedQuantity>, TierError> {
    let quantity = request.quantity.unwrap_or_else(Quantity::default_serving);
    let grams = converter.to_grams(&quantity, &request.name).await?;

    Ok(TierHit::new(
        PricedQuantity {
            ingredient_name: request.name.trim().to_string(),
            quantity,
            grams,
            price_per_100g: row.price_per_100g,
            estimated_price: grams / 100.0 * row.price_per_100g,
            currency: row.currency,
        },
        row.data_source,
    ))
}

// ============================================================================
// Tiers
// ============================================================================

/// Tier 1: the ingredient's own most recent price
pub struct IngredientPriceTier {
    ingredients: IngredientRepository,
    pricing: PricingRepository,
    converter: UnitConverter,
}

impl IngredientPriceTier {
    pub fn new(ingredients: IngredientRepository, pricing: PricingRepository, converter: UnitConverter) -> Self {
        Self {
            ingredients,
            pricing,
            converter,
        }
    }
}

#[async_trait]
impl TierResolver<PricedQuantity> for IngredientPriceTier {
    fn name(&self) -> &'static str {
        "ingredient_price"
    }

    fn tier(&self) -> u8 {
        1
    }

    fn confidence(&self) -> f64 {
        INGREDIENT_PRICE_CONFIDENCE
    }

    fn kind(&self) -> TierKind {
        TierKind::Datastore
    }

    async fn resolve(&self, request: &LookupRequest) -> Result<Option<TierHit<PricedQuantity>>, TierError> {
        let ingredient_id = match request.ingredient_id {
            Some(id) => id,
            None => match self.ingredients.find_by_name(&request.name).await? {
                Some(ingredient) => ingredient.ingredient_id,
                None => return Ok(None),
            },
        };

        match self.pricing.price_by_ingredient_id(ingredient_id).await? {
            Some(row) => price_quantity(&self.converter, request, row).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Tier 2: average price of the ingredient's food group
pub struct FoodGroupPriceTier {
    source: FoodGroupAverageSource,
    converter: UnitConverter,
}

impl FoodGroupPriceTier {
    pub fn new(source: FoodGroupAverageSource, converter: UnitConverter) -> Self {
        Self { source, converter }
    }
}

#[async_trait]
impl TierResolver<PricedQuantity> for FoodGroupPriceTier {
    fn name(&self) -> &'static str {
        self.source.name()
    }

    fn tier(&self) -> u8 {
        2
    }

    fn confidence(&self) -> f64 {
        FOOD_GROUP_CONFIDENCE
    }

    fn kind(&self) -> TierKind {
        TierKind::Datastore
    }

    async fn resolve(&self, request: &LookupRequest) -> Result<Option<TierHit<PricedQuantity>>, TierError> {
        let row = match request.ingredient_id {
            Some(id) => self.source.for_ingredient(id).await,
            None => self.source.search_by_name(&request.name).await,
        };

        match row {
            Some(row) => price_quantity(&self.converter, request, row).await.map(Some),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Recipe shopping total over priced ingredients
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShoppingTotals {
    pub total_estimated_cost: f64,
    /// Currency of the first priced ingredient
    pub currency: Option<String>,
    pub tier1_count: usize,
    pub tier2_count: usize,
    confidence_sum: f64,
    /// Mean per-ingredient confidence, `None` when nothing was priced
    pub price_confidence: Option<f64>,
}

pub struct PricingPolicy;

impl AggregationPolicy for PricingPolicy {
    type Resolved = AttributeRecord<PricedQuantity>;
    type Summary = ShoppingTotals;

    fn empty(&self) -> ShoppingTotals {
        ShoppingTotals::default()
    }

    fn accumulate(&self, totals: &mut ShoppingTotals, _ingredient: &RecipeIngredient, record: &Self::Resolved) {
        totals.total_estimated_cost += record.payload.estimated_price;
        if totals.currency.is_none() {
            totals.currency = Some(record.payload.currency.clone());
        }
        match record.tier {
            1 => totals.tier1_count += 1,
            _ => totals.tier2_count += 1,
        }
        totals.confidence_sum += record.confidence;
    }

    fn finish(&self, totals: &mut ShoppingTotals, resolved_count: usize) {
        totals.price_confidence = (resolved_count > 0).then(|| totals.confidence_sum / resolved_count as f64);
    }
}

pub type RecipeShopping = RecipeAttributeResult<ShoppingTotals, AttributeRecord<PricedQuantity>>;

// ============================================================================
// Service
// ============================================================================

pub struct ShoppingService {
    orchestrator: Arc<ResolutionOrchestrator<PricedQuantity>>,
}

impl ShoppingService {
    pub fn new(orchestrator: Arc<ResolutionOrchestrator<PricedQuantity>>) -> Self {
        Self { orchestrator }
    }

    /// Estimated price for the request's quantity (100 g when absent)
    ///
    /// # Errors
    /// `NotFound` when neither tier has a price; `Conversion` when a price
    /// exists but the quantity cannot be expressed in grams.
    pub async fn ingredient(&self, request: &LookupRequest) -> Result<AttributeRecord<PricedQuantity>, ResolutionError> {
        self.orchestrator.resolve(request).await
    }

    /// Per-ingredient prices and total for a recipe
    pub async fn recipe(&self, ingredients: &[RecipeIngredient]) -> RecipeShopping {
        let outcomes = resolve_all(ingredients, |ingredient| async move {
            let request = ingredient.lookup()?.with_quantity(ingredient.quantity_or_default());
            match self.ingredient(&request).await {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(ingredient_id = ingredient.ingredient_id, error = %e, "Ingredient price missing");
                    None
                }
            }
        })
        .await;

        PricingPolicy.aggregate(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKeyPolicy, CacheStore, MemoryCache};
    use crate::resolution::{DomainConfig, ResolutionLimits};
    use crate::types::mock::MockTier;
    use crate::types::Domain;
    use larder_common::Unit;
    use std::time::Duration;

    fn priced(name: &str, estimated_price: f64) -> PricedQuantity {
        PricedQuantity {
            ingredient_name: name.to_string(),
            quantity: Quantity::default_serving(),
            grams: 100.0,
            price_per_100g: estimated_price,
            estimated_price,
            currency: "USD".to_string(),
        }
    }

    fn service(
        tiers: Vec<Arc<dyn TierResolver<PricedQuantity>>>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> ShoppingService {
        let orchestrator = ResolutionOrchestrator::new(
            DomainConfig {
                domain: Domain::Pricing,
                key_policy: CacheKeyPolicy::ByIdAndQuantity,
                ttl: Duration::from_secs(60),
            },
            tiers,
            cache,
            ResolutionLimits::new(4, Duration::from_secs(1), Duration::from_secs(1)),
        )
        .unwrap();
        ShoppingService::new(Arc::new(orchestrator))
    }

    fn line(id: i64, name: &str) -> RecipeIngredient {
        RecipeIngredient {
            ingredient_id: id,
            name: Some(name.to_string()),
            quantity: None,
        }
    }

    #[test]
    fn test_policy_counts_tiers_and_averages_confidence() {
        let record = |tier: u8, confidence: f64, price: f64| AttributeRecord {
            payload: priced("x", price),
            tier,
            confidence,
            data_source: "USDA".to_string(),
            resolved_at: chrono::Utc::now(),
        };

        let result = PricingPolicy.aggregate(vec![
            (line(1, "rice"), Some(record(1, 0.95, 0.40))),
            (line(2, "kale"), Some(record(2, 0.60, 0.75))),
            (line(3, "saffron"), None),
        ]);

        let totals = &result.summary;
        assert!((totals.total_estimated_cost - 1.15).abs() < 1e-9);
        assert_eq!((totals.tier1_count, totals.tier2_count), (1, 1));
        assert!((totals.price_confidence.unwrap() - 0.775).abs() < 1e-9);
        assert_eq!(totals.currency.as_deref(), Some("USD"));
        assert_eq!(result.missing_ingredient_ids.len(), 1);
    }

    #[test]
    fn test_empty_recipe_has_no_confidence() {
        let result = PricingPolicy.aggregate(vec![(line(1, "saffron"), None)]);
        assert_eq!(result.summary.price_confidence, None);
        assert_eq!(result.summary.total_estimated_cost, 0.0);
    }

    #[tokio::test]
    async fn test_food_group_fallback_confidence() {
        let svc = service(
            vec![
                Arc::new(MockTier::<PricedQuantity>::miss(1, INGREDIENT_PRICE_CONFIDENCE)),
                Arc::new(MockTier::hit(2, FOOD_GROUP_CONFIDENCE, priced("kale", 0.75))),
            ],
            None,
        );

        let record = svc
            .ingredient(&LookupRequest::by_name("kale").with_id(5))
            .await
            .unwrap();
        assert_eq!(record.tier, 2);
        assert_eq!(record.confidence, 0.60);
    }

    #[tokio::test]
    async fn test_cache_key_includes_quantity() {
        let cache = Arc::new(MemoryCache::new());
        let svc = service(
            vec![Arc::new(MockTier::hit(1, INGREDIENT_PRICE_CONFIDENCE, priced("rice", 0.40)))],
            Some(cache.clone() as Arc<dyn CacheStore>),
        );

        let request = LookupRequest::by_name("rice")
            .with_id(11)
            .with_quantity(Quantity::new(2.0, Unit::Cup).unwrap());
        svc.ingredient(&request).await.unwrap();

        assert!(cache.get("shopping:11:2:CUP").await.unwrap().is_some());
        assert!(cache.get("shopping:11:100:G").await.unwrap().is_none());
    }
}
