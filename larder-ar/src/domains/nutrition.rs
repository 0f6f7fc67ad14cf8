//! Nutrition domain
//!
//! Single datastore tier (exact name match, confidence 1.0). Profiles are
//! cached per 100 g and scaled to the requested quantity after resolution, so
//! one cache entry serves every quantity of an ingredient.

use async_trait::async_trait;
use larder_common::Quantity;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{resolve_all, AggregationPolicy, RecipeAttributeResult, RecipeIngredient};
use crate::db::NutritionRepository;
use crate::resolution::{ResolutionError, ResolutionOrchestrator};
use crate::types::{LookupRequest, TierError, TierHit, TierKind, TierResolver};
use crate::units::UnitConverter;

pub const EXACT_CONFIDENCE: f64 = 1.0;

// ============================================================================
// Payload (per 100 g)
// ============================================================================

/// Macronutrients per 100 g; absent values stay `None`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Macronutrients {
    pub calories_kcal: Option<f64>,
    pub protein_g: Option<f64>,
    pub carbs_g: Option<f64>,
    pub fat_g: Option<f64>,
    pub saturated_fat_g: Option<f64>,
    pub trans_fat_g: Option<f64>,
    pub monounsaturated_fat_g: Option<f64>,
    pub polyunsaturated_fat_g: Option<f64>,
    pub cholesterol_mg: Option<f64>,
    pub sodium_mg: Option<f64>,
    pub fiber_g: Option<f64>,
    pub sugar_g: Option<f64>,
    pub added_sugar_g: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vitamins {
    pub vitamin_a_mcg: Option<f64>,
    pub vitamin_b6_mcg: Option<f64>,
    pub vitamin_b12_mcg: Option<f64>,
    pub vitamin_c_mcg: Option<f64>,
    pub vitamin_d_mcg: Option<f64>,
    pub vitamin_e_mcg: Option<f64>,
    pub vitamin_k_mcg: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Minerals {
    pub calcium_mg: Option<f64>,
    pub iron_mg: Option<f64>,
    pub magnesium_mg: Option<f64>,
    pub potassium_mg: Option<f64>,
    pub zinc_mg: Option<f64>,
}

/// Cached nutrition payload for one ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionProfile {
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub fdc_id: Option<i64>,
    pub usda_food_description: Option<String>,
    pub food_group: Option<String>,
    pub macronutrients: Option<Macronutrients>,
    pub vitamins: Option<Vitamins>,
    pub minerals: Option<Minerals>,
}

// ============================================================================
// Scaling and summing
// ============================================================================

fn scale(value: Option<f64>, factor: f64) -> Option<f64> {
    value.map(|v| v * factor)
}

/// Sum of present values; `None` only when both sides are absent
fn add(total: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (total, value) {
        (Some(a), Some(b)) => Some(a + b),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

macro_rules! nutrient_section {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl $ty {
            pub fn scaled(&self, factor: f64) -> Self {
                Self { $($field: scale(self.$field, factor)),+ }
            }

            pub fn add_assign(&mut self, other: &Self) {
                $(self.$field = add(self.$field, other.$field);)+
            }
        }
    };
}

nutrient_section!(Macronutrients {
    calories_kcal,
    protein_g,
    carbs_g,
    fat_g,
    saturated_fat_g,
    trans_fat_g,
    monounsaturated_fat_g,
    polyunsaturated_fat_g,
    cholesterol_mg,
    sodium_mg,
    fiber_g,
    sugar_g,
    added_sugar_g,
});

nutrient_section!(Vitamins {
    vitamin_a_mcg,
    vitamin_b6_mcg,
    vitamin_b12_mcg,
    vitamin_c_mcg,
    vitamin_d_mcg,
    vitamin_e_mcg,
    vitamin_k_mcg,
});

nutrient_section!(Minerals {
    calcium_mg,
    iron_mg,
    magnesium_mg,
    potassium_mg,
    zinc_mg,
});

fn add_section<T: Clone>(total: &mut Option<T>, value: &Option<T>, add_assign: impl Fn(&mut T, &T)) {
    let Some(v) = value else {
        return;
    };
    match total {
        Some(t) => add_assign(t, v),
        None => *total = Some(v.clone()),
    }
}

/// Nutrients for a concrete amount of food
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NutrientSet {
    pub macronutrients: Option<Macronutrients>,
    pub vitamins: Option<Vitamins>,
    pub minerals: Option<Minerals>,
}

impl NutrientSet {
    /// Scale a per-100 g profile to `grams`
    pub fn for_grams(profile: &NutritionProfile, grams: f64) -> Self {
        let factor = grams / 100.0;
        Self {
            macronutrients: profile.macronutrients.as_ref().map(|m| m.scaled(factor)),
            vitamins: profile.vitamins.as_ref().map(|v| v.scaled(factor)),
            minerals: profile.minerals.as_ref().map(|m| m.scaled(factor)),
        }
    }

    pub fn add_assign(&mut self, other: &NutrientSet) {
        add_section(&mut self.macronutrients, &other.macronutrients, Macronutrients::add_assign);
        add_section(&mut self.vitamins, &other.vitamins, Vitamins::add_assign);
        add_section(&mut self.minerals, &other.minerals, Minerals::add_assign);
    }
}

// ============================================================================
// Tier
// ============================================================================

/// Tier 1: case-insensitive exact name match in the datastore
pub struct NutritionExactTier {
    repository: NutritionRepository,
}

impl NutritionExactTier {
    pub fn new(repository: NutritionRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl TierResolver<NutritionProfile> for NutritionExactTier {
    fn name(&self) -> &'static str {
        "nutrition_exact"
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

    async fn resolve(&self, request: &LookupRequest) -> Result<Option<TierHit<NutritionProfile>>, TierError> {
        let row = self.repository.exact_match(&request.name).await?;
        Ok(row.map(|r| TierHit::new(r.profile, r.data_source)))
    }
}

// ============================================================================
// Service
// ============================================================================

/// Nutrition for one ingredient at a requested quantity
#[derive(Debug, Clone, PartialEq)]
pub struct IngredientNutrition {
    pub ingredient_id: Option<i64>,
    pub ingredient_name: String,
    pub usda_food_description: Option<String>,
    pub quantity: Quantity,
    pub grams: f64,
    pub nutrients: NutrientSet,
    pub data_source: String,
    pub confidence: f64,
    pub tier: u8,
}

/// Recipe total over resolved ingredients
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NutritionTotals {
    pub grams: f64,
    pub nutrients: NutrientSet,
}

/// Scale-then-sum aggregation
pub struct NutritionPolicy;

impl AggregationPolicy for NutritionPolicy {
    type Resolved = IngredientNutrition;
    type Summary = NutritionTotals;

    fn empty(&self) -> NutritionTotals {
        NutritionTotals::default()
    }

    fn accumulate(&self, totals: &mut NutritionTotals, _ingredient: &RecipeIngredient, resolved: &IngredientNutrition) {
        totals.grams += resolved.grams;
        totals.nutrients.add_assign(&resolved.nutrients);
    }
}

pub type RecipeNutrition = RecipeAttributeResult<NutritionTotals, IngredientNutrition>;

pub struct NutritionService {
    orchestrator: Arc<ResolutionOrchestrator<NutritionProfile>>,
    converter: UnitConverter,
}

impl NutritionService {
    pub fn new(orchestrator: Arc<ResolutionOrchestrator<NutritionProfile>>, converter: UnitConverter) -> Self {
        Self {
            orchestrator,
            converter,
        }
    }

    /// Nutrition for `quantity` of one ingredient
    ///
    /// # Errors
    /// `NotFound` when no tier has data; `Conversion` when the quantity uses a
    /// count unit without a recorded portion weight.
    pub async fn ingredient(
        &self,
        request: &LookupRequest,
        quantity: Quantity,
    ) -> Result<IngredientNutrition, ResolutionError> {
        let record = self.orchestrator.resolve(request).await?;
        let profile = &record.payload;
        let grams = self.converter.to_grams(&quantity, &profile.ingredient_name).await?;

        debug!(
            ingredient = %profile.ingredient_name,
            amount = quantity.amount,
            unit = %quantity.measurement,
            grams,
            "Scaling nutrition"
        );

        Ok(IngredientNutrition {
            ingredient_id: request.ingredient_id.or(Some(profile.ingredient_id)),
            ingredient_name: profile.ingredient_name.clone(),
            usda_food_description: profile.usda_food_description.clone(),
            quantity,
            grams,
            nutrients: NutrientSet::for_grams(profile, grams),
            data_source: record.data_source.clone(),
            confidence: record.confidence,
            tier: record.tier,
        })
    }

    /// Scaled, summed nutrition for a recipe's ingredient list
    pub async fn recipe(&self, ingredients: &[RecipeIngredient]) -> RecipeNutrition {
        let outcomes = resolve_all(ingredients, |ingredient| async move {
            let request = ingredient.lookup()?;
            match self.ingredient(&request, ingredient.quantity_or_default()).await {
                Ok(nutrition) => Some(nutrition),
                Err(e) => {
                    debug!(ingredient_id = ingredient.ingredient_id, error = %e, "Ingredient nutrition missing");
                    None
                }
            }
        })
        .await;

        NutritionPolicy.aggregate(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::{DomainConfig, ResolutionLimits};
    use crate::cache::CacheKeyPolicy;
    use crate::types::mock::MockTier;
    use crate::types::Domain;
    use crate::units::mock::MockPortions;
    use larder_common::Unit;
    use std::time::Duration;

    fn chicken() -> NutritionProfile {
        NutritionProfile {
            ingredient_id: 1,
            ingredient_name: "chicken breast".to_string(),
            fdc_id: Some(171077),
            usda_food_description: Some("Chicken, broiler, breast, meat only, raw".to_string()),
            food_group: Some("POULTRY".to_string()),
            macronutrients: Some(Macronutrients {
                calories_kcal: Some(120.0),
                protein_g: Some(22.5),
                fat_g: Some(2.6),
                sodium_mg: Some(45.0),
                ..Macronutrients::default()
            }),
            vitamins: None,
            minerals: Some(Minerals {
                iron_mg: Some(0.4),
                ..Minerals::default()
            }),
        }
    }

    fn service(tier: MockTier<NutritionProfile>, portions: MockPortions) -> NutritionService {
        let orchestrator = ResolutionOrchestrator::new(
            DomainConfig {
                domain: Domain::Nutrition,
                key_policy: CacheKeyPolicy::ByName,
                ttl: Duration::from_secs(60),
            },
            vec![Arc::new(tier)],
            None,
            ResolutionLimits::new(4, Duration::from_secs(1), Duration::from_secs(1)),
        )
        .unwrap();
        NutritionService::new(Arc::new(orchestrator), UnitConverter::new(Arc::new(portions)))
    }

    #[test]
    fn test_add_keeps_absent_values_absent() {
        assert_eq!(add(None, None), None);
        assert_eq!(add(None, Some(2.0)), Some(2.0));
        assert_eq!(add(Some(1.0), None), Some(1.0));
        assert_eq!(add(Some(1.0), Some(2.0)), Some(3.0));
    }

    #[test]
    fn test_nutrient_set_sums_sections() {
        let mut total = NutrientSet::for_grams(&chicken(), 100.0);
        let mut other = chicken();
        other.vitamins = Some(Vitamins {
            vitamin_c_mcg: Some(5.0),
            ..Vitamins::default()
        });
        total.add_assign(&NutrientSet::for_grams(&other, 50.0));

        let macros = total.macronutrients.unwrap();
        assert_eq!(macros.calories_kcal, Some(180.0));
        assert_eq!(macros.carbs_g, None);
        assert_eq!(total.vitamins.unwrap().vitamin_c_mcg, Some(2.5));
    }

    #[tokio::test]
    async fn test_ingredient_scaled_by_grams() {
        let svc = service(MockTier::hit(1, 1.0, chicken()), MockPortions::new());
        let quantity = Quantity::new(150.0, Unit::G).unwrap();

        let nutrition = svc
            .ingredient(&LookupRequest::by_name("chicken breast"), quantity)
            .await
            .unwrap();

        assert_eq!(nutrition.grams, 150.0);
        assert_eq!(nutrition.confidence, 1.0);
        let macros = nutrition.nutrients.macronutrients.unwrap();
        assert_eq!(macros.calories_kcal, Some(180.0));
        assert_eq!(macros.protein_g, Some(33.75));
        assert!(nutrition.nutrients.vitamins.is_none());
    }

    #[tokio::test]
    async fn test_count_unit_without_portion_is_conversion_error() {
        let svc = service(MockTier::hit(1, 1.0, chicken()), MockPortions::new());
        let quantity = Quantity::new(2.0, Unit::Piece).unwrap();

        let result = svc.ingredient(&LookupRequest::by_name("chicken breast"), quantity).await;
        assert!(matches!(result, Err(ResolutionError::Conversion(_))));
    }

    #[tokio::test]
    async fn test_recipe_excludes_unresolvable_lines() {
        let svc = service(MockTier::hit(1, 1.0, chicken()), MockPortions::new());
        let ingredients = vec![
            RecipeIngredient {
                ingredient_id: 1,
                name: Some("chicken breast".to_string()),
                quantity: Some(Quantity::new(200.0, Unit::G).unwrap()),
            },
            RecipeIngredient {
                ingredient_id: 2,
                name: Some("chicken breast".to_string()),
                quantity: Some(Quantity::new(1.0, Unit::Slice).unwrap()),
            },
            RecipeIngredient {
                ingredient_id: 3,
                name: None,
                quantity: None,
            },
        ];

        let result = svc.recipe(&ingredients).await;
        assert_eq!(result.resolved.len(), 1);
        assert_eq!(result.missing_ingredient_ids.into_iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(result.summary.grams, 200.0);
        assert_eq!(
            result.summary.nutrients.macronutrients.unwrap().calories_kcal,
            Some(240.0)
        );
    }

    #[tokio::test]
    async fn test_recipe_fan_out_shares_lookup_permits() {
        let limits = ResolutionLimits::new(2, Duration::from_secs(1), Duration::from_secs(1));
        let portions = MockPortions::new().with_delay(Duration::from_millis(20));
        let peak = portions.peak_handle();
        let orchestrator = ResolutionOrchestrator::new(
            DomainConfig {
                domain: Domain::Nutrition,
                key_policy: CacheKeyPolicy::ByName,
                ttl: Duration::from_secs(60),
            },
            vec![Arc::new(MockTier::hit(1, 1.0, chicken()))],
            None,
            limits.clone(),
        )
        .unwrap();
        let converter = UnitConverter::new(Arc::new(portions)).with_permits(limits.permits.clone());
        let svc = NutritionService::new(Arc::new(orchestrator), converter);

        let ingredients: Vec<_> = (1..=6)
            .map(|id| RecipeIngredient {
                ingredient_id: id,
                name: Some("chicken breast".to_string()),
                quantity: Some(Quantity::new(1.0, Unit::Cup).unwrap()),
            })
            .collect();

        let result = svc.recipe(&ingredients).await;
        assert_eq!(result.resolved.len(), 6);
        assert!(peak.load(std::sync::atomic::Ordering::SeqCst) <= 2);
        assert_eq!(limits.permits.available_permits(), 2);
    }
}
