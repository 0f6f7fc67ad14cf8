//! JSON response shapes
//!
//! Field names are camelCase. Numeric nutrient and confidence values are
//! rounded to two decimals; prices are decimal strings ("12.34").

use larder_common::{Allergen, Quantity};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::domains::allergens::{AllergenEntry, AllergenProfile, RecipeAllergens};
use crate::domains::nutrition::{IngredientNutrition, NutrientSet, RecipeNutrition};
use crate::domains::pricing::{PricedQuantity, RecipeShopping, DEFAULT_CURRENCY};
use crate::types::{round2, AttributeRecord};

/// Price as a two-decimal string
pub fn format_price(value: f64) -> String {
    format!("{:.2}", value)
}

fn missing_list(ids: &BTreeSet<i64>) -> Vec<i64> {
    ids.iter().copied().collect()
}

// ============================================================================
// Nutrition
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutrientValue {
    pub amount: f64,
    pub measurement: &'static str,
}

fn nutrient(value: Option<f64>, measurement: &'static str) -> Option<NutrientValue> {
    value.map(|v| NutrientValue {
        amount: round2(v),
        measurement,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FatsView {
    pub total: Option<NutrientValue>,
    pub saturated: Option<NutrientValue>,
    pub monounsaturated: Option<NutrientValue>,
    pub polyunsaturated: Option<NutrientValue>,
    pub trans: Option<NutrientValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroNutrientsView {
    pub calories: Option<NutrientValue>,
    pub carbs: Option<NutrientValue>,
    pub protein: Option<NutrientValue>,
    pub cholesterol: Option<NutrientValue>,
    pub sodium: Option<NutrientValue>,
    pub fiber: Option<NutrientValue>,
    pub sugar: Option<NutrientValue>,
    pub added_sugar: Option<NutrientValue>,
    pub fats: FatsView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VitaminsView {
    pub vitamin_a: Option<NutrientValue>,
    pub vitamin_b6: Option<NutrientValue>,
    pub vitamin_b12: Option<NutrientValue>,
    pub vitamin_c: Option<NutrientValue>,
    pub vitamin_d: Option<NutrientValue>,
    pub vitamin_e: Option<NutrientValue>,
    pub vitamin_k: Option<NutrientValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MineralsView {
    pub calcium: Option<NutrientValue>,
    pub iron: Option<NutrientValue>,
    pub magnesium: Option<NutrientValue>,
    pub potassium: Option<NutrientValue>,
    pub zinc: Option<NutrientValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NutrientsView {
    pub macro_nutrients: Option<MacroNutrientsView>,
    pub vitamins: Option<VitaminsView>,
    pub minerals: Option<MineralsView>,
}

impl From<&NutrientSet> for NutrientsView {
    fn from(set: &NutrientSet) -> Self {
        Self {
            macro_nutrients: set.macronutrients.as_ref().map(|m| MacroNutrientsView {
                calories: nutrient(m.calories_kcal, "KCAL"),
                carbs: nutrient(m.carbs_g, "G"),
                protein: nutrient(m.protein_g, "G"),
                cholesterol: nutrient(m.cholesterol_mg, "MG"),
                sodium: nutrient(m.sodium_mg, "MG"),
                fiber: nutrient(m.fiber_g, "G"),
                sugar: nutrient(m.sugar_g, "G"),
                added_sugar: nutrient(m.added_sugar_g, "G"),
                fats: FatsView {
                    total: nutrient(m.fat_g, "G"),
                    saturated: nutrient(m.saturated_fat_g, "G"),
                    monounsaturated: nutrient(m.monounsaturated_fat_g, "G"),
                    polyunsaturated: nutrient(m.polyunsaturated_fat_g, "G"),
                    trans: nutrient(m.trans_fat_g, "G"),
                },
            }),
            vitamins: set.vitamins.as_ref().map(|v| VitaminsView {
                vitamin_a: nutrient(v.vitamin_a_mcg, "MCG"),
                vitamin_b6: nutrient(v.vitamin_b6_mcg, "MCG"),
                vitamin_b12: nutrient(v.vitamin_b12_mcg, "MCG"),
                vitamin_c: nutrient(v.vitamin_c_mcg, "MCG"),
                vitamin_d: nutrient(v.vitamin_d_mcg, "MCG"),
                vitamin_e: nutrient(v.vitamin_e_mcg, "MCG"),
                vitamin_k: nutrient(v.vitamin_k_mcg, "MCG"),
            }),
            minerals: set.minerals.as_ref().map(|m| MineralsView {
                calcium: nutrient(m.calcium_mg, "MG"),
                iron: nutrient(m.iron_mg, "MG"),
                magnesium: nutrient(m.magnesium_mg, "MG"),
                potassium: nutrient(m.potassium_mg, "MG"),
                zinc: nutrient(m.zinc_mg, "MG"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientNutritionResponse {
    pub ingredient_id: Option<i64>,
    pub ingredient_name: String,
    pub quantity: Quantity,
    pub usda_food_description: Option<String>,
    #[serde(flatten)]
    pub nutrients: NutrientsView,
    pub data_source: String,
    pub confidence: f64,
    pub tier: u8,
}

impl From<&IngredientNutrition> for IngredientNutritionResponse {
    fn from(n: &IngredientNutrition) -> Self {
        Self {
            ingredient_id: n.ingredient_id,
            ingredient_name: n.ingredient_name.clone(),
            quantity: n.quantity,
            usda_food_description: n.usda_food_description.clone(),
            nutrients: NutrientsView::from(&n.nutrients),
            data_source: n.data_source.clone(),
            confidence: round2(n.confidence),
            tier: n.tier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionTotalView {
    /// Total resolved weight in grams
    pub quantity: Quantity,
    #[serde(flatten)]
    pub nutrients: NutrientsView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeNutritionResponse {
    pub recipe_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<BTreeMap<i64, IngredientNutritionResponse>>,
    pub missing_ingredients: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<NutritionTotalView>,
}

impl RecipeNutritionResponse {
    pub fn build(recipe_id: i64, result: &RecipeNutrition, include_total: bool, include_ingredients: bool) -> Self {
        let ingredients = include_ingredients.then(|| {
            result
                .resolved
                .iter()
                .map(|(line, n)| (line.ingredient_id, IngredientNutritionResponse::from(n)))
                .collect()
        });

        let total = include_total.then(|| NutritionTotalView {
            quantity: Quantity::grams(round2(result.summary.grams)),
            nutrients: NutrientsView::from(&result.summary.nutrients),
        });

        Self {
            recipe_id,
            ingredients,
            missing_ingredients: missing_list(&result.missing_ingredient_ids),
            total,
        }
    }
}

// ============================================================================
// Allergens
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientAllergenResponse {
    pub ingredient_id: Option<i64>,
    pub ingredient_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usda_food_description: Option<String>,
    pub allergens: Vec<AllergenEntry>,
    pub data_source: String,
    pub overall_confidence: f64,
    pub tier: u8,
}

impl IngredientAllergenResponse {
    pub fn build(ingredient_id: Option<i64>, name: &str, record: &AttributeRecord<AllergenProfile>) -> Self {
        Self {
            ingredient_id: ingredient_id.or(record.payload.ingredient_id),
            ingredient_name: name.trim().to_string(),
            usda_food_description: record.payload.usda_food_description.clone(),
            allergens: record.payload.allergens.clone(),
            data_source: record.data_source.clone(),
            overall_confidence: round2(record.confidence),
            tier: record.tier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeAllergenResponse {
    pub recipe_id: i64,
    pub contains: Vec<Allergen>,
    pub may_contain: Vec<Allergen>,
    pub allergens: Vec<AllergenEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredient_details: Option<BTreeMap<i64, IngredientAllergenResponse>>,
    pub missing_ingredients: Vec<i64>,
}

impl RecipeAllergenResponse {
    pub fn build(recipe_id: i64, result: &RecipeAllergens, include_details: bool) -> Self {
        let ingredient_details = include_details.then(|| {
            result
                .resolved
                .iter()
                .map(|(line, record)| {
                    let name = line.name.as_deref().unwrap_or_default();
                    (
                        line.ingredient_id,
                        IngredientAllergenResponse::build(Some(line.ingredient_id), name, record),
                    )
                })
                .collect()
        });

        Self {
            recipe_id,
            contains: result.summary.contains.clone(),
            may_contain: result.summary.may_contain.clone(),
            allergens: result.summary.allergens.clone(),
            ingredient_details,
            missing_ingredients: missing_list(&result.missing_ingredient_ids),
        }
    }
}

// ============================================================================
// Shopping
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientShoppingResponse {
    pub ingredient_id: Option<i64>,
    pub ingredient_name: String,
    pub quantity: Quantity,
    pub estimated_price: String,
    pub price_confidence: f64,
    pub data_source: String,
    pub currency: String,
    pub tier: u8,
}

impl IngredientShoppingResponse {
    pub fn build(ingredient_id: Option<i64>, record: &AttributeRecord<PricedQuantity>) -> Self {
        let priced = &record.payload;
        Self {
            ingredient_id,
            ingredient_name: priced.ingredient_name.clone(),
            quantity: priced.quantity,
            estimated_price: format_price(priced.estimated_price),
            price_confidence: round2(record.confidence),
            data_source: record.data_source.clone(),
            currency: priced.currency.clone(),
            tier: record.tier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierCounts {
    pub tier1: usize,
    pub tier2: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeShoppingResponse {
    pub recipe_id: i64,
    pub ingredients: BTreeMap<i64, IngredientShoppingResponse>,
    pub total_estimated_cost: String,
    pub currency: String,
    pub missing_ingredients: Vec<i64>,
    pub tier_counts: TierCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_confidence: Option<f64>,
}

impl RecipeShoppingResponse {
    pub fn build(recipe_id: i64, result: &RecipeShopping) -> Self {
        let totals = &result.summary;
        Self {
            recipe_id,
            ingredients: result
                .resolved
                .iter()
                .map(|(line, record)| {
                    (
                        line.ingredient_id,
                        IngredientShoppingResponse::build(Some(line.ingredient_id), record),
                    )
                })
                .collect(),
            total_estimated_cost: format_price(totals.total_estimated_cost),
            currency: totals.currency.clone().unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            missing_ingredients: missing_list(&result.missing_ingredient_ids),
            tier_counts: TierCounts {
                tier1: totals.tier1_count,
                tier2: totals.tier2_count,
            },
            price_confidence: totals.price_confidence.map(round2),
        }
    }
}
