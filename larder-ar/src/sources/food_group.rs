//! Food-group average price table

use async_trait::async_trait;
use tracing::{debug, warn};

use super::ExternalAttributeSource;
use crate::db::{IngredientRepository, PriceRow, PricingRepository};

/// Category-level average price for ingredients without their own price
#[derive(Clone)]
pub struct FoodGroupAverageSource {
    ingredients: IngredientRepository,
    pricing: PricingRepository,
}

impl FoodGroupAverageSource {
    pub fn new(ingredients: IngredientRepository, pricing: PricingRepository) -> Self {
        Self { ingredients, pricing }
    }

    /// Average price for the food group of `ingredient_id`
    pub async fn for_ingredient(&self, ingredient_id: i64) -> Option<PriceRow> {
        let group = match self.ingredients.food_group(ingredient_id).await {
            Ok(Some(group)) => group,
            Ok(None) => {
                debug!(ingredient_id, "Ingredient has no food group");
                return None;
            }
            Err(e) => {
                warn!(ingredient_id, error = %e, "Food group lookup failed");
                return None;
            }
        };

        match self.pricing.price_by_food_group(group).await {
            Ok(row) => row,
            Err(e) => {
                warn!(ingredient_id, food_group = group.as_str(), error = %e, "Food group price lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl ExternalAttributeSource<PriceRow> for FoodGroupAverageSource {
    fn name(&self) -> &'static str {
        "food_group_average"
    }

    fn data_source(&self) -> &'static str {
        "FOOD_GROUP_AVERAGE"
    }

    async fn search_by_name(&self, name: &str) -> Option<PriceRow> {
        let ingredient = match self.ingredients.find_by_name(name).await {
            Ok(Some(ingredient)) => ingredient,
            Ok(None) => return None,
            Err(e) => {
                warn!(ingredient = name, error = %e, "Ingredient lookup failed");
                return None;
            }
        };
        self.for_ingredient(ingredient.ingredient_id).await
    }
}
