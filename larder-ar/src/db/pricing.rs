//! Price queries: ingredient-specific and food-group averages

use larder_common::{FoodGroup, Result};
use sqlx::SqlitePool;

/// A price per 100 g and its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub price_per_100g: f64,
    pub currency: String,
    pub data_source: String,
}

#[derive(Clone)]
pub struct PricingRepository {
    db: SqlitePool,
}

impl PricingRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Most recent ingredient-specific price
    pub async fn price_by_ingredient_id(&self, ingredient_id: i64) -> Result<Option<PriceRow>> {
        let row: Option<(f64, String, String)> = sqlx::query_as(
            r#"
            SELECT price_per_100g, currency, data_source
            FROM ingredient_pricing
            WHERE ingredient_id = ?
            ORDER BY COALESCE(source_year, 0) DESC
            LIMIT 1
            "#,
        )
        .bind(ingredient_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(price_per_100g, currency, data_source)| PriceRow {
            price_per_100g,
            currency,
            data_source,
        }))
    }

    /// Average price for a food group
    pub async fn price_by_food_group(&self, group: FoodGroup) -> Result<Option<PriceRow>> {
        let row: Option<(f64, String, String)> = sqlx::query_as(
            r#"
            SELECT avg_price_per_100g, currency, data_source
            FROM food_group_pricing
            WHERE UPPER(food_group) = ?
            "#,
        )
        .bind(group.as_str())
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(price_per_100g, currency, data_source)| PriceRow {
            price_per_100g,
            currency,
            data_source,
        }))
    }
}
