//! Ingredient identity lookups

use larder_common::{FoodGroup, Result};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::warn;

/// Ingredient identity as owned by the datastore
#[derive(Debug, Clone, PartialEq)]
pub struct Ingredient {
    pub ingredient_id: i64,
    pub name: String,
    /// USDA FoodData Central id, kept for tracing
    pub fdc_id: Option<i64>,
    pub usda_food_description: Option<String>,
}

#[derive(Clone)]
pub struct IngredientRepository {
    db: SqlitePool,
}

impl IngredientRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, ingredient_id: i64) -> Result<Option<Ingredient>> {
        let row = sqlx::query(
            r#"
            SELECT ingredient_id, name, fdc_id, usda_food_description
            FROM ingredients
            WHERE ingredient_id = ?
            "#,
        )
        .bind(ingredient_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| ingredient_from_row(&r)).transpose()
    }

    /// Case-insensitive exact name lookup; the lowest id wins on duplicates
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        let row = sqlx::query(
            r#"
            SELECT ingredient_id, name, fdc_id, usda_food_description
            FROM ingredients
            WHERE LOWER(name) = LOWER(?)
            ORDER BY ingredient_id
            LIMIT 1
            "#,
        )
        .bind(name.trim())
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| ingredient_from_row(&r)).transpose()
    }

    /// Food group from the ingredient's nutrition profile, if classified
    pub async fn food_group(&self, ingredient_id: i64) -> Result<Option<FoodGroup>> {
        let group: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            SELECT food_group
            FROM nutrition_profiles
            WHERE ingredient_id = ? AND food_group IS NOT NULL
            ORDER BY nutrition_profile_id
            LIMIT 1
            "#,
        )
        .bind(ingredient_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(group.and_then(|(g,)| g).and_then(|g| match FoodGroup::from_str(&g) {
            Ok(group) => Some(group),
            Err(e) => {
                warn!(ingredient_id, food_group = %g, error = %e, "Unrecognized food group");
                None
            }
        }))
    }
}

fn ingredient_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Ingredient> {
    Ok(Ingredient {
        ingredient_id: row.try_get("ingredient_id")?,
        name: row.try_get("name")?,
        fdc_id: row.try_get("fdc_id")?,
        usda_food_description: row.try_get("usda_food_description")?,
    })
}
