//! Nutrition profile queries
//!
//! A profile joins `ingredients` → `nutrition_profiles` → the three detail
//! tables. A missing detail row leaves that section `None` rather than zeroed.

use larder_common::{DataSource, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domains::nutrition::{Macronutrients, Minerals, NutritionProfile, Vitamins};

/// A profile plus the provenance recorded on its row
#[derive(Debug, Clone, PartialEq)]
pub struct NutritionRow {
    pub profile: NutritionProfile,
    pub data_source: String,
}

#[derive(Clone)]
pub struct NutritionRepository {
    db: SqlitePool,
}

impl NutritionRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Case-insensitive exact name match
    pub async fn exact_match(&self, name: &str) -> Result<Option<NutritionRow>> {
        let row = sqlx::query(
            r#"
            SELECT i.ingredient_id, i.name, i.fdc_id, i.usda_food_description,
                   np.data_source, np.food_group,
                   m.nutrition_profile_id AS macro_id,
                   m.calories_kcal, m.protein_g, m.carbs_g, m.fat_g,
                   m.saturated_fat_g, m.trans_fat_g, m.monounsaturated_fat_g,
                   m.polyunsaturated_fat_g, m.cholesterol_mg, m.sodium_mg,
                   m.fiber_g, m.sugar_g, m.added_sugar_g,
                   v.nutrition_profile_id AS vitamin_id,
                   v.vitamin_a_mcg, v.vitamin_b6_mcg, v.vitamin_b12_mcg, v.vitamin_c_mcg,
                   v.vitamin_d_mcg, v.vitamin_e_mcg, v.vitamin_k_mcg,
                   mi.nutrition_profile_id AS mineral_id,
                   mi.calcium_mg, mi.iron_mg, mi.magnesium_mg, mi.potassium_mg, mi.zinc_mg
            FROM ingredients i
            JOIN nutrition_profiles np ON np.ingredient_id = i.ingredient_id
            LEFT JOIN macronutrients m ON m.nutrition_profile_id = np.nutrition_profile_id
            LEFT JOIN vitamins v ON v.nutrition_profile_id = np.nutrition_profile_id
            LEFT JOIN minerals mi ON mi.nutrition_profile_id = np.nutrition_profile_id
            WHERE LOWER(i.name) = LOWER(?)
            ORDER BY i.ingredient_id, np.nutrition_profile_id
            LIMIT 1
            "#,
        )
        .bind(name.trim())
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| nutrition_from_row(&r)).transpose()
    }
}

fn nutrition_from_row(row: &SqliteRow) -> Result<NutritionRow> {
    let macro_id: Option<i64> = row.try_get("macro_id")?;
    let vitamin_id: Option<i64> = row.try_get("vitamin_id")?;
    let mineral_id: Option<i64> = row.try_get("mineral_id")?;

    let macronutrients = match macro_id {
        Some(_) => Some(Macronutrients {
            calories_kcal: row.try_get("calories_kcal")?,
            protein_g: row.try_get("protein_g")?,
            carbs_g: row.try_get("carbs_g")?,
            fat_g: row.try_get("fat_g")?,
            saturated_fat_g: row.try_get("saturated_fat_g")?,
            trans_fat_g: row.try_get("trans_fat_g")?,
            monounsaturated_fat_g: row.try_get("monounsaturated_fat_g")?,
            polyunsaturated_fat_g: row.try_get("polyunsaturated_fat_g")?,
            cholesterol_mg: row.try_get("cholesterol_mg")?,
            sodium_mg: row.try_get("sodium_mg")?,
            fiber_g: row.try_get("fiber_g")?,
            sugar_g: row.try_get("sugar_g")?,
            added_sugar_g: row.try_get("added_sugar_g")?,
        }),
        None => None,
    };

    let vitamins = match vitamin_id {
        Some(_) => Some(Vitamins {
            vitamin_a_mcg: row.try_get("vitamin_a_mcg")?,
            vitamin_b6_mcg: row.try_get("vitamin_b6_mcg")?,
            vitamin_b12_mcg: row.try_get("vitamin_b12_mcg")?,
            vitamin_c_mcg: row.try_get("vitamin_c_mcg")?,
            vitamin_d_mcg: row.try_get("vitamin_d_mcg")?,
            vitamin_e_mcg: row.try_get("vitamin_e_mcg")?,
            vitamin_k_mcg: row.try_get("vitamin_k_mcg")?,
        }),
        None => None,
    };

    let minerals = match mineral_id {
        Some(_) => Some(Minerals {
            calcium_mg: row.try_get("calcium_mg")?,
            iron_mg: row.try_get("iron_mg")?,
            magnesium_mg: row.try_get("magnesium_mg")?,
            potassium_mg: row.try_get("potassium_mg")?,
            zinc_mg: row.try_get("zinc_mg")?,
        }),
        None => None,
    };

    let data_source: Option<String> = row.try_get("data_source")?;

    Ok(NutritionRow {
        profile: NutritionProfile {
            ingredient_id: row.try_get("ingredient_id")?,
            ingredient_name: row.try_get("name")?,
            fdc_id: row.try_get("fdc_id")?,
            usda_food_description: row.try_get("usda_food_description")?,
            food_group: row.try_get("food_group")?,
            macronutrients,
            vitamins,
            minerals,
        },
        data_source: data_source.unwrap_or_else(|| DataSource::Usda.to_string()),
    })
}
