//! USDA-derived ingredient schema
//!
//! The resolver never runs this DDL against the production datastore. It exists
//! so tests and local development can build a datastore with the same shape.

use sqlx::SqlitePool;

use crate::Result;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS ingredients (
        ingredient_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        fdc_id INTEGER,
        usda_food_description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS nutrition_profiles (
        nutrition_profile_id INTEGER PRIMARY KEY,
        ingredient_id INTEGER NOT NULL REFERENCES ingredients(ingredient_id),
        serving_size_g REAL NOT NULL DEFAULT 100,
        data_source TEXT NOT NULL DEFAULT 'USDA',
        food_group TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS macronutrients (
        nutrition_profile_id INTEGER PRIMARY KEY REFERENCES nutrition_profiles(nutrition_profile_id),
        calories_kcal REAL,
        protein_g REAL,
        carbs_g REAL,
        fat_g REAL,
        saturated_fat_g REAL,
        trans_fat_g REAL,
        monounsaturated_fat_g REAL,
        polyunsaturated_fat_g REAL,
        cholesterol_mg REAL,
        sodium_mg REAL,
        fiber_g REAL,
        sugar_g REAL,
        added_sugar_g REAL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vitamins (
        nutrition_profile_id INTEGER PRIMARY KEY REFERENCES nutrition_profiles(nutrition_profile_id),
        vitamin_a_mcg REAL,
        vitamin_b6_mcg REAL,
        vitamin_b12_mcg REAL,
        vitamin_c_mcg REAL,
        vitamin_d_mcg REAL,
        vitamin_e_mcg REAL,
        vitamin_k_mcg REAL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS minerals (
        nutrition_profile_id INTEGER PRIMARY KEY REFERENCES nutrition_profiles(nutrition_profile_id),
        calcium_mg REAL,
        iron_mg REAL,
        magnesium_mg REAL,
        potassium_mg REAL,
        zinc_mg REAL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ingredient_portions (
        portion_id INTEGER PRIMARY KEY,
        ingredient_id INTEGER NOT NULL REFERENCES ingredients(ingredient_id),
        unit TEXT NOT NULL,
        modifier TEXT,
        gram_weight REAL NOT NULL,
        sequence_number INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS allergen_profiles (
        allergen_profile_id INTEGER PRIMARY KEY,
        ingredient_id INTEGER NOT NULL REFERENCES ingredients(ingredient_id),
        data_source TEXT NOT NULL DEFAULT 'USDA',
        confidence_score REAL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ingredient_allergens (
        allergen_profile_id INTEGER NOT NULL REFERENCES allergen_profiles(allergen_profile_id),
        allergen_type TEXT NOT NULL,
        presence_type TEXT NOT NULL DEFAULT 'CONTAINS',
        confidence_score REAL,
        source_notes TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ingredient_pricing (
        ingredient_id INTEGER NOT NULL REFERENCES ingredients(ingredient_id),
        price_per_100g REAL NOT NULL,
        currency TEXT NOT NULL DEFAULT 'USD',
        data_source TEXT NOT NULL,
        source_year INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS food_group_pricing (
        food_group TEXT PRIMARY KEY,
        avg_price_per_100g REAL NOT NULL,
        currency TEXT NOT NULL DEFAULT 'USD',
        data_source TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ingredients_name ON ingredients(name COLLATE NOCASE)",
    "CREATE INDEX IF NOT EXISTS idx_portions_ingredient ON ingredient_portions(ingredient_id, unit)",
];

/// Create every datastore table if missing
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    for ddl in TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }
    tracing::debug!(tables = TABLES.len(), "Ingredient schema ready");
    Ok(())
}
