//! Shared fixtures for larder-ar integration tests
//!
//! Builds an in-memory ingredient datastore with a handful of seeded
//! ingredients, plus test doubles for the recipe service and Open Food Facts.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use larder_ar::cache::{CacheStore, MemoryCache};
use larder_ar::domains::allergens::{AllergenEntry, AllergenProfile};
use larder_ar::domains::RecipeIngredient;
use larder_ar::recipes::{Recipe, RecipeClientError, RecipeSource};
use larder_ar::services::{build_services, AllergenSources, Services};
use larder_ar::sources::ExternalAttributeSource;
use larder_ar::{build_router, AppState};
use larder_common::config::LarderConfig;
use larder_common::{Allergen, PresenceType, Quantity, Unit};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const CHICKEN: i64 = 1;
pub const BUTTER: i64 = 2;
pub const DARK_CHOCOLATE: i64 = 3;
pub const KALE: i64 = 4;
pub const RICE: i64 = 5;
pub const GARLIC: i64 = 6;
/// Referenced by recipes, known to no data source
pub const UNICORN_MEAT: i64 = 99;

/// Recipe: chicken 150 g, butter 1 cup, unicorn-meat 50 g
pub const DINNER_RECIPE: i64 = 10;
/// Recipe: butter, dark chocolate
pub const DESSERT_RECIPE: i64 = 20;
/// Recipe: kale 200 g, rice 1 cup, garlic 2 cloves
pub const SIDE_RECIPE: i64 = 30;
/// Recipe id for which the recipe service is unreachable
pub const UNREACHABLE_RECIPE: i64 = 503;

const SEED: &[&str] = &[
    r#"INSERT INTO ingredients (ingredient_id, name, fdc_id, usda_food_description) VALUES
        (1, 'chicken breast', 171077, 'Chicken, broilers or fryers, breast, meat only, raw'),
        (2, 'butter', 173410, 'Butter, salted'),
        (3, 'dark chocolate', NULL, NULL),
        (4, 'kale', 168421, 'Kale, raw'),
        (5, 'rice', 168878, 'Rice, white, long-grain, cooked'),
        (6, 'garlic', 169230, 'Garlic, raw')"#,
    r#"INSERT INTO nutrition_profiles (nutrition_profile_id, ingredient_id, data_source, food_group) VALUES
        (1, 1, 'USDA', 'POULTRY'),
        (2, 2, 'USDA', 'DAIRY'),
        (3, 4, 'USDA', 'VEGETABLES'),
        (4, 5, 'USDA', 'GRAINS')"#,
    r#"INSERT INTO macronutrients (nutrition_profile_id, calories_kcal, protein_g, carbs_g, fat_g, sodium_mg) VALUES
        (1, 120.0, 22.5, 0.0, 2.6, 45.0),
        (2, 717.0, 0.85, 0.06, 81.11, 643.0),
        (3, 49.0, 4.28, 8.75, 0.93, 38.0),
        (4, 130.0, 2.69, 28.17, 0.28, 1.0)"#,
    r#"INSERT INTO minerals (nutrition_profile_id, calcium_mg, iron_mg) VALUES
        (1, 5.0, 0.4)"#,
    r#"INSERT INTO ingredient_portions (portion_id, ingredient_id, unit, modifier, gram_weight, sequence_number) VALUES
        (1, 2, 'CUP', 'melted', 236.0, 0),
        (2, 2, 'CUP', NULL, 227.0, 1),
        (3, 2, 'TBSP', NULL, 14.2, 2)"#,
    r#"INSERT INTO allergen_profiles (allergen_profile_id, ingredient_id, data_source) VALUES
        (1, 2, 'USDA'),
        (2, 3, 'MANUAL'),
        (3, 6, 'USDA')"#,
    r#"INSERT INTO ingredient_allergens (allergen_profile_id, allergen_type, presence_type, confidence_score, source_notes) VALUES
        (1, 'MILK', 'CONTAINS', 1.0, NULL),
        (2, 'MILK', 'MAY_CONTAIN', 0.9, 'Shared equipment with milk chocolate'),
        (2, 'SOYBEANS', 'CONTAINS', 1.0, 'Soy lecithin'),
        (2, 'TREE_NUTS', 'TRACES', 0.7, NULL)"#,
    r#"INSERT INTO ingredient_pricing (ingredient_id, price_per_100g, currency, data_source, source_year) VALUES
        (1, 0.89, 'USD', 'USDA_ERS', 2022),
        (1, 0.99, 'USD', 'USDA_ERS', 2023),
        (2, 1.10, 'USD', 'USDA_ERS', 2023)"#,
    r#"INSERT INTO food_group_pricing (food_group, avg_price_per_100g, currency, data_source) VALUES
        ('VEGETABLES', 0.45, 'USD', 'FOOD_GROUP_AVERAGE'),
        ('GRAINS', 0.20, 'USD', 'FOOD_GROUP_AVERAGE')"#,
];

/// In-memory datastore with the fixture rows
pub async fn seeded_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Should open in-memory database");

    larder_common::db::schema::create_tables(&pool)
        .await
        .expect("Should create schema");

    for statement in SEED {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Should seed fixture rows");
    }

    pool
}

// =============================================================================
// Test doubles
// =============================================================================

/// Open Food Facts stand-in with a fixed product table
pub struct MockOpenFoodFacts {
    products: Mutex<HashMap<String, AllergenProfile>>,
    calls: AtomicUsize,
}

impl MockOpenFoodFacts {
    pub fn new() -> Self {
        let mut products = HashMap::new();
        products.insert(
            "wheat flour".to_string(),
            AllergenProfile {
                ingredient_id: None,
                ingredient_name: Some("Organic Wheat Flour".to_string()),
                usda_food_description: None,
                allergens: vec![
                    off_entry(Allergen::Gluten, PresenceType::Contains),
                    off_entry(Allergen::Wheat, PresenceType::Contains),
                ],
            },
        );
        Self {
            products: Mutex::new(products),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make `name` searchable with the given allergens
    pub fn add_product(&self, name: &str, allergens: Vec<AllergenEntry>) {
        self.products.lock().unwrap().insert(
            name.to_lowercase(),
            AllergenProfile {
                ingredient_id: None,
                ingredient_name: Some(name.to_string()),
                usda_food_description: None,
                allergens,
            },
        );
    }
}

pub fn off_entry(allergen: Allergen, presence_type: PresenceType) -> AllergenEntry {
    AllergenEntry {
        allergen,
        presence_type,
        confidence_score: 0.95,
        source_notes: Some("From Open Food Facts: Organic Wheat Flour".to_string()),
    }
}

#[async_trait]
impl ExternalAttributeSource<AllergenProfile> for MockOpenFoodFacts {
    fn name(&self) -> &'static str {
        "open_food_facts"
    }

    fn data_source(&self) -> &'static str {
        "OPEN_FOOD_FACTS"
    }

    async fn search_by_name(&self, name: &str) -> Option<AllergenProfile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.products.lock().unwrap().get(&name.to_lowercase()).cloned()
    }
}

fn line(ingredient_id: i64, name: &str, quantity: Option<Quantity>) -> RecipeIngredient {
    RecipeIngredient {
        ingredient_id,
        name: Some(name.to_string()),
        quantity,
    }
}

fn qty(amount: f64, unit: Unit) -> Option<Quantity> {
    Some(Quantity::new(amount, unit).unwrap())
}

/// Recipe service stand-in
pub struct MockRecipes {
    recipes: HashMap<i64, Recipe>,
}

impl MockRecipes {
    pub fn new() -> Self {
        let recipes = [
            Recipe {
                id: DINNER_RECIPE,
                title: Some("Buttered chicken".to_string()),
                ingredients: vec![
                    line(CHICKEN, "chicken breast", qty(150.0, Unit::G)),
                    line(BUTTER, "butter", qty(1.0, Unit::Cup)),
                    line(UNICORN_MEAT, "unicorn-meat", qty(50.0, Unit::G)),
                ],
            },
            Recipe {
                id: DESSERT_RECIPE,
                title: Some("Chocolate butter".to_string()),
                ingredients: vec![
                    line(BUTTER, "butter", qty(2.0, Unit::Tbsp)),
                    line(DARK_CHOCOLATE, "dark chocolate", qty(100.0, Unit::G)),
                ],
            },
            Recipe {
                id: SIDE_RECIPE,
                title: Some("Garlic kale rice".to_string()),
                ingredients: vec![
                    line(KALE, "kale", qty(200.0, Unit::G)),
                    line(RICE, "rice", qty(1.0, Unit::Cup)),
                    line(GARLIC, "garlic", qty(2.0, Unit::Clove)),
                ],
            },
        ];

        Self {
            recipes: recipes.into_iter().map(|r| (r.id, r)).collect(),
        }
    }
}

#[async_trait]
impl RecipeSource for MockRecipes {
    async fn fetch_recipe(&self, recipe_id: i64) -> Result<Recipe, RecipeClientError> {
        if recipe_id == UNREACHABLE_RECIPE {
            return Err(RecipeClientError::Unavailable("connection refused".to_string()));
        }
        self.recipes
            .get(&recipe_id)
            .cloned()
            .ok_or(RecipeClientError::NotFound(recipe_id))
    }
}

// =============================================================================
// Assembled service
// =============================================================================

pub struct TestContext {
    pub pool: SqlitePool,
    pub services: Services,
    pub cache: Arc<MemoryCache>,
    pub off: Arc<MockOpenFoodFacts>,
}

impl TestContext {
    pub async fn new() -> Self {
        let pool = seeded_pool().await;
        let cache = Arc::new(MemoryCache::new());
        let off = Arc::new(MockOpenFoodFacts::new());

        let services = build_services(
            pool.clone(),
            &LarderConfig::default(),
            Some(cache.clone() as Arc<dyn CacheStore>),
            AllergenSources {
                external: Some(off.clone()),
                inference: None,
            },
        )
        .expect("Should build services");

        Self {
            pool,
            services,
            cache,
            off,
        }
    }

    pub fn router(&self) -> Router {
        let state = AppState::new(
            self.services.clone(),
            Arc::new(MockRecipes::new()),
            larder_ar::db::IngredientRepository::new(self.pool.clone()),
        );
        build_router(state)
    }
}

/// GET request with an empty body
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Extract JSON body from a response
pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}
