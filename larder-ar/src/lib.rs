//! larder-ar: ingredient attribute resolver
//!
//! Resolves nutrition, allergen and price attributes for ingredients through
//! tiered data sources and aggregates them into recipe-level answers.

pub mod api;
pub mod cache;
pub mod db;
pub mod domains;
pub mod error;
pub mod recipes;
pub mod resolution;
pub mod services;
pub mod sources;
pub mod types;
pub mod units;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::db::IngredientRepository;
use crate::domains::allergens::AllergenService;
use crate::domains::nutrition::NutritionService;
use crate::domains::pricing::ShoppingService;
use crate::recipes::RecipeSource;
use crate::services::Services;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub nutrition: Arc<NutritionService>,
    pub allergens: Arc<AllergenService>,
    pub shopping: Arc<ShoppingService>,
    /// Recipe Management Service
    pub recipes: Arc<dyn RecipeSource>,
    /// Resolves `{id}` path segments to ingredient names
    pub ingredients: IngredientRepository,
    /// Bound on `ingredients` queries
    pub datastore_timeout: Duration,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(services: Services, recipes: Arc<dyn RecipeSource>, ingredients: IngredientRepository) -> Self {
        Self {
            nutrition: services.nutrition,
            allergens: services.allergens,
            shopping: services.shopping,
            recipes,
            ingredients,
            datastore_timeout: services.datastore_timeout,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::ingredient_routes())
        .merge(api::recipe_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
