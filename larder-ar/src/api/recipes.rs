//! Recipe-level endpoints
//!
//! The ingredient list comes from the Recipe Management Service. Ingredients
//! that cannot be resolved are reported in `missingIngredients`; any such
//! ingredient turns the status into 206 with an `X-Partial-Content` header
//! listing their ids.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::views::{RecipeAllergenResponse, RecipeNutritionResponse, RecipeShoppingResponse};
use crate::recipes::Recipe;
use crate::{ApiError, ApiResult, AppState};

pub const PARTIAL_CONTENT_HEADER: &str = "x-partial-content";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionParams {
    pub include_total: Option<bool>,
    pub include_ingredients: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllergenParams {
    pub include_ingredient_details: Option<bool>,
}

/// 200, or 206 with `X-Partial-Content: <ids>` when ingredients are missing
fn recipe_response<T: Serialize>(body: T, missing: &BTreeSet<i64>) -> Response {
    if missing.is_empty() {
        return (StatusCode::OK, Json(body)).into_response();
    }

    let ids = missing.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    let mut response = (StatusCode::PARTIAL_CONTENT, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&ids) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(PARTIAL_CONTENT_HEADER), value);
    }
    response
}

async fn fetch_recipe(state: &AppState, recipe_id: i64) -> ApiResult<Recipe> {
    let recipe = state.recipes.fetch_recipe(recipe_id).await.map_err(ApiError::from)?;
    debug!(recipe_id, ingredients = recipe.ingredients.len(), "Fetched recipe");
    Ok(recipe)
}

/// GET /recipes/{id}/nutritional-info?includeTotal&includeIngredients
pub async fn get_recipe_nutrition(
    State(state): State<AppState>,
    Path(recipe_id): Path<i64>,
    Query(params): Query<NutritionParams>,
) -> ApiResult<Response> {
    let recipe = fetch_recipe(&state, recipe_id).await?;
    let result = state.nutrition.recipe(&recipe.ingredients).await;

    info!(
        recipe_id,
        resolved = result.resolved.len(),
        missing = result.missing_ingredient_ids.len(),
        "Recipe nutrition"
    );

    let body = RecipeNutritionResponse::build(
        recipe_id,
        &result,
        params.include_total.unwrap_or(true),
        params.include_ingredients.unwrap_or(false),
    );
    Ok(recipe_response(body, &result.missing_ingredient_ids))
}

/// GET /recipes/{id}/allergens?includeIngredientDetails
pub async fn get_recipe_allergens(
    State(state): State<AppState>,
    Path(recipe_id): Path<i64>,
    Query(params): Query<AllergenParams>,
) -> ApiResult<Response> {
    let recipe = fetch_recipe(&state, recipe_id).await?;
    let result = state.allergens.recipe(&recipe.ingredients).await;

    info!(
        recipe_id,
        resolved = result.resolved.len(),
        missing = result.missing_ingredient_ids.len(),
        contains = result.summary.contains.len(),
        "Recipe allergens"
    );

    let body = RecipeAllergenResponse::build(
        recipe_id,
        &result,
        params.include_ingredient_details.unwrap_or(false),
    );
    Ok(recipe_response(body, &result.missing_ingredient_ids))
}

/// GET /recipes/{id}/shopping-info
pub async fn get_recipe_shopping(
    State(state): State<AppState>,
    Path(recipe_id): Path<i64>,
) -> ApiResult<Response> {
    let recipe = fetch_recipe(&state, recipe_id).await?;
    let result = state.shopping.recipe(&recipe.ingredients).await;

    info!(
        recipe_id,
        resolved = result.resolved.len(),
        missing = result.missing_ingredient_ids.len(),
        "Recipe shopping"
    );

    let body = RecipeShoppingResponse::build(recipe_id, &result);
    Ok(recipe_response(body, &result.missing_ingredient_ids))
}

/// Build recipe routes
pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes/:id/nutritional-info", get(get_recipe_nutrition))
        .route("/recipes/:id/allergens", get(get_recipe_allergens))
        .route("/recipes/:id/shopping-info", get(get_recipe_shopping))
}
