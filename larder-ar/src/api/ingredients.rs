//! Single-ingredient endpoints
//!
//! `{id}` is the datastore ingredient id; a non-numeric segment is taken as an
//! ingredient name. Unresolvable ingredients fail loudly (404 / 422).

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use larder_common::{Quantity, Unit};
use serde::Deserialize;
use std::future::Future;
use std::str::FromStr;
use tracing::{debug, warn};

use super::views::{IngredientAllergenResponse, IngredientNutritionResponse, IngredientShoppingResponse};
use crate::types::LookupRequest;
use crate::{ApiError, ApiResult, AppState};

/// `?amount=&measurement=` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct QuantityParams {
    pub amount: Option<String>,
    pub measurement: Option<String>,
}

impl QuantityParams {
    /// Requested quantity; both parameters or neither (100 g)
    pub fn parse(&self) -> ApiResult<Quantity> {
        let (amount, measurement) = match (self.amount.as_deref(), self.measurement.as_deref()) {
            (None, None) => return Ok(Quantity::default_serving()),
            (Some(amount), Some(measurement)) => (amount, measurement),
            _ => {
                return Err(ApiError::bad_request(
                    "INVALID_QUANTITY_PARAMS",
                    "amount and measurement must be provided together",
                ))
            }
        };

        let amount: f64 = amount.trim().parse().map_err(|_| {
            ApiError::bad_request("INVALID_QUANTITY_PARAMS", format!("amount is not a number: {}", amount))
        })?;
        let unit = Unit::from_str(measurement).map_err(|_| {
            ApiError::bad_request("INVALID_UNIT", format!("unknown measurement unit: {}", measurement))
        })?;

        Quantity::new(amount, unit).map_err(|e| ApiError::bad_request("INVALID_QUANTITY_PARAMS", e.to_string()))
    }
}

/// Resolve the `{id}` path segment to a lookup
///
/// Numeric ids must exist in the datastore. Names are used as given, with the
/// id filled in when the datastore knows the name. A failed or slow datastore
/// is a degraded lookup: an id is then unknown (404), while a name still goes
/// to the tiers, where sources outside the datastore can answer it.
async fn lookup_for(state: &AppState, id: &str) -> ApiResult<LookupRequest> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::bad_request("INVALID_INGREDIENT", "ingredient id is empty"));
    }

    if let Ok(ingredient_id) = id.parse::<i64>() {
        let found = bounded(state, state.ingredients.find_by_id(ingredient_id))
            .await
            .unwrap_or_else(|e| {
                warn!(ingredient_id, error = %e, "Degraded ingredient lookup, reporting not found");
                None
            });
        return match found {
            Some(ingredient) => Ok(LookupRequest::by_name(ingredient.name).with_id(ingredient_id)),
            None => Err(ApiError::NotFound(format!("Ingredient {} not found", ingredient_id))),
        };
    }

    let request = LookupRequest::by_name(id);
    match bounded(state, state.ingredients.find_by_name(id)).await {
        Ok(Some(ingredient)) => Ok(request.with_id(ingredient.ingredient_id)),
        Ok(None) => Ok(request),
        Err(e) => {
            warn!(ingredient = id, error = %e, "Degraded ingredient lookup, resolving by name only");
            Ok(request)
        }
    }
}

/// Run an identity query under the datastore timeout
async fn bounded<T>(
    state: &AppState,
    query: impl Future<Output = larder_common::Result<T>>,
) -> larder_common::Result<T> {
    tokio::time::timeout(state.datastore_timeout, query)
        .await
        .map_err(|_| {
            larder_common::Error::Internal(format!(
                "ingredient lookup timed out after {:?}",
                state.datastore_timeout
            ))
        })?
}

/// GET /ingredients/{id}/nutritional-info?amount&measurement
///
/// **Errors:**
/// - 400: incomplete quantity parameters or unknown unit
/// - 404: unknown ingredient or no nutrition data
/// - 422: count unit without a recorded portion weight
pub async fn get_nutritional_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<QuantityParams>,
) -> ApiResult<Json<IngredientNutritionResponse>> {
    let quantity = params.parse()?;
    let request = lookup_for(&state, &id).await?;
    debug!(ingredient = %request.name, amount = quantity.amount, unit = %quantity.measurement, "Nutrition request");

    let nutrition = state.nutrition.ingredient(&request, quantity).await?;
    Ok(Json(IngredientNutritionResponse::from(&nutrition)))
}

/// GET /ingredients/{id}/allergens
pub async fn get_allergens(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<IngredientAllergenResponse>> {
    let request = lookup_for(&state, &id).await?;
    let record = state.allergens.ingredient(&request).await?;
    Ok(Json(IngredientAllergenResponse::build(
        request.ingredient_id,
        &request.name,
        &record,
    )))
}

/// GET /ingredients/{id}/shopping-info?amount&measurement
///
/// 404 when the ingredient is unknown or neither pricing tier has a price.
pub async fn get_shopping_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<QuantityParams>,
) -> ApiResult<Json<IngredientShoppingResponse>> {
    let quantity = params.parse()?;
    let request = lookup_for(&state, &id).await?.with_quantity(quantity);

    let record = state.shopping.ingredient(&request).await?;
    Ok(Json(IngredientShoppingResponse::build(request.ingredient_id, &record)))
}

/// Build single-ingredient routes
pub fn ingredient_routes() -> Router<AppState> {
    Router::new()
        .route("/ingredients/:id/nutritional-info", get(get_nutritional_info))
        .route("/ingredients/:id/allergens", get(get_allergens))
        .route("/ingredients/:id/shopping-info", get(get_shopping_info))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(amount: Option<&str>, measurement: Option<&str>) -> QuantityParams {
        QuantityParams {
            amount: amount.map(str::to_string),
            measurement: measurement.map(str::to_string),
        }
    }

    fn code(err: ApiError) -> &'static str {
        match err {
            ApiError::BadRequest { code, .. } => code,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_quantity_defaults_to_100_grams() {
        assert_eq!(params(None, None).parse().unwrap(), Quantity::default_serving());
    }

    #[test]
    fn test_quantity_parses_units_case_insensitively() {
        let q = params(Some("1.5"), Some("cup")).parse().unwrap();
        assert_eq!((q.amount, q.measurement), (1.5, Unit::Cup));
        assert_eq!(params(Some("2"), Some("fl-oz")).parse().unwrap().measurement, Unit::FlOz);
    }

    #[test]
    fn test_quantity_errors() {
        assert_eq!(code(params(Some("1"), None).parse().unwrap_err()), "INVALID_QUANTITY_PARAMS");
        assert_eq!(code(params(None, Some("G")).parse().unwrap_err()), "INVALID_QUANTITY_PARAMS");
        assert_eq!(code(params(Some("abc"), Some("G")).parse().unwrap_err()), "INVALID_QUANTITY_PARAMS");
        assert_eq!(code(params(Some("-1"), Some("G")).parse().unwrap_err()), "INVALID_QUANTITY_PARAMS");
        assert_eq!(code(params(Some("1"), Some("handful")).parse().unwrap_err()), "INVALID_UNIT");
    }
}
