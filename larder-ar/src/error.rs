//! Error types for larder-ar handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::recipes::RecipeClientError;
use crate::resolution::ResolutionError;
use crate::units::ConversionError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// No data for the ingredient, or unknown ingredient (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Quantity cannot be expressed in grams (422)
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Invalid request (400)
    #[error("Invalid request: {message}")]
    BadRequest { code: &'static str, message: String },

    /// Recipe service cannot be reached (503)
    #[error("Recipe service unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Recipe service has no such recipe (404)
    #[error("Recipe {0} not found")]
    RecipeNotFound(i64),

    /// Recipe service answered with an error or an unreadable body (502)
    #[error("Recipe service error: {0}")]
    UpstreamResponse(String),

    /// larder-common error
    #[error("Common error: {0}")]
    Common(#[from] larder_common::Error),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }
}

impl From<ResolutionError> for ApiError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ResolutionError::Conversion(e) => ApiError::Conversion(e),
        }
    }
}

impl From<RecipeClientError> for ApiError {
    fn from(err: RecipeClientError) -> Self {
        match err {
            RecipeClientError::Unavailable(msg) => ApiError::UpstreamUnavailable(msg),
            RecipeClientError::NotFound(id) => ApiError::RecipeNotFound(id),
            RecipeClientError::BadResponse(msg) => ApiError::UpstreamResponse(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conversion(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CONVERSION_ERROR"),
            ApiError::BadRequest { code, .. } => (StatusCode::BAD_REQUEST, *code),
            ApiError::UpstreamUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            ApiError::RecipeNotFound(_) => (StatusCode::NOT_FOUND, "RECIPE_NOT_FOUND"),
            ApiError::UpstreamResponse(_) => (StatusCode::BAD_GATEWAY, "DOWNSTREAM_ERROR"),
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
        };

        let message = match &self {
            ApiError::BadRequest { message, .. } => message.clone(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
