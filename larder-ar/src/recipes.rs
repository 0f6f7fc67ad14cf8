//! Recipe Management Service client
//!
//! The recipe service owns recipe and ingredient identities. This module only
//! reads a recipe's ingredient list: `GET {base_url}/recipes/{id}`.

use async_trait::async_trait;
use larder_common::config::RecipeServiceConfig;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domains::RecipeIngredient;

/// Recipe as returned by the recipe service
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredient>,
}

#[derive(Debug, Error)]
pub enum RecipeClientError {
    /// Connection refused, DNS failure or timeout
    #[error("Recipe service unavailable: {0}")]
    Unavailable(String),

    #[error("Recipe {0} not found")]
    NotFound(i64),

    /// Non-success status or undecodable body
    #[error("Recipe service error: {0}")]
    BadResponse(String),
}

/// Source of recipe ingredient lists
#[async_trait]
pub trait RecipeSource: Send + Sync {
    async fn fetch_recipe(&self, recipe_id: i64) -> Result<Recipe, RecipeClientError>;
}

/// HTTP client for the recipe service
pub struct HttpRecipeClient {
    http_client: Client,
    base_url: String,
}

impl HttpRecipeClient {
    /// # Errors
    /// `Error::Config` when the HTTP client cannot be built.
    pub fn new(config: &RecipeServiceConfig) -> larder_common::Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| larder_common::Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RecipeSource for HttpRecipeClient {
    async fn fetch_recipe(&self, recipe_id: i64) -> Result<Recipe, RecipeClientError> {
        let url = format!("{}/recipes/{}", self.base_url, recipe_id);
        debug!(url = %url, "Fetching recipe");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            warn!(recipe_id, error = %e, "Recipe service request failed");
            if e.is_connect() || e.is_timeout() {
                RecipeClientError::Unavailable(e.to_string())
            } else {
                RecipeClientError::BadResponse(e.to_string())
            }
        })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(RecipeClientError::NotFound(recipe_id)),
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                return Err(RecipeClientError::Unavailable(format!("HTTP {}", response.status())))
            }
            status => return Err(RecipeClientError::BadResponse(format!("HTTP {}", status))),
        }

        response
            .json::<Recipe>()
            .await
            .map_err(|e| RecipeClientError::BadResponse(format!("invalid recipe body: {}", e)))
    }
}
