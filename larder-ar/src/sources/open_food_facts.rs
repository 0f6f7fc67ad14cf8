//! Open Food Facts product search (allergen tier 3)
//!
//! Searches the public product database by ingredient name and converts the
//! first product's allergen tags into an allergen profile.
//!
//! # API Reference
//! - Endpoint: `{base_url}/cgi/search.pl?search_terms=…&search_simple=1&action=process&json=1&page_size=1`
//! - `allergens_tags` are declared allergens → CONTAINS
//! - `traces_tags` are possible cross-contamination → MAY_CONTAIN
//! - a product with no recognised tag is no match; absent tags are not
//!   evidence that the ingredient is allergen-free
//!
//! Requests are paced by a `governor` rate limiter and bounded by the client
//! timeout. Any failure is logged and reported as "no match".

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use larder_common::config::OpenFoodFactsConfig;
use larder_common::{Allergen, DataSource, PresenceType};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::ExternalAttributeSource;
use crate::domains::allergens::{AllergenEntry, AllergenProfile};

/// Confidence attached to each allergen entry from Open Food Facts
pub const OPEN_FOOD_FACTS_CONFIDENCE: f64 = 0.95;

type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct Product {
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    allergens_tags: Vec<String>,
    #[serde(default)]
    traces_tags: Vec<String>,
}

/// Map an Open Food Facts taxonomy tag to an allergen
pub fn allergen_for_tag(tag: &str) -> Option<Allergen> {
    let allergen = match tag.trim().to_ascii_lowercase().as_str() {
        "en:gluten" => Allergen::Gluten,
        "en:milk" => Allergen::Milk,
        "en:eggs" => Allergen::Eggs,
        "en:nuts" => Allergen::TreeNuts,
        "en:peanuts" => Allergen::Peanuts,
        "en:soybeans" => Allergen::Soybeans,
        "en:fish" => Allergen::Fish,
        "en:crustaceans" | "en:molluscs" => Allergen::Shellfish,
        "en:sesame-seeds" => Allergen::Sesame,
        "en:celery" => Allergen::Celery,
        "en:mustard" => Allergen::Mustard,
        "en:lupin" => Allergen::Lupin,
        "en:sulphur-dioxide-and-sulphites" => Allergen::Sulphites,
        "en:almonds" => Allergen::Almonds,
        "en:cashews" => Allergen::Cashews,
        "en:hazelnuts" => Allergen::Hazelnuts,
        "en:walnuts" => Allergen::Walnuts,
        "en:wheat" => Allergen::Wheat,
        "en:coconut" => Allergen::Coconut,
        _ => return None,
    };
    Some(allergen)
}

/// Build an allergen profile from a product's tags
///
/// Declared allergens come first; a trace tag for an allergen that is already
/// declared is skipped.
fn profile_from_product(product: &Product) -> AllergenProfile {
    let notes = product
        .product_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .map(|n| format!("From Open Food Facts: {}", n.trim()));

    let mut seen = HashSet::new();
    let mut allergens = Vec::new();

    let tagged = product
        .allergens_tags
        .iter()
        .map(|t| (t, PresenceType::Contains))
        .chain(product.traces_tags.iter().map(|t| (t, PresenceType::MayContain)));

    for (tag, presence_type) in tagged {
        let Some(allergen) = allergen_for_tag(tag) else {
            debug!(tag = %tag, "Ignoring unmapped Open Food Facts tag");
            continue;
        };
        if !seen.insert(allergen) {
            continue;
        }
        allergens.push(AllergenEntry {
            allergen,
            presence_type,
            confidence_score: OPEN_FOOD_FACTS_CONFIDENCE,
            source_notes: notes.clone(),
        });
    }

    AllergenProfile {
        ingredient_id: None,
        ingredient_name: product.product_name.clone(),
        usda_food_description: None,
        allergens,
    }
}

/// Profile for a search hit, `None` when no tag maps to a known allergen
fn match_from_product(product: &Product) -> Option<AllergenProfile> {
    let profile = profile_from_product(product);
    (!profile.allergens.is_empty()).then_some(profile)
}

// ============================================================================
// Client
// ============================================================================

/// Open Food Facts search client
pub struct OpenFoodFactsClient {
    http_client: Client,
    base_url: String,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl OpenFoodFactsClient {
    /// Create a client from configuration
    ///
    /// # Errors
    /// Returns `Error::Config` when the user agent is not a valid header value
    /// or the HTTP client cannot be built.
    pub fn new(config: &OpenFoodFactsConfig) -> larder_common::Result<Self> {
        let mut headers = header::HeaderMap::new();
        let agent = header::HeaderValue::from_str(&config.user_agent)
            .map_err(|e| larder_common::Error::Config(format!("Invalid user agent: {}", e)))?;
        headers.insert(header::USER_AGENT, agent);

        let timeout = Duration::from_millis(config.timeout_ms);
        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .default_headers(headers)
            .build()
            .map_err(|e| larder_common::Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter,
        })
    }

    async fn search(&self, name: &str) -> Result<Option<Product>, String> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/cgi/search.pl", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("search_terms", name),
                ("search_simple", "1"),
                ("action", "process"),
                ("json", "1"),
                ("page_size", "1"),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    format!("request failed: {}", e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response body: {}", e))?;

        Ok(body.products.into_iter().next())
    }
}

#[async_trait]
impl ExternalAttributeSource<AllergenProfile> for OpenFoodFactsClient {
    fn name(&self) -> &'static str {
        "open_food_facts"
    }

    fn data_source(&self) -> &'static str {
        DataSource::OpenFoodFacts.as_str()
    }

    async fn search_by_name(&self, name: &str) -> Option<AllergenProfile> {
        if name.trim().is_empty() {
            return None;
        }

        match self.search(name).await {
            Ok(Some(product)) => {
                let profile = match_from_product(&product);
                debug!(
                    ingredient = name,
                    product = ?product.product_name,
                    allergens = profile.as_ref().map_or(0, |p| p.allergens.len()),
                    "Open Food Facts product"
                );
                profile
            }
            Ok(None) => {
                debug!(ingredient = name, "No Open Food Facts product");
                None
            }
            Err(e) => {
                warn!(ingredient = name, error = %e, "Open Food Facts lookup failed, treating as no match");
                None
            }
        }
    }
}
