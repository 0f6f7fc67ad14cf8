//! Service assembly
//!
//! Wires repositories, sources and the cache into one orchestrator per domain.
//! Everything is passed in explicitly so tests can substitute any piece.

use larder_common::config::{CacheBackend, CacheConfig, LarderConfig};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache::{CacheKeyPolicy, CacheStore, MemoryCache, SqliteCache};
use crate::db::{AllergenRepository, IngredientRepository, NutritionRepository, PortionRepository, PricingRepository};
use crate::domains::allergens::{
    AllergenExactTier, AllergenFuzzyTier, AllergenProfile, AllergenService, EXTERNAL_CONFIDENCE,
    INFERENCE_CONFIDENCE,
};
use crate::domains::nutrition::{NutritionExactTier, NutritionProfile, NutritionService};
use crate::domains::pricing::{FoodGroupPriceTier, IngredientPriceTier, PricedQuantity, ShoppingService};
use crate::resolution::{DomainConfig, ResolutionLimits, ResolutionOrchestrator};
use crate::sources::{ExternalAttributeSource, ExternalTier, FoodGroupAverageSource, InferenceSource, InferenceTier};
use crate::types::{Domain, TierResolver};
use crate::units::UnitConverter;

/// Optional secondary allergen sources
#[derive(Default)]
pub struct AllergenSources {
    /// Tier 3 (Open Food Facts in production)
    pub external: Option<Arc<dyn ExternalAttributeSource<AllergenProfile>>>,
    /// Tier 4; no provider ships with the service
    pub inference: Option<Arc<dyn InferenceSource<AllergenProfile>>>,
}

/// One service per attribute domain
#[derive(Clone)]
pub struct Services {
    pub nutrition: Arc<NutritionService>,
    pub allergens: Arc<AllergenService>,
    pub shopping: Arc<ShoppingService>,
    /// Timeout for datastore queries made outside a tier
    pub datastore_timeout: Duration,
}

/// Open the configured cache backend
///
/// # Errors
/// `Error::Config` when the sqlite cache file cannot be opened.
pub async fn open_cache(config: &CacheConfig) -> larder_common::Result<Option<Arc<dyn CacheStore>>> {
    match config.backend {
        CacheBackend::Disabled => {
            info!("Attribute cache disabled");
            Ok(None)
        }
        CacheBackend::Memory => {
            info!("Using in-memory attribute cache");
            Ok(Some(Arc::new(MemoryCache::new())))
        }
        CacheBackend::Sqlite => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| larder_common::Error::Config("cache.path is required for the sqlite cache".to_string()))?;
            let pool = larder_common::db::connect_writable(path).await?;
            let cache = SqliteCache::new(pool)
                .await
                .map_err(|e| larder_common::Error::Config(format!("Cannot open cache {}: {}", path.display(), e)))?;
            info!("Using sqlite attribute cache at {}", path.display());
            Ok(Some(Arc::new(cache)))
        }
    }
}

/// Build the three domain services over one datastore pool
///
/// # Errors
/// `Error::Config` when a tier table is invalid.
pub fn build_services(
    db: SqlitePool,
    config: &LarderConfig,
    cache: Option<Arc<dyn CacheStore>>,
    sources: AllergenSources,
) -> larder_common::Result<Services> {
    let limits = ResolutionLimits::new(
        config.resolution.max_concurrent_lookups,
        config.resolution.datastore_timeout(),
        config.resolution.external_timeout(),
    )
    .with_single_flight(config.resolution.single_flight);
    let permits = Arc::clone(&limits.permits);

    let ingredients = IngredientRepository::new(db.clone());
    let pricing = PricingRepository::new(db.clone());
    let converter = UnitConverter::new(Arc::new(PortionRepository::new(
        db.clone(),
        config.resolution.datastore_timeout(),
    )));

    // Nutrition: exact only
    let nutrition_tiers: Vec<Arc<dyn TierResolver<NutritionProfile>>> =
        vec![Arc::new(NutritionExactTier::new(NutritionRepository::new(db.clone())))];
    let nutrition = ResolutionOrchestrator::new(
        DomainConfig {
            domain: Domain::Nutrition,
            key_policy: CacheKeyPolicy::ByName,
            ttl: Duration::from_secs(config.cache.nutrition_ttl_secs),
        },
        nutrition_tiers,
        cache.clone(),
        limits.clone(),
    )?;

    // Allergens: exact, fuzzy, external, inference
    let allergen_repo = AllergenRepository::new(db);
    let mut allergen_tiers: Vec<Arc<dyn TierResolver<AllergenProfile>>> = vec![
        Arc::new(AllergenExactTier::new(allergen_repo.clone())),
        Arc::new(AllergenFuzzyTier::new(allergen_repo)),
    ];
    if let Some(external) = sources.external {
        allergen_tiers.push(Arc::new(ExternalTier::new(external, 3, EXTERNAL_CONFIDENCE)));
    }
    if let Some(inference) = sources.inference {
        allergen_tiers.push(Arc::new(InferenceTier::new(inference, 4, INFERENCE_CONFIDENCE)));
    }
    let allergens = ResolutionOrchestrator::new(
        DomainConfig {
            domain: Domain::Allergen,
            key_policy: CacheKeyPolicy::ByName,
            ttl: Duration::from_secs(config.cache.allergen_ttl_secs),
        },
        allergen_tiers,
        cache.clone(),
        limits.clone(),
    )?;

    // Pricing: ingredient price, food-group average
    let pricing_tiers: Vec<Arc<dyn TierResolver<PricedQuantity>>> = vec![
        Arc::new(IngredientPriceTier::new(ingredients.clone(), pricing.clone(), converter.clone())),
        Arc::new(FoodGroupPriceTier::new(
            FoodGroupAverageSource::new(ingredients, pricing),
            converter.clone(),
        )),
    ];
    let shopping = ResolutionOrchestrator::new(
        DomainConfig {
            domain: Domain::Pricing,
            key_policy: CacheKeyPolicy::ByIdAndQuantity,
            ttl: Duration::from_secs(config.cache.pricing_ttl_secs),
        },
        pricing_tiers,
        cache,
        limits,
    )?;

    for (domain, table) in [
        (Domain::Nutrition, nutrition.tier_table()),
        (Domain::Allergen, allergens.tier_table()),
        (Domain::Pricing, shopping.tier_table()),
    ] {
        info!(domain = %domain, tiers = ?table, "Resolution tiers configured");
    }

    // Nutrition converts outside its tier, so it takes its own permits
    let nutrition_converter = converter.with_permits(Arc::clone(&permits));

    Ok(Services {
        nutrition: Arc::new(NutritionService::new(Arc::new(nutrition), nutrition_converter)),
        allergens: Arc::new(AllergenService::new(Arc::new(allergens))),
        shopping: Arc::new(ShoppingService::new(Arc::new(shopping))),
        datastore_timeout: config.resolution.datastore_timeout(),
    })
}
