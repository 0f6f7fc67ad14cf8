//! larder-ar - Ingredient Attribute Resolver
//!
//! **Module Identity:**
//! - Name: larder-ar (Attribute Resolver)
//! - Port: 5740 (default)
//!
//! Serves nutrition, allergen and shopping estimates for ingredients and
//! recipes from the read-only ingredient datastore, Open Food Facts and the
//! Recipe Management Service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use larder_common::config::{resolve_config_path, ConfigOverrides, LarderConfig};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use larder_ar::cache::spawn_purge_task;
use larder_ar::db::IngredientRepository;
use larder_ar::recipes::{HttpRecipeClient, RecipeSource};
use larder_ar::services::{build_services, open_cache, AllergenSources};
use larder_ar::sources::OpenFoodFactsClient;
use larder_ar::AppState;

/// Command-line arguments for larder-ar
#[derive(Parser, Debug)]
#[command(name = "larder-ar")]
#[command(about = "Ingredient attribute resolver for Larder")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "LARDER_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "LARDER_AR_PORT")]
    port: Option<u16>,

    /// Ingredient datastore (SQLite file, opened read-only)
    #[arg(short, long, env = "LARDER_DATABASE")]
    database: Option<PathBuf>,

    /// Recipe Management Service base URL
    #[arg(long, env = "LARDER_RECIPE_SERVICE_URL")]
    recipe_service_url: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "LARDER_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = LarderConfig::load(
        config_path.as_deref(),
        ConfigOverrides {
            database_path: args.database,
            port: args.port,
            recipe_service_url: args.recipe_service_url,
            log_level: args.log_level,
        },
    )
    .await
    .context("Failed to load configuration")?;

    // Initialize tracing
    let default_filter = format!("larder_ar={0},larder_common={0},tower_http=info", config.logging.level);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting larder-ar (Attribute Resolver)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Configuration: {}", path.display());
    }
    info!("Database: {}", config.database_path.display());

    let max_connections = u32::try_from(config.resolution.max_concurrent_lookups).unwrap_or(u32::MAX);
    let db_pool = larder_common::db::connect_readonly(&config.database_path, max_connections)
        .await
        .context("Failed to open ingredient datastore")?;
    info!("Database connection established (read-only)");

    let cache = open_cache(&config.cache).await.context("Failed to open cache")?;
    if let Some(cache) = &cache {
        spawn_purge_task(cache.clone(), Duration::from_secs(config.cache.purge_interval_secs));
        info!("Cache purge every {}s", config.cache.purge_interval_secs);
    }

    let mut sources = AllergenSources::default();
    if config.open_food_facts.enabled {
        let client = OpenFoodFactsClient::new(&config.open_food_facts).context("Failed to create Open Food Facts client")?;
        sources.external = Some(Arc::new(client));
        info!("Open Food Facts: {}", config.open_food_facts.base_url);
    } else {
        info!("Open Food Facts disabled");
    }

    let services = build_services(db_pool.clone(), &config, cache, sources).context("Invalid resolution configuration")?;

    let recipes: Arc<dyn RecipeSource> =
        Arc::new(HttpRecipeClient::new(&config.recipe_service).context("Failed to create recipe service client")?);
    info!("Recipe service: {}", config.recipe_service.base_url);

    let state = AppState::new(services, recipes, IngredientRepository::new(db_pool));
    let app = larder_ar::build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
