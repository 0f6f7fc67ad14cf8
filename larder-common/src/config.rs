//! Bootstrap configuration for Larder services
//!
//! Settings are resolved in priority order:
//! 1. Command-line arguments (applied by the binary through [`ConfigOverrides`])
//! 2. Environment variables (`LARDER_*`, read by clap in the binary)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants below)
//!
//! The TOML file is located by [`resolve_config_path`]. A missing file is not an
//! error: every setting has a default.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::{Error, Result};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "LARDER_CONFIG";

const DAY_SECS: u64 = 24 * 60 * 60;

// ============================================================================
// TOML structure
// ============================================================================

/// Full bootstrap configuration
///
/// Cannot change while the service runs; restart to pick up edits.
#[derive(Debug, Clone, Deserialize)]
pub struct LarderConfig {
    /// Read-only ingredient datastore (SQLite file)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP server port (default 5740)
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub resolution: ResolutionConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub open_food_facts: OpenFoodFactsConfig,

    #[serde(default)]
    pub recipe_service: RecipeServiceConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Orchestrator limits and timeouts
#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionConfig {
    /// Maximum simultaneous datastore/external calls across all requests
    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent_lookups: usize,

    /// Per-query timeout for datastore tiers
    #[serde(default = "default_datastore_timeout_ms")]
    pub datastore_timeout_ms: u64,

    /// Per-call timeout for external and inference tiers
    #[serde(default = "default_external_timeout_ms")]
    pub external_timeout_ms: u64,

    /// Share one in-progress resolution between concurrent callers of a key
    #[serde(default = "default_true")]
    pub single_flight: bool,
}

/// Cache backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Sqlite,
    Disabled,
}

/// Cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackend,

    /// Cache file for the sqlite backend (separate from the ingredient datastore)
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_nutrition_ttl_secs")]
    pub nutrition_ttl_secs: u64,

    #[serde(default = "default_allergen_ttl_secs")]
    pub allergen_ttl_secs: u64,

    #[serde(default = "default_pricing_ttl_secs")]
    pub pricing_ttl_secs: u64,

    /// How often expired entries are swept from the backend
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

/// Open Food Facts product search
#[derive(Debug, Clone, Deserialize)]
pub struct OpenFoodFactsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_off_base_url")]
    pub base_url: String,

    #[serde(default = "default_external_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_off_requests_per_second")]
    pub requests_per_second: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Upstream Recipe Management Service
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeServiceConfig {
    #[serde(default = "default_recipe_service_url")]
    pub base_url: String,

    #[serde(default = "default_recipe_service_timeout_ms")]
    pub timeout_ms: u64,
}

// ============================================================================
// Defaults
// ============================================================================

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("larder")
        .join("larder.db")
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5740
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_concurrent_lookups() -> usize {
    16
}

fn default_datastore_timeout_ms() -> u64 {
    2_000
}

fn default_external_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_cache_backend() -> CacheBackend {
    CacheBackend::Memory
}

fn default_nutrition_ttl_secs() -> u64 {
    30 * DAY_SECS
}

fn default_allergen_ttl_secs() -> u64 {
    30 * DAY_SECS
}

fn default_pricing_ttl_secs() -> u64 {
    DAY_SECS
}

fn default_purge_interval_secs() -> u64 {
    15 * 60
}

fn default_off_base_url() -> String {
    "https://world.openfoodfacts.org".to_string()
}

fn default_off_requests_per_second() -> u32 {
    10
}

fn default_user_agent() -> String {
    format!("larder/{} (ingredient attribute resolver)", env!("CARGO_PKG_VERSION"))
}

fn default_recipe_service_url() -> String {
    "http://127.0.0.1:8080/api/v1".to_string()
}

fn default_recipe_service_timeout_ms() -> u64 {
    5_000
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: default_max_concurrent_lookups(),
            datastore_timeout_ms: default_datastore_timeout_ms(),
            external_timeout_ms: default_external_timeout_ms(),
            single_flight: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            path: None,
            nutrition_ttl_secs: default_nutrition_ttl_secs(),
            allergen_ttl_secs: default_allergen_ttl_secs(),
            pricing_ttl_secs: default_pricing_ttl_secs(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

impl Default for OpenFoodFactsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_off_base_url(),
            timeout_ms: default_external_timeout_ms(),
            requests_per_second: default_off_requests_per_second(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for RecipeServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_recipe_service_url(),
            timeout_ms: default_recipe_service_timeout_ms(),
        }
    }
}

impl Default for LarderConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: default_bind_address(),
            port: default_port(),
            logging: LoggingConfig::default(),
            resolution: ResolutionConfig::default(),
            cache: CacheConfig::default(),
            open_food_facts: OpenFoodFactsConfig::default(),
            recipe_service: RecipeServiceConfig::default(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Values supplied on the command line or through `LARDER_*` variables
///
/// `None` leaves the TOML/default value in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub recipe_service_url: Option<String>,
    pub log_level: Option<String>,
}

impl ResolutionConfig {
    pub fn datastore_timeout(&self) -> Duration {
        Duration::from_millis(self.datastore_timeout_ms)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }
}

impl LarderConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from an optional TOML file, then apply overrides
    ///
    /// # Errors
    /// - `Error::Config` when the file exists but cannot be read or parsed,
    ///   or when the merged values fail [`LarderConfig::validate`]
    pub async fn load(toml_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = match toml_path {
            Some(path) => {
                let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
                })?;
                info!("Loaded configuration from {}", path.display());
                Self::from_toml_str(&content)?
            }
            None => {
                debug!("No configuration file found, using built-in defaults");
                Self::default()
            }
        };

        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI/environment overrides (highest priority)
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(path) = overrides.database_path {
            self.database_path = path;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(url) = overrides.recipe_service_url {
            self.recipe_service.base_url = url;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Reject values the resolver cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.resolution.max_concurrent_lookups == 0 {
            return Err(Error::Config(
                "resolution.max_concurrent_lookups must be at least 1".to_string(),
            ));
        }
        if self.resolution.datastore_timeout_ms == 0 || self.resolution.external_timeout_ms == 0 {
            return Err(Error::Config("resolution timeouts must be non-zero".to_string()));
        }
        if self.cache.nutrition_ttl_secs == 0
            || self.cache.allergen_ttl_secs == 0
            || self.cache.pricing_ttl_secs == 0
        {
            return Err(Error::Config("cache TTLs must be non-zero".to_string()));
        }
        if self.cache.purge_interval_secs == 0 {
            return Err(Error::Config("cache.purge_interval_secs must be non-zero".to_string()));
        }
        if self.cache.backend == CacheBackend::Sqlite && self.cache.path.is_none() {
            return Err(Error::Config(
                "cache.path is required when cache.backend = \"sqlite\"".to_string(),
            ));
        }
        if self.open_food_facts.enabled && self.open_food_facts.requests_per_second == 0 {
            return Err(Error::Config(
                "open_food_facts.requests_per_second must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Locate the configuration file
///
/// Priority: explicit path (CLI) → `LARDER_CONFIG` → user config dir →
/// `/etc/larder/larder-ar.toml`. Only existing files are returned, except an
/// explicit path, which is returned as-is so a typo surfaces as a read error.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("larder").join("larder-ar.toml"));
    let system_config = PathBuf::from("/etc/larder/larder-ar.toml");

    user_config
        .into_iter()
        .chain(std::iter::once(system_config))
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LarderConfig::default();
        assert_eq!(config.port, 5740);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.nutrition_ttl_secs, 30 * DAY_SECS);
        assert_eq!(config.cache.allergen_ttl_secs, 30 * DAY_SECS);
        assert_eq!(config.cache.pricing_ttl_secs, DAY_SECS);
        assert_eq!(config.cache.purge_interval_secs, 900);
        assert!(config.resolution.single_flight);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LarderConfig::from_toml_str(
            r#"
            database_path = "/srv/larder/usda.db"
            port = 6000

            [resolution]
            max_concurrent_lookups = 4

            [cache]
            backend = "disabled"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/srv/larder/usda.db"));
        assert_eq!(config.port, 6000);
        assert_eq!(config.resolution.max_concurrent_lookups, 4);
        assert_eq!(config.resolution.datastore_timeout_ms, 2_000);
        assert_eq!(config.cache.backend, CacheBackend::Disabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = LarderConfig::from_toml_str("port = \"not a number\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = LarderConfig::default();
        config.resolution.max_concurrent_lookups = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_requires_sqlite_cache_path() {
        let mut config = LarderConfig::default();
        config.cache.backend = CacheBackend::Sqlite;
        assert!(config.validate().is_err());
        config.cache.path = Some(PathBuf::from("/tmp/cache.db"));
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_applies_overrides_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 6100\n[logging]\nlevel = \"warn\"").unwrap();

        let overrides = ConfigOverrides {
            port: Some(7000),
            recipe_service_url: Some("http://recipes.internal/api".to_string()),
            ..Default::default()
        };
        let config = LarderConfig::load(Some(file.path()), overrides).await.unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.recipe_service.base_url, "http://recipes.internal/api");
    }

    #[tokio::test]
    async fn test_load_missing_explicit_file_fails() {
        let result = LarderConfig::load(
            Some(Path::new("/nonexistent/larder-ar.toml")),
            ConfigOverrides::default(),
        )
        .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_priority() {
        std::env::set_var(CONFIG_ENV_VAR, "/from/env.toml");
        assert_eq!(
            resolve_config_path(Some(Path::new("/from/cli.toml"))),
            Some(PathBuf::from("/from/cli.toml"))
        );
        assert_eq!(resolve_config_path(None), Some(PathBuf::from("/from/env.toml")));
        std::env::remove_var(CONFIG_ENV_VAR);
    }
}
