//! # Larder Common Library
//!
//! Shared code for the Larder services:
//! - Error type and result alias
//! - Bootstrap configuration (TOML + environment + CLI overrides)
//! - Read-only datastore connection and the USDA-derived schema
//! - Domain vocabulary (units, allergens, food groups, data sources)

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use error::{Error, Result};
pub use models::{normalize_name, Allergen, DataSource, FoodGroup, PresenceType, Quantity, Unit, UnitClass};
