//! Quantity normalization to grams
//!
//! Conversion strategy depends on the unit class:
//! - **Weight**: fixed ratio, always succeeds
//! - **Volume**: recorded portion weight, else 1 g/ml (water density approximation)
//! - **Count**: recorded portion weight, else [`ConversionError`]
//!
//! [`UnitConverter`] is the only consumer of [`PortionWeightLookup`].

use async_trait::async_trait;
use larder_common::{Quantity, Unit, UnitClass};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::types::TierError;

/// A quantity that cannot be expressed in grams
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {amount} {unit} of '{ingredient}' to grams: no portion weight recorded")]
pub struct ConversionError {
    pub ingredient: String,
    pub amount: f64,
    pub unit: Unit,
}

/// Read-only accessor for recorded (ingredient, unit) gram weights
#[async_trait]
pub trait PortionWeightLookup: Send + Sync {
    /// Grams for one `unit` of `ingredient`, `None` when no row exists
    async fn gram_weight(&self, ingredient: &str, unit: Unit) -> Result<Option<f64>, TierError>;
}

/// Converts recipe quantities into grams for a named ingredient
#[derive(Clone)]
pub struct UnitConverter {
    portions: Arc<dyn PortionWeightLookup>,
    permits: Option<Arc<Semaphore>>,
}

impl UnitConverter {
    pub fn new(portions: Arc<dyn PortionWeightLookup>) -> Self {
        Self {
            portions,
            permits: None,
        }
    }

    /// Hold a permit from `permits` for each portion query
    ///
    /// Only for callers outside a tier; a tier already holds a permit while it
    /// converts, and waiting on a second one can starve the limiter.
    pub fn with_permits(mut self, permits: Arc<Semaphore>) -> Self {
        self.permits = Some(permits);
        self
    }

    /// Convert `quantity` of `ingredient` to grams
    ///
    /// # Errors
    /// `ConversionError` for a count unit with no recorded portion weight.
    /// Portion lookup failures are logged and handled as "no row".
    pub async fn to_grams(&self, quantity: &Quantity, ingredient: &str) -> Result<f64, ConversionError> {
        let unit = quantity.measurement;

        match unit.class() {
            UnitClass::Weight => {
                let ratio = unit.grams_per_unit().unwrap_or(1.0);
                Ok(quantity.amount * ratio)
            }
            UnitClass::Volume => {
                if let Some(weight) = self.portion_weight(ingredient, unit).await {
                    return Ok(quantity.amount * weight);
                }
                let millilitres = quantity.amount * unit.millilitres_per_unit().unwrap_or(1.0);
                debug!(
                    ingredient = ingredient,
                    unit = %unit,
                    "No portion weight, using 1 g/ml density"
                );
                Ok(millilitres)
            }
            UnitClass::Count => match self.portion_weight(ingredient, unit).await {
                Some(weight) => Ok(quantity.amount * weight),
                None => Err(ConversionError {
                    ingredient: ingredient.to_string(),
                    amount: quantity.amount,
                    unit,
                }),
            },
        }
    }

    async fn portion_weight(&self, ingredient: &str, unit: Unit) -> Option<f64> {
        let _permit = match &self.permits {
            Some(permits) => match permits.acquire().await {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(ingredient = ingredient, "Lookup limiter closed, skipping portion weight");
                    return None;
                }
            },
            None => None,
        };

        match self.portions.gram_weight(ingredient, unit).await {
            Ok(Some(weight)) if weight > 0.0 => Some(weight),
            Ok(_) => None,
            Err(e) => {
                warn!(
                    ingredient = ingredient,
                    unit = %unit,
                    error = %e,
                    "Portion weight lookup failed, treating as absent"
                );
                None
            }
        }
    }
}
