//! Portion weights backing unit conversion

use async_trait::async_trait;
use larder_common::Unit;
use sqlx::SqlitePool;
use std::time::Duration;

use crate::types::TierError;
use crate::units::PortionWeightLookup;

/// `ingredient_portions` reader
///
/// Rows without a modifier ("1 cup" rather than "1 cup, chopped") are
/// preferred, then the lowest `sequence_number`.
#[derive(Clone)]
pub struct PortionRepository {
    db: SqlitePool,
    query_timeout: Duration,
}

impl PortionRepository {
    pub fn new(db: SqlitePool, query_timeout: Duration) -> Self {
        Self { db, query_timeout }
    }

    async fn query(&self, ingredient: &str, unit: Unit) -> Result<Option<f64>, TierError> {
        let row: Option<(f64,)> = sqlx::query_as(
            r#"
            SELECT p.gram_weight
            FROM ingredient_portions p
            JOIN ingredients i ON i.ingredient_id = p.ingredient_id
            WHERE LOWER(i.name) = LOWER(?)
              AND UPPER(p.unit) = ?
            ORDER BY (p.modifier IS NOT NULL AND p.modifier != ''),
                     COALESCE(p.sequence_number, 2147483647),
                     p.portion_id
            LIMIT 1
            "#,
        )
        .bind(ingredient.trim())
        .bind(unit.as_str())
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(grams,)| grams))
    }
}

#[async_trait]
impl PortionWeightLookup for PortionRepository {
    async fn gram_weight(&self, ingredient: &str, unit: Unit) -> Result<Option<f64>, TierError> {
        tokio::time::timeout(self.query_timeout, self.query(ingredient, unit))
            .await
            .map_err(|_| TierError::Timeout(self.query_timeout))?
    }
}
