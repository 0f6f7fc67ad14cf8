//! Allergen profile queries
//!
//! Exact match is a case-insensitive name comparison. Fuzzy match loads the
//! names of every ingredient that has an allergen profile and ranks them in
//! process (SQLite has no trigram index), then loads the single winner.
//!
//! A profile without allergen rows says nothing about the ingredient, so it
//! is a miss and never a "no allergens" answer.

use larder_common::{Allergen, DataSource, PresenceType, Result};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, warn};

use super::similarity::{best_match, FuzzyMatch};
use crate::domains::allergens::{AllergenEntry, AllergenProfile};

/// Per-entry confidence when the row leaves it NULL
const DEFAULT_ENTRY_CONFIDENCE: f64 = 1.0;

/// A profile plus the provenance recorded on its row
#[derive(Debug, Clone, PartialEq)]
pub struct AllergenRow {
    pub profile: AllergenProfile,
    pub data_source: String,
}

#[derive(Clone)]
pub struct AllergenRepository {
    db: SqlitePool,
}

impl AllergenRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Case-insensitive exact name match
    pub async fn exact_match(&self, name: &str) -> Result<Option<AllergenRow>> {
        let header = sqlx::query(
            r#"
            SELECT i.ingredient_id, i.name, i.usda_food_description,
                   ap.allergen_profile_id, ap.data_source
            FROM ingredients i
            JOIN allergen_profiles ap ON ap.ingredient_id = i.ingredient_id
            WHERE LOWER(i.name) = LOWER(?)
              AND EXISTS (
                  SELECT 1 FROM ingredient_allergens ia
                  WHERE ia.allergen_profile_id = ap.allergen_profile_id
              )
            ORDER BY i.ingredient_id, ap.allergen_profile_id
            LIMIT 1
            "#,
        )
        .bind(name.trim())
        .fetch_optional(&self.db)
        .await?;

        match header {
            Some(row) => self.load_profile(&row).await,
            None => Ok(None),
        }
    }

    /// Best prefix / substring / trigram match, or `None`
    pub async fn fuzzy_match(&self, name: &str) -> Result<Option<AllergenRow>> {
        let candidates: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT i.ingredient_id, i.name
            FROM ingredients i
            JOIN allergen_profiles ap ON ap.ingredient_id = i.ingredient_id
            JOIN ingredient_allergens ia ON ia.allergen_profile_id = ap.allergen_profile_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let Some(FuzzyMatch {
            ingredient_id,
            name: matched,
            kind,
            similarity,
        }) = best_match(name, candidates)
        else {
            return Ok(None);
        };

        debug!(
            query = name,
            matched = %matched,
            kind = ?kind,
            similarity,
            "Fuzzy allergen match"
        );

        let header = sqlx::query(
            r#"
            SELECT i.ingredient_id, i.name, i.usda_food_description,
                   ap.allergen_profile_id, ap.data_source
            FROM ingredients i
            JOIN allergen_profiles ap ON ap.ingredient_id = i.ingredient_id
            WHERE i.ingredient_id = ?
              AND EXISTS (
                  SELECT 1 FROM ingredient_allergens ia
                  WHERE ia.allergen_profile_id = ap.allergen_profile_id
              )
            ORDER BY ap.allergen_profile_id
            LIMIT 1
            "#,
        )
        .bind(ingredient_id)
        .fetch_optional(&self.db)
        .await?;

        match header {
            Some(row) => self.load_profile(&row).await,
            None => Ok(None),
        }
    }

    /// Profile rows for `header`, `None` when no row names a known allergen
    async fn load_profile(&self, header: &sqlx::sqlite::SqliteRow) -> Result<Option<AllergenRow>> {
        let profile_id: i64 = header.try_get("allergen_profile_id")?;
        let data_source: Option<String> = header.try_get("data_source")?;

        let rows = sqlx::query(
            r#"
            SELECT allergen_type, presence_type, confidence_score, source_notes
            FROM ingredient_allergens
            WHERE allergen_profile_id = ?
            ORDER BY allergen_type
            "#,
        )
        .bind(profile_id)
        .fetch_all(&self.db)
        .await?;

        let mut allergens = Vec::with_capacity(rows.len());
        for row in rows {
            let allergen_type: String = row.try_get("allergen_type")?;
            let presence: Option<String> = row.try_get("presence_type")?;
            let confidence: Option<f64> = row.try_get("confidence_score")?;

            let allergen = match Allergen::from_str(&allergen_type) {
                Ok(a) => a,
                Err(_) => {
                    warn!(profile_id, allergen_type = %allergen_type, "Skipping unrecognized allergen row");
                    continue;
                }
            };
            let presence_type = presence
                .as_deref()
                .map(PresenceType::from_str)
                .transpose()
                .unwrap_or_else(|e| {
                    warn!(profile_id, error = %e, "Unrecognized presence type, assuming CONTAINS");
                    None
                })
                .unwrap_or(PresenceType::Contains);

            allergens.push(AllergenEntry {
                allergen,
                presence_type,
                confidence_score: confidence.unwrap_or(DEFAULT_ENTRY_CONFIDENCE).clamp(0.0, 1.0),
                source_notes: row.try_get("source_notes")?,
            });
        }

        if allergens.is_empty() {
            debug!(profile_id, "Allergen profile has no usable rows");
            return Ok(None);
        }

        Ok(Some(AllergenRow {
            profile: AllergenProfile {
                ingredient_id: Some(header.try_get("ingredient_id")?),
                ingredient_name: Some(header.try_get("name")?),
                usda_food_description: header.try_get("usda_food_description")?,
                allergens,
            },
            data_source: data_source.unwrap_or_else(|| DataSource::Usda.to_string()),
        }))
    }
}
