//! Domain services: per-ingredient resolution plus recipe aggregation
//!
//! Each domain wires its tier list into a [`ResolutionOrchestrator`] and
//! supplies an [`AggregationPolicy`] that folds per-ingredient results into a
//! recipe-level summary. Recipe ingredients are resolved concurrently; every
//! ingredient ends up either resolved or in `missing_ingredient_ids`.
//!
//! [`ResolutionOrchestrator`]: crate::resolution::ResolutionOrchestrator

pub mod allergens;
pub mod nutrition;
pub mod pricing;

use futures::future::join_all;
use larder_common::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;

use crate::types::LookupRequest;

/// One ingredient line of a recipe, as supplied by the recipe service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeIngredient {
    pub ingredient_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub quantity: Option<Quantity>,
}

impl RecipeIngredient {
    /// Lookup for this line, `None` when it carries no usable name
    pub fn lookup(&self) -> Option<LookupRequest> {
        let name = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
        let mut request = LookupRequest::by_name(name).with_id(self.ingredient_id);
        if let Some(quantity) = self.quantity {
            request = request.with_quantity(quantity);
        }
        Some(request)
    }

    /// Requested quantity, 100 g when the recipe gives none
    pub fn quantity_or_default(&self) -> Quantity {
        self.quantity.unwrap_or_else(Quantity::default_serving)
    }
}

/// Recipe-level answer for one domain
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeAttributeResult<S, R> {
    pub summary: S,
    /// Resolved lines in recipe order
    pub resolved: Vec<(RecipeIngredient, R)>,
    /// Ids with at least one unresolved line
    ///
    /// Lines are aggregated one by one, so an id repeated across lines can be
    /// both here and in `resolved` when only some of its lines resolved.
    pub missing_ingredient_ids: BTreeSet<i64>,
}

impl<S, R> RecipeAttributeResult<S, R> {
    pub fn is_partial(&self) -> bool {
        !self.missing_ingredient_ids.is_empty()
    }
}

/// Folds per-ingredient results into a recipe summary
///
/// Unresolved ingredients never reach [`accumulate`](Self::accumulate); they
/// are listed as missing and contribute nothing (not zero) to the summary.
pub trait AggregationPolicy {
    type Resolved;
    type Summary;

    fn empty(&self) -> Self::Summary;

    fn accumulate(&self, summary: &mut Self::Summary, ingredient: &RecipeIngredient, resolved: &Self::Resolved);

    /// Hook run once after every resolved ingredient was accumulated
    fn finish(&self, _summary: &mut Self::Summary, _resolved_count: usize) {}

    fn aggregate(
        &self,
        outcomes: Vec<(RecipeIngredient, Option<Self::Resolved>)>,
    ) -> RecipeAttributeResult<Self::Summary, Self::Resolved> {
        let mut summary = self.empty();
        let mut resolved = Vec::with_capacity(outcomes.len());
        let mut missing_ingredient_ids = BTreeSet::new();

        for (ingredient, outcome) in outcomes {
            match outcome {
                Some(value) => {
                    self.accumulate(&mut summary, &ingredient, &value);
                    resolved.push((ingredient, value));
                }
                None => {
                    missing_ingredient_ids.insert(ingredient.ingredient_id);
                }
            }
        }

        self.finish(&mut summary, resolved.len());

        RecipeAttributeResult {
            summary,
            resolved,
            missing_ingredient_ids,
        }
    }
}

/// Resolve every ingredient concurrently and pair each with its outcome
///
/// Output order matches input order. Concurrency against the datastore and
/// external sources is bounded by the orchestrators' shared permits.
pub async fn resolve_all<R, F, Fut>(
    ingredients: &[RecipeIngredient],
    resolve: F,
) -> Vec<(RecipeIngredient, Option<R>)>
where
    F: Fn(RecipeIngredient) -> Fut,
    Fut: Future<Output = Option<R>>,
{
    let resolve = &resolve;
    join_all(ingredients.iter().cloned().map(|ingredient| async move {
        let outcome = resolve(ingredient.clone()).await;
        (ingredient, outcome)
    }))
    .await
}
