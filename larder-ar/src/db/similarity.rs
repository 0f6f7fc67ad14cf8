//! Fuzzy name matching for the allergen repository
//!
//! Candidates are ranked by match kind (prefix, then substring, then trigram
//! similarity above [`TRIGRAM_THRESHOLD`]). Within a kind the highest trigram
//! similarity wins, then the shortest name.
//!
//! Trigram similarity follows PostgreSQL `pg_trgm`: each word is lower-cased and
//! padded with two leading spaces and one trailing space, and similarity is
//! `|shared| / |union|` over the two trigram sets.

use std::cmp::Ordering;
use std::collections::HashSet;

/// Minimum similarity for a trigram-only match (exclusive)
pub const TRIGRAM_THRESHOLD: f64 = 0.3;

/// Extract the `pg_trgm` trigram set of `text`
pub fn trigrams(text: &str) -> HashSet<String> {
    let mut set = HashSet::new();
    let lowered = text.to_lowercase();
    for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let padded: Vec<char> = format!("  {} ", word).chars().collect();
        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }
    set
}

/// Trigram similarity in [0, 1]
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - shared;
    shared as f64 / union as f64
}

/// Kind of fuzzy match, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Prefix,
    Contains,
    Trigram,
}

/// Winning candidate of a fuzzy search
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    pub ingredient_id: i64,
    pub name: String,
    pub kind: MatchKind,
    pub similarity: f64,
}

/// Pick the single best candidate for `query`, or `None` when nothing qualifies
pub fn best_match<I>(query: &str, candidates: I) -> Option<FuzzyMatch>
where
    I: IntoIterator<Item = (i64, String)>,
{
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    candidates
        .into_iter()
        .filter_map(|(ingredient_id, name)| {
            let haystack = name.to_lowercase();
            let score = similarity(&needle, &haystack);
            let kind = if haystack.starts_with(&needle) {
                MatchKind::Prefix
            } else if haystack.contains(&needle) {
                MatchKind::Contains
            } else if score > TRIGRAM_THRESHOLD {
                MatchKind::Trigram
            } else {
                return None;
            };
            Some(FuzzyMatch {
                ingredient_id,
                name,
                kind,
                similarity: score,
            })
        })
        .min_by(compare_matches)
}

fn compare_matches(a: &FuzzyMatch, b: &FuzzyMatch) -> Ordering {
    a.kind
        .cmp(&b.kind)
        .then_with(|| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal))
        .then_with(|| a.name.chars().count().cmp(&b.name.chars().count()))
        .then_with(|| a.ingredient_id.cmp(&b.ingredient_id))
}
