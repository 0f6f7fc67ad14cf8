//! Domain vocabulary shared by the resolver and its tests
//!
//! Units, allergens, presence types, food groups and data sources are stored in
//! the datastore and exchanged over HTTP as upper snake case strings
//! (`FL_OZ`, `TREE_NUTS`, `MAY_CONTAIN`). Parsing is case-insensitive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

// ============================================================================
// Units
// ============================================================================

/// Measurement class a unit belongs to; decides how it converts to grams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitClass {
    /// Fixed ratio to grams
    Weight,
    /// Portion row, else 1 g/ml
    Volume,
    /// Portion row only
    Count,
}

/// Recipe measurement unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Unit {
    G,
    Kg,
    Oz,
    Lb,
    Ml,
    L,
    Cup,
    Tbsp,
    Tsp,
    FlOz,
    Piece,
    Clove,
    Slice,
    Pinch,
    Can,
    Bottle,
    Packet,
    Unit,
}

impl Unit {
    pub const ALL: [Unit; 18] = [
        Unit::G,
        Unit::Kg,
        Unit::Oz,
        Unit::Lb,
        Unit::Ml,
        Unit::L,
        Unit::Cup,
        Unit::Tbsp,
        Unit::Tsp,
        Unit::FlOz,
        Unit::Piece,
        Unit::Clove,
        Unit::Slice,
        Unit::Pinch,
        Unit::Can,
        Unit::Bottle,
        Unit::Packet,
        Unit::Unit,
    ];

    pub fn class(self) -> UnitClass {
        match self {
            Unit::G | Unit::Kg | Unit::Oz | Unit::Lb => UnitClass::Weight,
            Unit::Ml | Unit::L | Unit::Cup | Unit::Tbsp | Unit::Tsp | Unit::FlOz => UnitClass::Volume,
            Unit::Piece
            | Unit::Clove
            | Unit::Slice
            | Unit::Pinch
            | Unit::Can
            | Unit::Bottle
            | Unit::Packet
            | Unit::Unit => UnitClass::Count,
        }
    }

    /// Grams per one unit, for weight units only
    pub fn grams_per_unit(self) -> Option<f64> {
        match self {
            Unit::G => Some(1.0),
            Unit::Kg => Some(1000.0),
            Unit::Oz => Some(28.3495),
            Unit::Lb => Some(453.592),
            _ => None,
        }
    }

    /// Millilitres per one unit, for volume units only (US customary measures)
    pub fn millilitres_per_unit(self) -> Option<f64> {
        match self {
            Unit::Ml => Some(1.0),
            Unit::L => Some(1000.0),
            Unit::Cup => Some(236.588),
            Unit::Tbsp => Some(14.7868),
            Unit::Tsp => Some(4.92892),
            Unit::FlOz => Some(29.5735),
            _ => None,
        }
    }

    /// Canonical upper snake case name, as stored in `ingredient_portions.unit`
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::G => "G",
            Unit::Kg => "KG",
            Unit::Oz => "OZ",
            Unit::Lb => "LB",
            Unit::Ml => "ML",
            Unit::L => "L",
            Unit::Cup => "CUP",
            Unit::Tbsp => "TBSP",
            Unit::Tsp => "TSP",
            Unit::FlOz => "FL_OZ",
            Unit::Piece => "PIECE",
            Unit::Clove => "CLOVE",
            Unit::Slice => "SLICE",
            Unit::Pinch => "PINCH",
            Unit::Can => "CAN",
            Unit::Bottle => "BOTTLE",
            Unit::Packet => "PACKET",
            Unit::Unit => "UNIT",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let canonical = s.trim().to_ascii_uppercase().replace(&['-', ' '][..], "_");
        let unit = match canonical.as_str() {
            "FLOZ" | "FL_OZ" | "FLUID_OZ" => Unit::FlOz,
            other => Unit::ALL
                .iter()
                .copied()
                .find(|u| u.as_str() == other)
                .ok_or_else(|| Error::UnknownUnit(s.to_string()))?,
        };
        Ok(unit)
    }
}

// ============================================================================
// Quantity
// ============================================================================

/// An amount in a recipe unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub amount: f64,
    pub measurement: Unit,
}

impl Quantity {
    /// Build a quantity, rejecting non-finite or non-positive amounts
    pub fn new(amount: f64, measurement: Unit) -> Result<Self> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "amount must be a positive number, got {}",
                amount
            )));
        }
        Ok(Self { amount, measurement })
    }

    pub fn grams(amount: f64) -> Self {
        Self {
            amount,
            measurement: Unit::G,
        }
    }

    /// Quantity assumed when a caller supplies none
    pub fn default_serving() -> Self {
        Self::grams(100.0)
    }
}

// ============================================================================
// Allergens
// ============================================================================

/// Allergen vocabulary (EU 14 plus common additions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Allergen {
    Milk,
    Eggs,
    Fish,
    Shellfish,
    TreeNuts,
    Peanuts,
    Wheat,
    Soybeans,
    Sesame,
    Celery,
    Mustard,
    Lupin,
    Sulphites,
    Almonds,
    Cashews,
    Hazelnuts,
    Walnuts,
    Gluten,
    Coconut,
    Corn,
    Yeast,
    Gelatin,
    Kiwi,
    Pork,
    Beef,
    Alcohol,
    SulfurDioxide,
    Phenylalanine,
    None,
    Unknown,
}

impl Allergen {
    pub const ALL: [Allergen; 30] = [
        Allergen::Milk,
        Allergen::Eggs,
        Allergen::Fish,
        Allergen::Shellfish,
        Allergen::TreeNuts,
        Allergen::Peanuts,
        Allergen::Wheat,
        Allergen::Soybeans,
        Allergen::Sesame,
        Allergen::Celery,
        Allergen::Mustard,
        Allergen::Lupin,
        Allergen::Sulphites,
        Allergen::Almonds,
        Allergen::Cashews,
        Allergen::Hazelnuts,
        Allergen::Walnuts,
        Allergen::Gluten,
        Allergen::Coconut,
        Allergen::Corn,
        Allergen::Yeast,
        Allergen::Gelatin,
        Allergen::Kiwi,
        Allergen::Pork,
        Allergen::Beef,
        Allergen::Alcohol,
        Allergen::SulfurDioxide,
        Allergen::Phenylalanine,
        Allergen::None,
        Allergen::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Allergen::Milk => "MILK",
            Allergen::Eggs => "EGGS",
            Allergen::Fish => "FISH",
            Allergen::Shellfish => "SHELLFISH",
            Allergen::TreeNuts => "TREE_NUTS",
            Allergen::Peanuts => "PEANUTS",
            Allergen::Wheat => "WHEAT",
            Allergen::Soybeans => "SOYBEANS",
            Allergen::Sesame => "SESAME",
            Allergen::Celery => "CELERY",
            Allergen::Mustard => "MUSTARD",
            Allergen::Lupin => "LUPIN",
            Allergen::Sulphites => "SULPHITES",
            Allergen::Almonds => "ALMONDS",
            Allergen::Cashews => "CASHEWS",
            Allergen::Hazelnuts => "HAZELNUTS",
            Allergen::Walnuts => "WALNUTS",
            Allergen::Gluten => "GLUTEN",
            Allergen::Coconut => "COCONUT",
            Allergen::Corn => "CORN",
            Allergen::Yeast => "YEAST",
            Allergen::Gelatin => "GELATIN",
            Allergen::Kiwi => "KIWI",
            Allergen::Pork => "PORK",
            Allergen::Beef => "BEEF",
            Allergen::Alcohol => "ALCOHOL",
            Allergen::SulfurDioxide => "SULFUR_DIOXIDE",
            Allergen::Phenylalanine => "PHENYLALANINE",
            Allergen::None => "NONE",
            Allergen::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Allergen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Allergen {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let canonical = s.trim().to_ascii_uppercase();
        Allergen::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == canonical)
            .ok_or_else(|| Error::InvalidInput(format!("unknown allergen: {}", s)))
    }
}

/// How an allergen is present in an ingredient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceType {
    Contains,
    MayContain,
    Traces,
}

impl PresenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            PresenceType::Contains => "CONTAINS",
            PresenceType::MayContain => "MAY_CONTAIN",
            PresenceType::Traces => "TRACES",
        }
    }
}

impl FromStr for PresenceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONTAINS" => Ok(PresenceType::Contains),
            "MAY_CONTAIN" => Ok(PresenceType::MayContain),
            "TRACES" => Ok(PresenceType::Traces),
            other => Err(Error::InvalidInput(format!("unknown presence type: {}", other))),
        }
    }
}

// ============================================================================
// Provenance and classification
// ============================================================================

/// Where an attribute value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSource {
    Usda,
    OpenFoodFacts,
    LlmInferred,
    Manual,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Usda => "USDA",
            DataSource::OpenFoodFacts => "OPEN_FOOD_FACTS",
            DataSource::LlmInferred => "LLM_INFERRED",
            DataSource::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// USDA food group, used by the pricing fallback tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FoodGroup {
    Vegetables,
    Fruits,
    Grains,
    Legumes,
    NutsSeeds,
    Meat,
    Poultry,
    Seafood,
    Dairy,
    Beverages,
    ProcessedFoods,
    Unknown,
}

impl FoodGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            FoodGroup::Vegetables => "VEGETABLES",
            FoodGroup::Fruits => "FRUITS",
            FoodGroup::Grains => "GRAINS",
            FoodGroup::Legumes => "LEGUMES",
            FoodGroup::NutsSeeds => "NUTS_SEEDS",
            FoodGroup::Meat => "MEAT",
            FoodGroup::Poultry => "POULTRY",
            FoodGroup::Seafood => "SEAFOOD",
            FoodGroup::Dairy => "DAIRY",
            FoodGroup::Beverages => "BEVERAGES",
            FoodGroup::ProcessedFoods => "PROCESSED_FOODS",
            FoodGroup::Unknown => "UNKNOWN",
        }
    }
}

impl FromStr for FoodGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let group = match s.trim().to_ascii_uppercase().as_str() {
            "VEGETABLES" => FoodGroup::Vegetables,
            "FRUITS" => FoodGroup::Fruits,
            "GRAINS" => FoodGroup::Grains,
            "LEGUMES" => FoodGroup::Legumes,
            "NUTS_SEEDS" => FoodGroup::NutsSeeds,
            "MEAT" => FoodGroup::Meat,
            "POULTRY" => FoodGroup::Poultry,
            "SEAFOOD" => FoodGroup::Seafood,
            "DAIRY" => FoodGroup::Dairy,
            "BEVERAGES" => FoodGroup::Beverages,
            "PROCESSED_FOODS" => FoodGroup::ProcessedFoods,
            "UNKNOWN" => FoodGroup::Unknown,
            other => return Err(Error::InvalidInput(format!("unknown food group: {}", other))),
        };
        Ok(group)
    }
}

/// Normalized form of an ingredient name used for cache keys and matching:
/// trimmed, lower-cased, inner whitespace collapsed to single spaces
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
