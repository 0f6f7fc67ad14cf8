//! Read-only repositories over the ingredient datastore
//!
//! Every query here is a plain `SELECT`; the resolver never writes to the
//! ingredient datastore. Name comparison is case-insensitive throughout.

pub mod allergens;
pub mod ingredients;
pub mod nutrition;
pub mod portions;
pub mod pricing;
pub mod similarity;

pub use allergens::AllergenRepository;
pub use ingredients::{Ingredient, IngredientRepository};
pub use nutrition::NutritionRepository;
pub use portions::PortionRepository;
pub use pricing::{PriceRow, PricingRepository};
