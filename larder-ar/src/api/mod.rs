//! HTTP API handlers for larder-ar

pub mod health;
pub mod ingredients;
pub mod recipes;
pub mod views;

pub use health::health_routes;
pub use ingredients::ingredient_routes;
pub use recipes::recipe_routes;
