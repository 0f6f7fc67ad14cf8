//! Error type shared by the Larder crates

use thiserror::Error;

/// Result alias used across larder-common
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised outside the per-request resolution path
///
/// Resolution itself never surfaces datastore or transport failures to callers
/// (they degrade to tier misses), so these show up mostly at startup and in
/// configuration handling.
#[derive(Error, Debug)]
pub enum Error {
    /// Datastore error from sqlx
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bootstrap configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Measurement string that names no known unit
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    /// Caller supplied a value outside its domain (e.g. a negative amount)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
