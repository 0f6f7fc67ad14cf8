//! Ingredient datastore access
//!
//! The USDA-derived datastore is owned by the ingredient pipeline; services in
//! this workspace only read it.

#[cfg(feature = "sqlx")]
pub mod schema;

#[cfg(feature = "sqlx")]
pub use pool::{connect_readonly, connect_writable};

#[cfg(feature = "sqlx")]
mod pool {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
    use std::path::Path;
    use std::str::FromStr;

    use crate::{Error, Result};

    /// Open the ingredient datastore read-only
    ///
    /// `max_connections` bounds concurrent queries from all resolution tiers.
    pub async fn connect_readonly(db_path: &Path, max_connections: u32) -> Result<SqlitePool> {
        if !db_path.exists() {
            return Err(Error::Config(format!(
                "Ingredient database not found: {}",
                db_path.display()
            )));
        }

        let db_url = format!("sqlite://{}?mode=ro", db_path.display());
        tracing::debug!("Connecting to ingredient database: {}", db_url);

        let options = SqliteConnectOptions::from_str(&db_url)?.read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        Ok(pool)
    }

    /// Open (creating if needed) a writable SQLite file
    ///
    /// Used for the persistent cache, never for the ingredient datastore.
    pub async fn connect_writable(db_path: &Path) -> Result<SqlitePool> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        tracing::debug!("Connecting to writable database: {}", db_url);

        Ok(SqlitePool::connect(&db_url).await?)
    }
}
