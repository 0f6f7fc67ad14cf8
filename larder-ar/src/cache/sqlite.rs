//! Persistent cache backend in its own SQLite file

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;

use super::{CacheError, CacheStore};

/// Cache table in a dedicated writable SQLite file
///
/// Survives restarts. Expiry is stored as unix milliseconds and checked on read.
#[derive(Clone)]
pub struct SqliteCache {
    db: SqlitePool,
}

impl SqliteCache {
    /// Wrap `db` and create the cache table if missing
    pub async fn new(db: SqlitePool) -> Result<Self, CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await?;

        Ok(Self { db })
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM cache_entries WHERE key = ? AND expires_at > ?")
                .bind(key)
                .bind(now_millis())
                .fetch_optional(&self.db)
                .await?;
        Ok(row.map(|(payload,)| payload))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = i64::try_from(ttl.as_millis())
            .map_err(|_| CacheError::Backend(format!("TTL out of range: {:?}", ttl)))?;
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, payload, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now_millis().saturating_add(ttl_ms))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
