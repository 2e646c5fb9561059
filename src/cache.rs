//! TTL-backed deduplication cache.
//!
//! The enrichment gate records "comment already requested for content X"
//! here. Writes are idempotent: setting an existing key replaces its value
//! and restarts its TTL. An entry is visible strictly before its expiry.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::Result;

/// Cache key recording that a comment was generated for `content_id`.
pub fn comment_key(content_id: i64) -> String {
    format!("comment-{}", content_id)
}

#[async_trait]
pub trait DedupCache: Send + Sync {
    /// The live value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> Result<()>;

    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_millis(ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_millis().saturating_add(ttl_ms)
}

/// Cache stored in the `dedup_cache` table, shared by every process using
/// the same database.
pub struct SqliteDedupCache {
    pool: SqlitePool,
}

impl SqliteDedupCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DedupCache for SqliteDedupCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT value_json FROM dedup_cache WHERE key = ? AND expires_at > ?")
            .bind(key)
            .bind(now_millis())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value_json");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dedup_cache (key, value_json, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value_json = excluded.value_json,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value.to_string())
        .bind(expiry_millis(ttl))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dedup_cache WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Process-local cache, for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryDedupCache {
    entries: Mutex<HashMap<String, (serde_json::Value, i64)>>,
}

impl MemoryDedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (serde_json::Value, i64)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DedupCache for MemoryDedupCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let now = now_millis();
        Ok(self
            .lock()
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> Result<()> {
        self.lock()
            .insert(key.to_string(), (value.clone(), expiry_millis(ttl)));
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = now_millis();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}
