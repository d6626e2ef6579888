//! [`CacheBackend`] stored in the application database.
//!
//! Lets separate CLI invocations share suggestion and result entries: the
//! `warm` command fills the table and later `suggest` calls read it.
//! Expiry is checked on read; expired rows are swept on every write.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::time::Duration;

use crate::cache::CacheBackend;

pub struct SqliteCacheBackend {
    pool: SqlitePool,
}

impl SqliteCacheBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let expires_at = now + ttl.as_millis() as i64;

        sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Translate a `*` glob into a `LIKE` pattern escaped with `\`.
fn glob_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            '*' => out.push('%'),
            other => out.push(other),
        }
    }
    out
}

#[async_trait]
impl CacheBackend for SqliteCacheBackend {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM cache_entries WHERE key = ? AND expires_at > ?")
            .bind(key)
            .bind(Utc::now().timestamp_millis())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key LIKE ? ESCAPE '\\'")
            .bind(glob_to_like(pattern))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn set_scored(&self, key: &str, entries: &[(f64, String)], ttl: Duration) -> Result<()> {
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| b.0.total_cmp(&a.0));
        self.put(key, &serde_json::to_string(&sorted)?, ttl).await
    }

    async fn get_top_n(&self, key: &str, n: usize) -> Result<Vec<(f64, String)>> {
        let Some(raw) = self.get(key).await? else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<(f64, String)> = serde_json::from_str(&raw)?;
        entries.truncate(n);
        Ok(entries)
    }
}
