//! Idempotent schema setup.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One table for every entity type; `fields_json` carries the
    // type-specific text columns.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            entity_type TEXT NOT NULL,
            id TEXT NOT NULL,
            title_en TEXT NOT NULL,
            title_ar TEXT NOT NULL DEFAULT '',
            description_en TEXT,
            description_ar TEXT,
            fields_json TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'active',
            is_archived INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL,
            title_norm_en TEXT NOT NULL DEFAULT '',
            title_norm_ar TEXT NOT NULL DEFAULT '',
            embedding BLOB,
            embedded_at INTEGER,
            PRIMARY KEY (entity_type, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embedding_queue (
            id TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 5,
            created_at INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            UNIQUE(entity_type, entity_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query TEXT NOT NULL,
            normalized_query TEXT NOT NULL,
            result_count INTEGER NOT NULL,
            searched_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='records_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE records_fts USING fts5(
                entity_type UNINDEXED,
                record_id UNINDEXED,
                title,
                body
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_type_updated ON records(entity_type, updated_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_queue_order ON embedding_queue(priority ASC, created_at ASC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_history_searched_at ON query_history(searched_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
