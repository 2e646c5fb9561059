//! Schema migrations.
//!
//! Uniqueness of external identifiers, tag names, and (content, tag) links
//! is enforced here; ingestion relies on these constraints for its atomic
//! upserts. Every statement is idempotent.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS authors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        unique_id TEXT NOT NULL UNIQUE,
        username TEXT NOT NULL,
        name TEXT NOT NULL,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        followers INTEGER NOT NULL DEFAULT 0 CHECK (followers >= 0),
        big_metadata TEXT NOT NULL DEFAULT '{}',
        secret_value TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        unique_id TEXT NOT NULL UNIQUE,
        author_id INTEGER NOT NULL REFERENCES authors(id),
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        title_folded TEXT NOT NULL DEFAULT '',
        thumbnail_url TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        like_count INTEGER NOT NULL DEFAULT 0 CHECK (like_count >= 0),
        comment_count INTEGER NOT NULL DEFAULT 0 CHECK (comment_count >= 0),
        view_count INTEGER NOT NULL DEFAULT 0 CHECK (view_count >= 0),
        share_count INTEGER NOT NULL DEFAULT 0 CHECK (share_count >= 0),
        big_metadata TEXT NOT NULL DEFAULT '{}',
        secret_value TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS content_tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content_id INTEGER NOT NULL REFERENCES contents(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        UNIQUE (content_id, tag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dedup_cache (
        key TEXT PRIMARY KEY,
        value_json TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_contents_timestamp ON contents(timestamp DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_contents_author_id ON contents(author_id)",
    "CREATE INDEX IF NOT EXISTS idx_authors_username ON authors(username)",
    "CREATE INDEX IF NOT EXISTS idx_content_tags_tag_id ON content_tags(tag_id)",
    "CREATE INDEX IF NOT EXISTS idx_dedup_cache_expires_at ON dedup_cache(expires_at)",
];

/// Connect to the configured database and apply the schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an already-open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    add_title_folded(pool).await?;
    Ok(())
}

/// `title_folded` holds `str::to_lowercase` of the title, since SQLite's
/// `lower()` and `LIKE` only fold ASCII. Older databases gain the column
/// here and are backfilled once.
async fn add_title_folded(pool: &SqlitePool) -> Result<()> {
    let present: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('contents') WHERE name = 'title_folded'",
    )
    .fetch_one(pool)
    .await?;
    if present > 0 {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    sqlx::query("ALTER TABLE contents ADD COLUMN title_folded TEXT NOT NULL DEFAULT ''")
        .execute(&mut *tx)
        .await?;
    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, title FROM contents")
        .fetch_all(&mut *tx)
        .await?;
    for (id, title) in rows {
        sqlx::query("UPDATE contents SET title_folded = ? WHERE id = ?")
            .bind(title.to_lowercase())
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(())
}
