//! Ingestion of upstream content payloads.
//!
//! Each payload is written in one transaction: author upsert, content
//! upsert, then tag and link upserts. Every insert is an
//! `INSERT .. ON CONFLICT .. RETURNING id` against a unique constraint, so
//! concurrent ingestion of the same external id converges on one row and
//! the last writer's counters win.

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::get::load_envelope;
use crate::models::{validate_batch, AuthorPayload, ContentEnvelope, ContentPayload, IngestRequest};

/// Validate and store one payload, stamping new content with the current time.
pub async fn ingest(pool: &SqlitePool, payload: &ContentPayload) -> Result<ContentEnvelope> {
    ingest_at(pool, payload, Utc::now()).await
}

/// Like [`ingest`], with an explicit ingestion time for newly created content.
///
/// Re-ingesting an existing external id refreshes its counters, URLs,
/// title, and restricted fields; the first ingestion timestamp is kept.
pub async fn ingest_at(
    pool: &SqlitePool,
    payload: &ContentPayload,
    now: DateTime<Utc>,
) -> Result<ContentEnvelope> {
    payload.validate()?;

    let mut tx = pool.begin().await?;

    let author_id = upsert_author(&mut *tx, &payload.author).await?;
    let content_id = upsert_content(&mut *tx, payload, author_id, now).await?;

    let tags = payload.unique_tags();
    for name in &tags {
        let tag_id = upsert_tag(&mut *tx, name).await?;
        link_tag(&mut *tx, content_id, tag_id).await?;
    }

    let envelope = load_envelope(&mut *tx, content_id).await?;
    tx.commit().await?;

    debug!(
        content_id,
        unique_id = %payload.unq_external_id,
        tags = tags.len(),
        "content ingested"
    );
    Ok(envelope)
}

/// Validate the whole batch up front, then store each payload.
///
/// Nothing is written if any payload is invalid. Each payload commits on
/// its own, so a storage failure midway leaves earlier payloads stored and
/// none partially written.
pub async fn ingest_batch(
    pool: &SqlitePool,
    payloads: &[ContentPayload],
) -> Result<Vec<ContentEnvelope>> {
    validate_batch(payloads)?;

    let now = Utc::now();
    let mut envelopes = Vec::with_capacity(payloads.len());
    for payload in payloads {
        envelopes.push(ingest_at(pool, payload, now).await?);
    }

    info!(count = envelopes.len(), "batch ingested");
    Ok(envelopes)
}

async fn upsert_author(conn: &mut SqliteConnection, author: &AuthorPayload) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO authors (unique_id, username, name, url, title, followers, big_metadata, secret_value)
        VALUES (?, ?, ?, ?, ?, COALESCE(?, 0), ?, ?)
        ON CONFLICT(unique_id) DO UPDATE SET
            username = excluded.username,
            name = excluded.name,
            url = excluded.url,
            title = excluded.title,
            followers = COALESCE(?, authors.followers),
            big_metadata = excluded.big_metadata,
            secret_value = excluded.secret_value
        RETURNING id
        "#,
    )
    .bind(&author.unique_external_id)
    .bind(&author.unique_name)
    .bind(&author.full_name)
    .bind(&author.url)
    .bind(&author.title)
    .bind(author.followers)
    .bind(author.big_metadata.to_string())
    .bind(&author.secret_value)
    .bind(author.followers)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

async fn upsert_content(
    conn: &mut SqliteConnection,
    payload: &ContentPayload,
    author_id: i64,
    now: DateTime<Utc>,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO contents (unique_id, author_id, url, title, title_folded, thumbnail_url,
                              timestamp, like_count, comment_count, view_count, share_count,
                              big_metadata, secret_value)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(unique_id) DO UPDATE SET
            author_id = excluded.author_id,
            url = excluded.url,
            title = excluded.title,
            title_folded = excluded.title_folded,
            thumbnail_url = excluded.thumbnail_url,
            like_count = excluded.like_count,
            comment_count = excluded.comment_count,
            view_count = excluded.view_count,
            share_count = excluded.share_count,
            big_metadata = excluded.big_metadata,
            secret_value = excluded.secret_value
        RETURNING id
        "#,
    )
    .bind(&payload.unq_external_id)
    .bind(author_id)
    .bind(&payload.url)
    .bind(&payload.title)
    .bind(payload.title.to_lowercase())
    .bind(&payload.thumbnail_url)
    .bind(now.timestamp())
    .bind(payload.stats.likes)
    .bind(payload.stats.comments)
    .bind(payload.stats.views)
    .bind(payload.stats.shares)
    .bind(payload.big_metadata.to_string())
    .bind(&payload.secret_value)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

async fn upsert_tag(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    // DO UPDATE (not DO NOTHING) so RETURNING yields the existing id.
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO tags (name) VALUES (?) \
         ON CONFLICT(name) DO UPDATE SET name = excluded.name RETURNING id",
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

async fn link_tag(conn: &mut SqliteConnection, content_id: i64, tag_id: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO content_tags (content_id, tag_id) VALUES (?, ?) \
         ON CONFLICT(content_id, tag_id) DO NOTHING",
    )
    .bind(content_id)
    .bind(tag_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// CLI entry point: ingest a JSON file holding one payload or a list.
pub async fn run_ingest(config: &Config, path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read payload file: {}", path.display()))?;
    let request: IngestRequest = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse payload file: {}", path.display()))?;
    let payloads = request.into_payloads();

    let pool = db::connect(config).await?;
    let envelopes = ingest_batch(&pool, &payloads).await?;
    pool.close().await;

    println!("ingest {}", path.display());
    println!("  payloads: {}", payloads.len());
    println!("  ingested: {}", envelopes.len());
    for env in &envelopes {
        println!(
            "  [{}] {} tags={} engagement={}",
            env.content.id,
            env.content.unique_id,
            env.content.tags.len(),
            env.content.total_engagement
        );
    }
    println!("ok");

    Ok(())
}
