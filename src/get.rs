//! Single content retrieval by internal id.
//!
//! Used by `pulse get`, `GET /contents/{id}`, and ingestion to build its
//! response envelope.

use anyhow::Result as AnyResult;
use sqlx::{SqliteConnection, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::metrics;
use crate::models::ContentEnvelope;
use crate::query::{record_from_row, RECORD_COLUMNS, RECORD_SOURCE};

pub async fn get_content(pool: &SqlitePool, id: i64) -> Result<ContentEnvelope> {
    let mut conn = pool.acquire().await?;
    load_envelope(&mut *conn, id).await
}

/// Load one envelope on an existing connection or transaction.
pub(crate) async fn load_envelope(conn: &mut SqliteConnection, id: i64) -> Result<ContentEnvelope> {
    let sql = format!("SELECT {}{} WHERE c.id = ?", RECORD_COLUMNS, RECORD_SOURCE);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "content",
            id: id.to_string(),
        })?;

    let record = record_from_row(&row);
    let mut tags = metrics::fetch_tags(conn, &[id]).await?;
    Ok(metrics::envelope(record, tags.remove(&id).unwrap_or_default()))
}

/// CLI entry point: fetch one content item and print it.
pub async fn run_get(config: &Config, id: i64) -> AnyResult<()> {
    let pool = db::connect(config).await?;
    let env = get_content(&pool, id).await?;
    pool.close().await;

    let c = &env.content;
    let a = &env.author;
    println!("--- Content ---");
    println!("id:               {}", c.id);
    println!("unique_id:        {}", c.unique_id);
    println!("title:            {}", c.title);
    println!("url:              {}", c.url);
    println!("thumbnail_url:    {}", c.thumbnail_url);
    println!("ingested:         {}", c.timestamp.to_rfc3339());
    println!("likes:            {}", c.like_count);
    println!("comments:         {}", c.comment_count);
    println!("shares:           {}", c.share_count);
    println!("views:            {}", c.view_count);
    println!("total_engagement: {}", c.total_engagement);
    println!("engagement_rate:  {:.4}", c.engagement_rate);
    println!("tags:             {}", c.tags.join(", "));
    println!();
    println!("--- Author ---");
    println!("id:               {}", a.id);
    println!("unique_id:        {}", a.unique_id);
    println!("username:         {}", a.username);
    println!("name:             {}", a.name);
    println!("followers:        {}", a.followers);

    Ok(())
}
