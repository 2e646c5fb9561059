//! Primary content listing: filter, count, page, enrich.
//!
//! The count, the page slice, and the page's tags are read inside one
//! read transaction so the three queries observe the same snapshot even
//! while ingestion is writing.

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::filter::ContentFilter;
use crate::metrics;
use crate::models::{AuthorView, ContentEnvelope, ContentRecord};
use crate::pagination::{Page, PageRequest};

/// Columns of a content row joined with its author. Restricted fields
/// (`big_metadata`, `secret_value`) are never selected.
pub(crate) const RECORD_COLUMNS: &str = "c.id, c.unique_id, c.url, c.title, c.thumbnail_url, \
     c.timestamp, c.like_count, c.comment_count, c.view_count, c.share_count, \
     a.id AS author_id, a.unique_id AS author_unique_id, a.username AS author_username, \
     a.name AS author_name, a.url AS author_url, a.title AS author_title, \
     a.followers AS author_followers";

pub(crate) const RECORD_SOURCE: &str = " FROM contents c JOIN authors a ON a.id = c.author_id";

/// Stable newest-first ordering shared by every listing.
pub(crate) const NEWEST_FIRST: &str = " ORDER BY c.timestamp DESC, c.id DESC";

pub(crate) fn record_from_row(row: &SqliteRow) -> ContentRecord {
    ContentRecord {
        id: row.get("id"),
        unique_id: row.get("unique_id"),
        url: row.get("url"),
        title: row.get("title"),
        thumbnail_url: row.get("thumbnail_url"),
        timestamp: row.get("timestamp"),
        like_count: row.get("like_count"),
        comment_count: row.get("comment_count"),
        view_count: row.get("view_count"),
        share_count: row.get("share_count"),
        author: AuthorView {
            id: row.get("author_id"),
            unique_id: row.get("author_unique_id"),
            username: row.get("author_username"),
            name: row.get("author_name"),
            url: row.get("author_url"),
            title: row.get("author_title"),
            followers: row.get("author_followers"),
        },
    }
}

/// List content matching `filter`, newest first, sliced to `request`.
///
/// A page past the end yields an empty `items` with the real `total`.
pub async fn list_contents(
    pool: &SqlitePool,
    filter: &ContentFilter,
    request: PageRequest,
    now: DateTime<Utc>,
) -> Result<Page<ContentEnvelope>> {
    let mut tx = pool.begin().await?;

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
    count.push(RECORD_SOURCE);
    filter.push_where(&mut count, now);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;

    if request.offset() >= total {
        tx.commit().await?;
        return Ok(Page::empty(request, total));
    }

    let mut select = QueryBuilder::<Sqlite>::new("SELECT ");
    select.push(RECORD_COLUMNS);
    select.push(RECORD_SOURCE);
    filter.push_where(&mut select, now);
    select.push(NEWEST_FIRST);
    select.push(" LIMIT ");
    select.push_bind(request.limit());
    select.push(" OFFSET ");
    select.push_bind(request.offset());

    let rows = select.build().fetch_all(&mut *tx).await?;
    let records: Vec<ContentRecord> = rows.iter().map(record_from_row).collect();
    let items = metrics::enrich_page(&mut *tx, records).await?;

    tx.commit().await?;

    Ok(Page {
        items,
        page: request.page,
        items_per_page: request.items_per_page,
        total,
    })
}

/// The `limit` most recently ingested content rows with their authors.
pub async fn recent_contents(pool: &SqlitePool, limit: i64) -> Result<Vec<ContentRecord>> {
    let sql = format!(
        "SELECT {}{}{} LIMIT ?",
        RECORD_COLUMNS, RECORD_SOURCE, NEWEST_FIRST
    );
    let rows = sqlx::query(&sql).bind(limit).fetch_all(pool).await?;
    Ok(rows.iter().map(record_from_row).collect())
}

/// CLI entry point: print one page of the listing.
pub async fn run_list(
    config: &Config,
    filter: &ContentFilter,
    page: Option<i64>,
    items_per_page: Option<i64>,
) -> anyhow::Result<()> {
    let request = PageRequest::new(page, items_per_page, &config.pagination)?;
    let pool = db::connect(config).await?;
    let result = list_contents(&pool, filter, request, Utc::now())
        .await
        .context("listing contents failed")?;
    pool.close().await;

    if result.items.is_empty() {
        println!("No results.");
    }

    for (i, env) in result.items.iter().enumerate() {
        let c = &env.content;
        println!(
            "{}. [{}] {} (@{})",
            request.offset() + i as i64 + 1,
            c.id,
            if c.title.is_empty() { "(untitled)" } else { c.title.as_str() },
            env.author.username
        );
        println!("    ingested: {}", c.timestamp.format("%Y-%m-%d %H:%M"));
        println!(
            "    likes: {}  comments: {}  shares: {}  views: {}",
            c.like_count, c.comment_count, c.share_count, c.view_count
        );
        println!(
            "    engagement: {}  rate: {:.4}",
            c.total_engagement, c.engagement_rate
        );
        if !c.tags.is_empty() {
            println!("    tags: {}", c.tags.join(", "));
        }
        println!("    url: {}", c.url);
        println!();
    }

    println!(
        "page {} of {} ({} matching)",
        result.page,
        result.total_pages(),
        result.total
    );
    Ok(())
}
