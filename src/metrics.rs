//! Per-item derived metrics for a page of content.
//!
//! Engagement is `likes + comments + shares`; the rate divides it by views
//! and is `0.0` whenever there are no views. Tag names for a whole page are
//! loaded with one query keyed by the page's content ids.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use std::collections::HashMap;

use crate::error::Result;
use crate::models::{ContentEnvelope, ContentRecord, ContentView};

/// Derived engagement numbers for one content item (or a set of them).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Engagement {
    pub total: i64,
    pub rate: f64,
}

pub fn engagement(likes: i64, comments: i64, shares: i64, views: i64) -> Engagement {
    let total = likes.saturating_add(comments).saturating_add(shares);
    Engagement {
        total,
        rate: engagement_rate(total, views),
    }
}

/// Plain ratio, not a percentage. Never NaN or infinite.
pub fn engagement_rate(total_engagement: i64, views: i64) -> f64 {
    if views > 0 {
        total_engagement as f64 / views as f64
    } else {
        0.0
    }
}

/// Attach engagement and tag names to every record of a page, preserving
/// the page's order.
pub async fn enrich_page(
    conn: &mut SqliteConnection,
    records: Vec<ContentRecord>,
) -> Result<Vec<ContentEnvelope>> {
    let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
    let mut tags = fetch_tags(conn, &ids).await?;

    Ok(records
        .into_iter()
        .map(|record| {
            let names = tags.remove(&record.id).unwrap_or_default();
            envelope(record, names)
        })
        .collect())
}

/// Tag names per content id, sorted by name, in a single query.
pub async fn fetch_tags(
    conn: &mut SqliteConnection,
    content_ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>> {
    let mut by_content: HashMap<i64, Vec<String>> = HashMap::new();
    if content_ids.is_empty() {
        return Ok(by_content);
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT ct.content_id, t.name FROM content_tags ct \
         JOIN tags t ON t.id = ct.tag_id WHERE ct.content_id IN (",
    );
    let mut ids = qb.separated(", ");
    for id in content_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(") ORDER BY ct.content_id, t.name");

    let rows = qb.build().fetch_all(&mut *conn).await?;
    for row in rows {
        by_content
            .entry(row.get("content_id"))
            .or_default()
            .push(row.get("name"));
    }

    Ok(by_content)
}

/// Build the public envelope for a record. Restricted fields never reach
/// a [`ContentRecord`], so they cannot leak through here.
pub fn envelope(record: ContentRecord, tags: Vec<String>) -> ContentEnvelope {
    let Engagement { total, rate } = engagement(
        record.like_count,
        record.comment_count,
        record.share_count,
        record.view_count,
    );

    ContentEnvelope {
        content: ContentView {
            id: record.id,
            unique_id: record.unique_id,
            url: record.url,
            title: record.title,
            thumbnail_url: record.thumbnail_url,
            timestamp: DateTime::<Utc>::from_timestamp(record.timestamp, 0).unwrap_or_default(),
            like_count: record.like_count,
            comment_count: record.comment_count,
            view_count: record.view_count,
            share_count: record.share_count,
            engagement_rate: rate,
            total_engagement: total,
            tags,
        },
        author: record.author,
    }
}
