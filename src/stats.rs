//! Aggregate statistics over a filtered content set.
//!
//! Sums are computed by one SQL aggregate over the whole filtered set,
//! never by summing a page. `total_followers` counts an author's followers
//! once per matching content row. Sums use SQLite `TOTAL()`, which never
//! raises on overflow; totals beyond `i64` saturate.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::filter::ContentFilter;
use crate::metrics::engagement_rate;
use crate::query::RECORD_SOURCE;

/// Response body of the stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentStats {
    pub total_likes: i64,
    pub total_shares: i64,
    pub total_views: i64,
    pub total_comments: i64,
    pub total_followers: i64,
    pub total_contents: i64,
    pub total_engagement: i64,
    pub total_engagement_rate: f64,
}

impl ContentStats {
    /// Fill in the derived totals from the raw sums.
    fn with_derived(mut self) -> Self {
        self.total_engagement = self
            .total_likes
            .saturating_add(self.total_shares)
            .saturating_add(self.total_comments);
        self.total_engagement_rate = engagement_rate(self.total_engagement, self.total_views);
        self
    }
}

pub async fn aggregate(
    pool: &SqlitePool,
    filter: &ContentFilter,
    now: DateTime<Utc>,
) -> Result<ContentStats> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT \
         TOTAL(c.like_count) AS total_likes, \
         TOTAL(c.share_count) AS total_shares, \
         TOTAL(c.view_count) AS total_views, \
         TOTAL(c.comment_count) AS total_comments, \
         TOTAL(a.followers) AS total_followers, \
         COUNT(c.id) AS total_contents",
    );
    qb.push(RECORD_SOURCE);
    filter.push_where(&mut qb, now);

    let row = qb.build().fetch_one(pool).await?;

    let stats = ContentStats {
        total_likes: saturating_sum(row.get("total_likes")),
        total_shares: saturating_sum(row.get("total_shares")),
        total_views: saturating_sum(row.get("total_views")),
        total_comments: saturating_sum(row.get("total_comments")),
        total_followers: saturating_sum(row.get("total_followers")),
        total_contents: row.get("total_contents"),
        ..Default::default()
    };

    Ok(stats.with_derived())
}

/// `TOTAL()` yields a float; the cast clamps to the `i64` range.
fn saturating_sum(total: f64) -> i64 {
    total as i64
}

/// CLI entry point: print the aggregate for a filter.
pub async fn run_stats(config: &Config, filter: &ContentFilter) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let stats = aggregate(&pool, filter, Utc::now())
        .await
        .context("computing stats failed")?;
    pool.close().await;

    println!("Content Stats");
    println!("=============");
    println!();
    println!("  Contents:    {}", stats.total_contents);
    println!("  Likes:       {}", stats.total_likes);
    println!("  Comments:    {}", stats.total_comments);
    println!("  Shares:      {}", stats.total_shares);
    println!("  Views:       {}", stats.total_views);
    println!("  Followers:   {}", stats.total_followers);
    println!();
    println!("  Engagement:  {}", stats.total_engagement);
    println!("  Rate:        {:.4}", stats.total_engagement_rate);
    println!();

    Ok(())
}
