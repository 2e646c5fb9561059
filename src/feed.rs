//! Upstream content feed and the pull-and-store task.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, FeedConfig};
use crate::db;
use crate::error::{Error, Result};
use crate::ingest;
use crate::models::ContentPayload;

/// Source of raw content payloads. Items are returned unparsed so a single
/// malformed item does not discard the rest of the feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<serde_json::Value>>;
}

/// [`FeedSource`] backed by an HTTP endpoint returning a JSON array.
pub struct HttpFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::upstream("feed", e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &FeedConfig) -> Result<Self> {
        Self::new(config.url.clone(), config.timeout())
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self) -> Result<Vec<serde_json::Value>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::upstream("feed", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::upstream("feed", format!("HTTP {}", status)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::upstream("feed", format!("invalid body: {}", e)))?;

        match body {
            serde_json::Value::Array(items) => Ok(items),
            other => Err(Error::upstream(
                "feed",
                format!("expected a JSON array, got {}", json_kind(&other)),
            )),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PullReport {
    pub fetched: usize,
    pub ingested: usize,
    pub rejected: usize,
}

/// Fetch the feed once and ingest every well-formed item.
///
/// Malformed or invalid items are logged and skipped. A feed failure or a
/// storage failure ends the pull with an error.
pub async fn pull_and_store(pool: &SqlitePool, feed: &dyn FeedSource) -> Result<PullReport> {
    let items = feed.fetch().await?;
    let mut report = PullReport {
        fetched: items.len(),
        ..Default::default()
    };

    for (index, item) in items.into_iter().enumerate() {
        let payload: ContentPayload = match serde_json::from_value(item) {
            Ok(p) => p,
            Err(e) => {
                warn!(index, error = %e, "skipping malformed feed item");
                report.rejected += 1;
                continue;
            }
        };

        match ingest::ingest(pool, &payload).await {
            Ok(_) => report.ingested += 1,
            Err(e @ Error::Validation { .. }) => {
                warn!(index, unique_id = %payload.unq_external_id, error = %e, "skipping invalid feed item");
                report.rejected += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        fetched = report.fetched,
        ingested = report.ingested,
        rejected = report.rejected,
        "feed pulled"
    );
    Ok(report)
}

/// CLI entry point: run a single pull from the configured feed.
pub async fn run_pull(config: &Config) -> anyhow::Result<()> {
    let feed_config = config
        .feed
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("No [feed] section in config"))?;
    let feed = HttpFeed::from_config(feed_config)?;

    let pool = db::connect(config).await?;
    let report = pull_and_store(&pool, &feed).await?;
    pool.close().await;

    println!("pull {}", feed_config.url);
    println!("  fetched: {}", report.fetched);
    println!("  ingested: {}", report.ingested);
    println!("  rejected: {}", report.rejected);
    println!("ok");

    Ok(())
}
