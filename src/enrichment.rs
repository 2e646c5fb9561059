//! Enrichment gate: at-most-once comment generation per content item.
//!
//! On every tick the gate looks at the most recently ingested content. An
//! item with a live entry in the [`DedupCache`] is skipped; any other item
//! is sent to the [`CommentGenerator`]. Only a successful response writes
//! the cache entry, so failed or timed-out items are retried on the next
//! tick for as long as they stay in the recent window.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{comment_key, DedupCache, SqliteDedupCache};
use crate::config::{Config, EnrichmentConfig};
use crate::db;
use crate::error::{Error, Result};
use crate::query;

/// Body sent to the comment-generation API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentRequest {
    pub content_id: i64,
    pub title: String,
    pub url: String,
    pub author_username: String,
}

/// External comment-generation collaborator.
#[async_trait]
pub trait CommentGenerator: Send + Sync {
    /// Request a comment. `Ok` carries the collaborator's response body.
    async fn generate(&self, request: &CommentRequest) -> Result<serde_json::Value>;
}

/// [`CommentGenerator`] backed by the HTTP enrichment API.
pub struct HttpCommentGenerator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpCommentGenerator {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::upstream("comment generator", e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }

    /// Build from config, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "enrichment API key not set; requests will be sent without x-api-key"
            );
        }
        Self::new(config.url.clone(), api_key, config.timeout())
    }
}

#[async_trait]
impl CommentGenerator for HttpCommentGenerator {
    async fn generate(&self, request: &CommentRequest) -> Result<serde_json::Value> {
        let mut req = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::upstream("comment generator", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(
                "comment generator",
                format!("HTTP {}: {}", status, body),
            ));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| Error::upstream("comment generator", format!("invalid body: {}", e)))
    }
}

/// Outcome counts of one gate tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Items for which a comment was generated and recorded.
    pub generated: usize,
    /// Items already recorded in the cache.
    pub skipped: usize,
    /// Items whose request failed; retried next tick.
    pub failed: usize,
}

pub struct EnrichmentGate {
    pool: SqlitePool,
    cache: Arc<dyn DedupCache>,
    generator: Arc<dyn CommentGenerator>,
    recent_limit: i64,
    ttl: Duration,
}

impl EnrichmentGate {
    pub fn new(
        pool: SqlitePool,
        cache: Arc<dyn DedupCache>,
        generator: Arc<dyn CommentGenerator>,
        recent_limit: i64,
        ttl: Duration,
    ) -> Self {
        Self {
            pool,
            cache,
            generator,
            recent_limit,
            ttl,
        }
    }

    /// Run one pass over the recent window.
    ///
    /// Collaborator failures are counted, not returned. A failed cache
    /// write is logged and the item is retried on a later tick. Storage or
    /// cache read failures abort the tick, since without the cache the gate
    /// cannot tell whether an item was already processed.
    pub async fn tick(&self) -> Result<TickReport> {
        if let Err(e) = self.cache.purge_expired().await {
            warn!(error = %e, "dedup cache purge failed");
        }

        let recent = query::recent_contents(&self.pool, self.recent_limit).await?;
        let mut report = TickReport::default();

        for record in recent {
            let key = comment_key(record.id);
            if self.cache.get(&key).await?.is_some() {
                debug!(content_id = record.id, "comment already requested; skipping");
                report.skipped += 1;
                continue;
            }

            let request = CommentRequest {
                content_id: record.id,
                title: record.title,
                url: record.url,
                author_username: record.author.username,
            };

            match self.generator.generate(&request).await {
                Ok(comment) => {
                    info!(content_id = request.content_id, "comment generated");
                    report.generated += 1;
                    if let Err(e) = self.cache.set(&key, &comment, self.ttl).await {
                        warn!(
                            content_id = request.content_id,
                            error = %e,
                            "recording generated comment failed"
                        );
                    }
                }
                Err(e) => {
                    warn!(content_id = request.content_id, error = %e, "comment generation failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// CLI entry point: run a single gate tick against the configured API.
pub async fn run_enrich(config: &Config) -> anyhow::Result<()> {
    let enrichment = config
        .enrichment
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("No [enrichment] section in config"))?;
    let generator = HttpCommentGenerator::from_config(enrichment)?;

    let pool = db::connect(config).await?;
    let gate = EnrichmentGate::new(
        pool.clone(),
        Arc::new(SqliteDedupCache::new(pool.clone())),
        Arc::new(generator),
        enrichment.recent_limit,
        enrichment.dedup_ttl(),
    );
    let report = gate.tick().await?;
    pool.close().await;

    println!("enrich {}", enrichment.url);
    println!("  generated: {}", report.generated);
    println!("  skipped: {}", report.skipped);
    println!("  failed: {}", report.failed);
    println!("ok");

    Ok(())
}
