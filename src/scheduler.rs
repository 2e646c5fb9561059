//! Periodic pipeline stages.
//!
//! A [`Scheduler`] is built once at startup and owns every stage with its
//! interval and collaborators. Each stage ticks on its own tokio interval;
//! a failing tick is logged and the next one proceeds. Missed ticks are
//! skipped rather than replayed in a burst.

use anyhow::Result;
use sqlx::SqlitePool;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::SqliteDedupCache;
use crate::config::Config;
use crate::enrichment::{EnrichmentGate, HttpCommentGenerator};
use crate::feed::{self, FeedSource, HttpFeed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PullAndStore,
    GenerateComment,
    /// Declared for schedule parity; posting comments back is handled by
    /// an external collaborator.
    PostComment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PullAndStore => "pull_and_store",
            Stage::GenerateComment => "generate_comment",
            Stage::PostComment => "post_comment",
        };
        f.write_str(name)
    }
}

pub struct Scheduler {
    pool: SqlitePool,
    feed: Option<(Arc<dyn FeedSource>, Duration)>,
    gate: Option<(Arc<EnrichmentGate>, Duration)>,
    post_interval: Option<Duration>,
}

impl Scheduler {
    /// A scheduler with no stages.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            feed: None,
            gate: None,
            post_interval: None,
        }
    }

    /// Register the stages whose sections are present in `config`, using
    /// the HTTP collaborators and the SQLite-backed dedup cache.
    pub fn from_config(config: &Config, pool: SqlitePool) -> Result<Self> {
        let mut scheduler = Self::new(pool.clone());

        if let Some(feed_config) = &config.feed {
            let feed = HttpFeed::from_config(feed_config)?;
            scheduler = scheduler.with_feed(Arc::new(feed), feed_config.interval());
        }

        if let Some(enrichment) = &config.enrichment {
            let generator = HttpCommentGenerator::from_config(enrichment)?;
            let gate = EnrichmentGate::new(
                pool.clone(),
                Arc::new(SqliteDedupCache::new(pool)),
                Arc::new(generator),
                enrichment.recent_limit,
                enrichment.dedup_ttl(),
            );
            scheduler = scheduler.with_gate(
                Arc::new(gate),
                enrichment.interval(),
                enrichment.post_interval(),
            );
        }

        Ok(scheduler)
    }

    pub fn with_feed(mut self, feed: Arc<dyn FeedSource>, interval: Duration) -> Self {
        self.feed = Some((feed, interval));
        self
    }

    pub fn with_gate(
        mut self,
        gate: Arc<EnrichmentGate>,
        interval: Duration,
        post_interval: Duration,
    ) -> Self {
        self.gate = Some((gate, interval));
        self.post_interval = Some(post_interval);
        self
    }

    /// Registered stages and their intervals.
    pub fn stages(&self) -> Vec<(Stage, Duration)> {
        let mut stages = Vec::new();
        if let Some((_, interval)) = &self.feed {
            stages.push((Stage::PullAndStore, *interval));
        }
        if let Some((_, interval)) = &self.gate {
            stages.push((Stage::GenerateComment, *interval));
        }
        if let Some(interval) = self.post_interval {
            stages.push((Stage::PostComment, interval));
        }
        stages
    }

    /// Run every stage until `shutdown` resolves, then abort them.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let stages = self.stages();
        if stages.is_empty() {
            info!("no pipeline stages configured");
        }
        for (stage, interval) in &stages {
            info!(stage = %stage, interval_secs = interval.as_secs(), "stage registered");
        }

        let mut tasks = JoinSet::new();

        if let Some((feed, interval)) = self.feed {
            let pool = self.pool.clone();
            tasks.spawn(every(Stage::PullAndStore, interval, move || {
                let pool = pool.clone();
                let feed = feed.clone();
                async move {
                    feed::pull_and_store(&pool, feed.as_ref())
                        .await
                        .map(|r| format!("{} ingested, {} rejected", r.ingested, r.rejected))
                }
            }));
        }

        if let Some((gate, interval)) = self.gate {
            tasks.spawn(every(Stage::GenerateComment, interval, move || {
                let gate = gate.clone();
                async move {
                    gate.tick().await.map(|r| {
                        format!(
                            "{} generated, {} skipped, {} failed",
                            r.generated, r.skipped, r.failed
                        )
                    })
                }
            }));
        }

        if let Some(interval) = self.post_interval {
            tasks.spawn(every(Stage::PostComment, interval, || async {
                Ok::<_, crate::error::Error>("nothing to post".to_string())
            }));
        }

        shutdown.await;
        info!("stopping pipeline stages");
        tasks.shutdown().await;
    }
}

/// Tick `run` every `interval` forever, logging each outcome.
async fn every<F, Fut>(stage: Stage, interval: Duration, run: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = crate::error::Result<String>> + Send,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let outcome = run().await;
        match outcome {
            Ok(summary) => debug!(stage = %stage, "{}", summary),
            Err(e) => warn!(stage = %stage, error = %e, "tick failed"),
        }
    }
}
