//! TOML configuration.
//!
//! Every setting lives in a single file (default `./config/pulse.toml`).
//! `[feed]` and `[enrichment]` are optional: when a section is absent the
//! corresponding scheduler stage is not registered.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub feed: Option<FeedConfig>,
    #[serde(default)]
    pub enrichment: Option<EnrichmentConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_page_size() -> i64 {
    10
}
fn default_max_page_size() -> i64 {
    100
}

/// Upstream content feed, pulled by the `pull_and_store` stage.
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
    #[serde(default = "default_fast_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// External comment-generation API, driven by the enrichment gate.
#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    pub url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_fast_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_post_interval")]
    pub post_interval_secs: u64,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: i64,
    #[serde(default = "default_dedup_ttl")]
    pub dedup_ttl_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_fast_interval() -> u64 {
    5
}
fn default_post_interval() -> u64 {
    30
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_api_key_env() -> String {
    "API_KEY".to_string()
}
fn default_recent_limit() -> i64 {
    10
}
fn default_dedup_ttl() -> u64 {
    60 * 60 * 24
}

impl FeedConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EnrichmentConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn post_interval(&self) -> Duration {
        Duration::from_secs(self.post_interval_secs)
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.pagination.default_page_size < 1 {
        anyhow::bail!("pagination.default_page_size must be >= 1");
    }
    if config.pagination.max_page_size < config.pagination.default_page_size {
        anyhow::bail!("pagination.max_page_size must be >= pagination.default_page_size");
    }

    if let Some(feed) = &config.feed {
        if feed.interval_secs == 0 || feed.timeout_secs == 0 {
            anyhow::bail!("feed.interval_secs and feed.timeout_secs must be > 0");
        }
    }

    if let Some(enrichment) = &config.enrichment {
        if enrichment.interval_secs == 0
            || enrichment.post_interval_secs == 0
            || enrichment.timeout_secs == 0
        {
            anyhow::bail!("enrichment intervals and timeout_secs must be > 0");
        }
        if enrichment.recent_limit < 1 {
            anyhow::bail!("enrichment.recent_limit must be >= 1");
        }
        if enrichment.dedup_ttl_secs == 0 {
            anyhow::bail!("enrichment.dedup_ttl_secs must be > 0");
        }
        if enrichment.api_key_env.trim().is_empty() {
            anyhow::bail!("enrichment.api_key_env must not be empty");
        }
    }

    Ok(())
}
