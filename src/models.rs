//! Core data models.
//!
//! Inbound payloads mirror the upstream feed's JSON shape. Outbound views
//! never carry the restricted upstream fields (`big_metadata`,
//! `secret_value`): those only exist on the payload types and in storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, FieldError, Result};

/// Largest accepted counter value (2^53). Engagement totals and aggregate
/// sums stay exact in both `i64` and `f64` below this bound.
pub const MAX_COUNTER: i64 = 1 << 53;

/// One content item as delivered by the upstream feed or the ingestion API.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentPayload {
    pub unq_external_id: String,
    pub author: AuthorPayload,
    pub url: String,
    pub title: String,
    pub thumbnail_url: String,
    pub stats: StatsPayload,
    #[serde(default = "empty_object")]
    pub big_metadata: serde_json::Value,
    #[serde(default)]
    pub secret_value: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorPayload {
    pub unique_external_id: String,
    pub unique_name: String,
    pub full_name: String,
    pub url: String,
    pub title: String,
    #[serde(default = "empty_object")]
    pub big_metadata: serde_json::Value,
    #[serde(default)]
    pub secret_value: String,
    /// Absent on most feed items; left untouched on update when absent.
    #[serde(default)]
    pub followers: Option<i64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StatsPayload {
    pub likes: i64,
    pub comments: i64,
    pub views: i64,
    pub shares: i64,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

impl ContentPayload {
    /// Reject the payload with every offending field listed.
    pub fn validate(&self) -> Result<()> {
        let fields = self.field_errors("");
        if fields.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation { fields })
        }
    }

    /// Tag names with duplicates removed, in first-seen order.
    pub fn unique_tags(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.hashtags
            .iter()
            .map(String::as_str)
            .filter(|name| seen.insert(*name))
            .collect()
    }

    fn field_errors(&self, prefix: &str) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let path = |name: &str| format!("{}{}", prefix, name);

        if self.unq_external_id.trim().is_empty() {
            errors.push(FieldError::new(path("unq_external_id"), "must not be empty"));
        }
        if self.author.unique_external_id.trim().is_empty() {
            errors.push(FieldError::new(
                path("author.unique_external_id"),
                "must not be empty",
            ));
        }
        if self.author.unique_name.trim().is_empty() {
            errors.push(FieldError::new(path("author.unique_name"), "must not be empty"));
        }
        if let Some(followers) = self.author.followers {
            if let Some(reason) = counter_error(followers) {
                errors.push(FieldError::new(path("author.followers"), reason));
            }
        }

        let counters = [
            ("stats.likes", self.stats.likes),
            ("stats.comments", self.stats.comments),
            ("stats.views", self.stats.views),
            ("stats.shares", self.stats.shares),
        ];
        for (name, value) in counters {
            if let Some(reason) = counter_error(value) {
                errors.push(FieldError::new(path(name), reason));
            }
        }

        for (i, tag) in self.hashtags.iter().enumerate() {
            if tag.trim().is_empty() {
                errors.push(FieldError::new(
                    path(&format!("hashtags[{}]", i)),
                    "must not be empty",
                ));
            }
        }

        errors
    }
}

fn counter_error(value: i64) -> Option<String> {
    if value < 0 {
        Some("must be >= 0".to_string())
    } else if value > MAX_COUNTER {
        Some(format!("must be <= {}", MAX_COUNTER))
    } else {
        None
    }
}

/// Body of an ingestion request: a single payload or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IngestRequest {
    Many(Vec<ContentPayload>),
    One(Box<ContentPayload>),
}

impl IngestRequest {
    pub fn into_payloads(self) -> Vec<ContentPayload> {
        match self {
            IngestRequest::Many(items) => items,
            IngestRequest::One(item) => vec![*item],
        }
    }
}

/// Validate a whole batch before anything is written.
pub fn validate_batch(payloads: &[ContentPayload]) -> Result<()> {
    let fields: Vec<FieldError> = payloads
        .iter()
        .enumerate()
        .flat_map(|(i, p)| p.field_errors(&format!("[{}].", i)))
        .collect();

    if fields.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation { fields })
    }
}

/// Public projection of an author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorView {
    pub id: i64,
    pub unique_id: String,
    pub username: String,
    pub name: String,
    pub url: String,
    pub title: String,
    pub followers: i64,
}

/// A content row joined with its author, as read by the query layer.
#[derive(Debug, Clone)]
pub struct ContentRecord {
    pub id: i64,
    pub unique_id: String,
    pub url: String,
    pub title: String,
    pub thumbnail_url: String,
    pub timestamp: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub view_count: i64,
    pub share_count: i64,
    pub author: AuthorView,
}

/// Public projection of a content item with its derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentView {
    pub id: i64,
    pub unique_id: String,
    pub url: String,
    pub title: String,
    pub thumbnail_url: String,
    pub timestamp: DateTime<Utc>,
    pub like_count: i64,
    pub comment_count: i64,
    pub view_count: i64,
    pub share_count: i64,
    pub engagement_rate: f64,
    pub total_engagement: i64,
    pub tags: Vec<String>,
}

/// The `{content, author}` envelope returned by every content endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEnvelope {
    pub content: ContentView,
    pub author: AuthorView,
}
