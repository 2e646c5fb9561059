//! Query & filter builder.
//!
//! Raw query-string parameters are parsed once at the boundary into a
//! [`ContentFilter`]; unknown parameters and malformed integers are
//! rejected there. The filter then renders itself as a conjunction of SQL
//! predicates onto a [`QueryBuilder`] whose `FROM` clause is
//! `contents c JOIN authors a ON a.id = c.author_id`, so author and tag
//! constraints are resolved by the same statement that reads the rows.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::config::PaginationConfig;
use crate::error::{Error, Result};
use crate::pagination::PageRequest;

const SECONDS_PER_DAY: i64 = 86_400;

/// Validated set of content filters. `None` imposes no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFilter {
    /// Internal author id, exact match.
    pub author_id: Option<i64>,
    /// Author username, exact match.
    pub author_username: Option<String>,
    /// Only content ingested within the last N days.
    pub timeframe_days: Option<i64>,
    /// Content linked to this tag id.
    pub tag_id: Option<i64>,
    /// Content linked to a tag with this exact name.
    pub tag_name: Option<String>,
    /// Case-insensitive substring of the title.
    pub title: Option<String>,
}

impl ContentFilter {
    /// Append ` WHERE ...` for every set filter. Always emits a `WHERE`
    /// so callers can keep pushing `ORDER BY`/`LIMIT` afterwards.
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>, now: DateTime<Utc>) {
        qb.push(" WHERE 1 = 1");

        if let Some(author_id) = self.author_id {
            qb.push(" AND c.author_id = ");
            qb.push_bind(author_id);
        }
        if let Some(username) = &self.author_username {
            qb.push(" AND a.username = ");
            qb.push_bind(username.clone());
        }
        if let Some(days) = self.timeframe_days {
            qb.push(" AND c.timestamp >= ");
            qb.push_bind(timeframe_cutoff(now, days));
        }
        if let Some(tag_id) = self.tag_id {
            qb.push(
                " AND EXISTS (SELECT 1 FROM content_tags ct \
                 WHERE ct.content_id = c.id AND ct.tag_id = ",
            );
            qb.push_bind(tag_id);
            qb.push(")");
        }
        if let Some(tag_name) = &self.tag_name {
            qb.push(
                " AND EXISTS (SELECT 1 FROM content_tags ct JOIN tags t ON t.id = ct.tag_id \
                 WHERE ct.content_id = c.id AND t.name = ",
            );
            qb.push_bind(tag_name.clone());
            qb.push(")");
        }
        if let Some(title) = &self.title {
            // Both sides are folded with `to_lowercase`; LIKE alone only folds ASCII.
            qb.push(" AND c.title_folded LIKE ");
            qb.push_bind(format!("%{}%", escape_like(&title.to_lowercase())));
            qb.push(" ESCAPE '\\'");
        }
    }
}

/// Unix seconds of `now - days`, saturating for absurd inputs.
pub fn timeframe_cutoff(now: DateTime<Utc>, days: i64) -> i64 {
    now.timestamp()
        .saturating_sub(days.saturating_mul(SECONDS_PER_DAY))
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Query-string parameters of the content listing.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListParams {
    pub author_id: Option<String>,
    pub author_username: Option<String>,
    pub timeframe: Option<String>,
    pub tag_id: Option<String>,
    pub title: Option<String>,
    pub page: Option<String>,
    pub items_per_page: Option<String>,
}

impl ListParams {
    pub fn filter(&self) -> Result<ContentFilter> {
        build_filter(
            self.author_id.as_deref(),
            self.author_username.as_deref(),
            self.timeframe.as_deref(),
            self.tag_id.as_deref(),
            self.title.as_deref(),
            None,
        )
    }

    pub fn page_request(&self, config: &PaginationConfig) -> Result<PageRequest> {
        let page = parse_int("page", self.page.as_deref())?;
        let items_per_page = parse_int("items_per_page", self.items_per_page.as_deref())?;
        PageRequest::new(page, items_per_page, config)
    }
}

/// Query-string parameters of the stats endpoint: the listing filters
/// without pagination, plus a tag name.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsParams {
    pub author_id: Option<String>,
    pub author_username: Option<String>,
    pub timeframe: Option<String>,
    pub tag_id: Option<String>,
    pub title: Option<String>,
    pub tag: Option<String>,
}

impl StatsParams {
    pub fn filter(&self) -> Result<ContentFilter> {
        build_filter(
            self.author_id.as_deref(),
            self.author_username.as_deref(),
            self.timeframe.as_deref(),
            self.tag_id.as_deref(),
            self.title.as_deref(),
            self.tag.as_deref(),
        )
    }
}

fn build_filter(
    author_id: Option<&str>,
    author_username: Option<&str>,
    timeframe: Option<&str>,
    tag_id: Option<&str>,
    title: Option<&str>,
    tag: Option<&str>,
) -> Result<ContentFilter> {
    let timeframe_days = parse_int("timeframe", timeframe)?;
    if let Some(days) = timeframe_days {
        if days < 0 {
            return Err(Error::invalid_filter(
                "timeframe",
                days.to_string(),
                "must be >= 0",
            ));
        }
    }

    Ok(ContentFilter {
        author_id: parse_int("author_id", author_id)?,
        author_username: non_blank(author_username),
        timeframe_days,
        tag_id: parse_int("tag_id", tag_id)?,
        tag_name: non_blank(tag),
        title: non_blank(title),
    })
}

/// Empty values are treated as absent, matching `?title=` from HTML forms.
fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
}

fn parse_int(field: &str, value: Option<&str>) -> Result<Option<i64>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| Error::invalid_filter(field, raw, "expected an integer")),
    }
}
