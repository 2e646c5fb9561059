//! Typed errors for ingestion, querying, and the enrichment pipeline.
//!
//! Conflicts on external identifiers never appear here: every create is an
//! atomic upsert, so a concurrent duplicate resolves to the existing row.

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A single rejected field in an inbound payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted path into the payload, e.g. `stats.likes` or `[2].author.unique_name`.
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or incomplete payload, rejected before any write.
    #[error("invalid payload: {}", summarize(fields))]
    Validation { fields: Vec<FieldError> },

    /// A query parameter that could not be parsed or is out of range.
    #[error("invalid value for '{field}': '{value}' ({reason})")]
    InvalidFilter {
        field: String,
        value: String,
        reason: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Feed or enrichment collaborator unreachable, timed out, or non-2xx.
    #[error("{service} unavailable: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_filter(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidFilter {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Error::Upstream {
            service,
            message: message.into(),
        }
    }
}

fn summarize(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}
