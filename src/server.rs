//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/contents` | Filtered, paginated listing |
//! | `POST` | `/contents` | Ingest one payload or a list |
//! | `GET`  | `/contents/stats` | Aggregate stats over a filtered set |
//! | `GET`  | `/contents/{id}` | Single content envelope |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! The listing body is a plain JSON array of `{content, author}` envelopes.
//! Page metadata travels in the `X-Total-Count`, `X-Total-Pages`, `X-Page`
//! and `X-Items-Per-Page` response headers.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_filter", "message": "invalid value for 'timeframe': 'abc' (expected an integer)" } }
//! ```
//!
//! Error codes: `validation_error` (400, with a `fields` list),
//! `invalid_filter` (400), `not_found` (404), `upstream_unavailable` (502),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted, and the page metadata
//! headers are exposed to browser clients.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::{Config, PaginationConfig};
use crate::db;
use crate::error::{Error, FieldError};
use crate::filter::{ListParams, StatsParams};
use crate::get::get_content;
use crate::ingest::ingest_batch;
use crate::migrate;
use crate::models::{ContentEnvelope, IngestRequest};
use crate::query::list_contents;
use crate::stats::{aggregate, ContentStats};

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";
pub const TOTAL_PAGES_HEADER: &str = "x-total-pages";
pub const PAGE_HEADER: &str = "x-page";
pub const ITEMS_PER_PAGE_HEADER: &str = "x-items-per-page";

#[derive(Clone)]
struct AppState {
    pool: SqlitePool,
    pagination: Arc<PaginationConfig>,
}

/// Build the application router over an already-migrated pool.
pub fn router(pool: SqlitePool, pagination: PaginationConfig) -> Router {
    let state = AppState {
        pool,
        pagination: Arc::new(pagination),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(TOTAL_COUNT_HEADER),
            HeaderName::from_static(TOTAL_PAGES_HEADER),
            HeaderName::from_static(PAGE_HEADER),
            HeaderName::from_static(ITEMS_PER_PAGE_HEADER),
        ]);

    Router::new()
        .route("/contents", get(handle_list).post(handle_ingest))
        .route("/contents/stats", get(handle_stats))
        .route("/contents/{id}", get(handle_get))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `[server].bind` until `shutdown` resolves.
pub async fn serve<F>(config: &Config, pool: SqlitePool, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(pool, config.pagination.clone());
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// CLI entry point for `pulse serve`: migrate, then serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    serve(config, pool.clone(), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    pool.close().await;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldError>,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    fields: Vec<FieldError>,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            fields: Vec::new(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                fields: self.fields,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::Validation { fields } => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "validation_error",
                message,
                fields,
            },
            Error::InvalidFilter { .. } => {
                AppError::new(StatusCode::BAD_REQUEST, "invalid_filter", message)
            }
            Error::NotFound { .. } => AppError::new(StatusCode::NOT_FOUND, "not_found", message),
            Error::Upstream { .. } => {
                AppError::new(StatusCode::BAD_GATEWAY, "upstream_unavailable", message)
            }
            Error::Database(_) | Error::Serialization(_) => {
                error!(error = %message, "request failed");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "internal server error",
                )
            }
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::new(
            StatusCode::BAD_REQUEST,
            "invalid_filter",
            rejection.body_text(),
        )
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            message: rejection.body_text(),
            fields: vec![FieldError::new("body", rejection.body_text())],
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::new(
            StatusCode::BAD_REQUEST,
            "invalid_filter",
            rejection.body_text(),
        )
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /contents ============

/// Filtered listing, newest first. A page past the end returns `[]` with
/// the real totals in the headers.
async fn handle_list(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<(HeaderMap, Json<Vec<ContentEnvelope>>), AppError> {
    let Query(params) = params?;
    let filter = params.filter()?;
    let request = params.page_request(&state.pagination)?;

    let page = list_contents(&state.pool, &filter, request, chrono::Utc::now()).await?;

    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_COUNT_HEADER, HeaderValue::from(page.total));
    headers.insert(TOTAL_PAGES_HEADER, HeaderValue::from(page.total_pages()));
    headers.insert(PAGE_HEADER, HeaderValue::from(page.page));
    headers.insert(ITEMS_PER_PAGE_HEADER, HeaderValue::from(page.items_per_page));

    Ok((headers, Json(page.items)))
}

// ============ POST /contents ============

/// Mirrors the request shape: an object yields an envelope, an array
/// yields an array of envelopes.
#[derive(Serialize)]
#[serde(untagged)]
enum IngestResponse {
    One(Box<ContentEnvelope>),
    Many(Vec<ContentEnvelope>),
}

async fn handle_ingest(
    State(state): State<AppState>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let Json(request) = body?;
    let single = matches!(request, IngestRequest::One(_));
    let payloads = request.into_payloads();

    let mut envelopes = ingest_batch(&state.pool, &payloads).await?;

    let response = match envelopes.pop() {
        Some(envelope) if single => IngestResponse::One(Box::new(envelope)),
        Some(last) => {
            envelopes.push(last);
            IngestResponse::Many(envelopes)
        }
        None => IngestResponse::Many(Vec::new()),
    };
    Ok(Json(response))
}

// ============ GET /contents/stats ============

async fn handle_stats(
    State(state): State<AppState>,
    params: Result<Query<StatsParams>, QueryRejection>,
) -> Result<Json<ContentStats>, AppError> {
    let Query(params) = params?;
    let filter = params.filter()?;
    let stats = aggregate(&state.pool, &filter, chrono::Utc::now()).await?;
    Ok(Json(stats))
}

// ============ GET /contents/{id} ============

async fn handle_get(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ContentEnvelope>, AppError> {
    let Path(id) = id?;
    let envelope = get_content(&state.pool, id).await?;
    Ok(Json(envelope))
}
