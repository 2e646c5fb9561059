//! End-to-end tests of the ingestion, query, and enrichment pipeline
//! against a real SQLite database in a temporary directory.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use content_pulse::cache::{comment_key, DedupCache, MemoryDedupCache, SqliteDedupCache};
use content_pulse::config::{Config, PaginationConfig};
use content_pulse::enrichment::{CommentGenerator, CommentRequest, EnrichmentGate};
use content_pulse::error::{Error, Result};
use content_pulse::feed::{pull_and_store, FeedSource};
use content_pulse::filter::{ContentFilter, ListParams, StatsParams};
use content_pulse::get::get_content;
use content_pulse::ingest::{ingest, ingest_at, ingest_batch};
use content_pulse::models::{ContentPayload, MAX_COUNTER};
use content_pulse::pagination::PageRequest;
use content_pulse::query::list_contents;
use content_pulse::stats::aggregate;
use content_pulse::{db, migrate};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ─── Helpers ────────────────────────────────────────────────────────

async fn setup() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config: Config = toml::from_str(&format!(
        "[db]\npath = \"{}/data/pulse.sqlite\"\n\n[server]\nbind = \"127.0.0.1:0\"\n",
        tmp.path().display()
    ))
    .unwrap();

    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    (tmp, pool)
}

fn payload(id: &str, author: &str, title: &str, stats: [i64; 4], tags: &[&str]) -> ContentPayload {
    let [likes, comments, views, shares] = stats;
    serde_json::from_value(json!({
        "unq_external_id": id,
        "author": {
            "unique_external_id": format!("ext-{}", author),
            "unique_name": author,
            "full_name": author.to_uppercase(),
            "url": format!("https://example.com/{}", author),
            "title": "creator",
            "big_metadata": {"raw": true},
            "secret_value": "author-secret",
        },
        "url": format!("https://example.com/c/{}", id),
        "title": title,
        "thumbnail_url": format!("https://example.com/t/{}.png", id),
        "stats": {"likes": likes, "comments": comments, "views": views, "shares": shares},
        "big_metadata": {"raw": true},
        "secret_value": "content-secret",
        "hashtags": tags,
    }))
    .unwrap()
}

fn first_page() -> PageRequest {
    PageRequest::new(None, None, &PaginationConfig::default()).unwrap()
}

fn page(page: i64, size: i64) -> PageRequest {
    PageRequest::new(Some(page), Some(size), &PaginationConfig::default()).unwrap()
}

fn list_filter(pairs: &[(&str, &str)]) -> ContentFilter {
    let query: Value = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect::<serde_json::Map<_, _>>()
        .into();
    serde_json::from_value::<ListParams>(query)
        .unwrap()
        .filter()
        .unwrap()
}

// ─── Ingestion ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_ingest_dedups_tags_and_derives_metrics() {
    let (_tmp, pool) = setup().await;

    let payload: ContentPayload = serde_json::from_value(json!({
        "unq_external_id": "c1",
        "author": {
            "unique_external_id": "a1",
            "unique_name": "bob",
            "full_name": "Bob",
            "url": "u",
            "title": "t",
            "big_metadata": {},
            "secret_value": "s",
        },
        "url": "cu",
        "title": "Hello",
        "thumbnail_url": "th",
        "stats": {"likes": 10, "comments": 5, "views": 100, "shares": 5},
        "big_metadata": {},
        "secret_value": "s",
        "hashtags": ["x", "x", "y"],
    }))
    .unwrap();

    let envelope = ingest(&pool, &payload).await.unwrap();
    assert_eq!(envelope.content.tags, vec!["x", "y"]);
    assert_eq!(envelope.content.total_engagement, 20);
    assert!((envelope.content.engagement_rate - 0.2).abs() < 1e-9);
    assert_eq!(envelope.author.username, "bob");

    let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_tags")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(links, 2);
}

#[tokio::test]
async fn test_reingest_overwrites_counters_and_keeps_timestamp() {
    let (_tmp, pool) = setup().await;
    let first_seen = Utc::now() - ChronoDuration::days(3);

    let original = payload("c1", "bob", "First", [1, 1, 10, 1], &["x"]);
    let created = ingest_at(&pool, &original, first_seen).await.unwrap();

    let updated = payload("c1", "bob", "Renamed", [50, 20, 1000, 30], &["x", "z"]);
    let refreshed = ingest(&pool, &updated).await.unwrap();

    assert_eq!(created.content.id, refreshed.content.id);
    assert_eq!(refreshed.content.title, "Renamed");
    assert_eq!(refreshed.content.like_count, 50);
    assert_eq!(refreshed.content.view_count, 1000);
    assert_eq!(refreshed.content.total_engagement, 100);
    assert_eq!(refreshed.content.timestamp.timestamp(), first_seen.timestamp());
    assert_eq!(refreshed.content.tags, vec!["x", "z"]);

    let (contents, authors, tags): (i64, i64, i64) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM contents), (SELECT COUNT(*) FROM authors), \
         (SELECT COUNT(*) FROM tags)",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!((contents, authors, tags), (1, 1, 2));
}

#[tokio::test]
async fn test_concurrent_ingest_of_same_id_yields_one_row() {
    let (_tmp, pool) = setup().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let pool = pool.clone();
        let payload = payload("shared", "bob", "Race", [i, 0, 100, 0], &["race", "rust"]);
        handles.push(tokio::spawn(async move { ingest(&pool, &payload).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let (contents, authors, tags, links): (i64, i64, i64, i64) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM contents), (SELECT COUNT(*) FROM authors), \
         (SELECT COUNT(*) FROM tags), (SELECT COUNT(*) FROM content_tags)",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!((contents, authors, tags, links), (1, 1, 2, 2));
}

#[tokio::test]
async fn test_invalid_batch_writes_nothing() {
    let (_tmp, pool) = setup().await;

    let good = payload("c1", "bob", "Fine", [1, 1, 1, 1], &[]);
    let bad = payload("c2", "bob", "Broken", [-1, 1, 1, 1], &[]);

    let err = ingest_batch(&pool, &[good, bad]).await.unwrap_err();
    match err {
        Error::Validation { fields } => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].field, "[1].stats.likes");
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let contents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contents")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(contents, 0);
}

#[tokio::test]
async fn test_restricted_fields_stored_but_never_returned() {
    let (_tmp, pool) = setup().await;
    let envelope = ingest(&pool, &payload("c1", "bob", "Hidden", [1, 1, 1, 1], &[]))
        .await
        .unwrap();

    let stored: String = sqlx::query_scalar("SELECT secret_value FROM contents WHERE id = ?")
        .bind(envelope.content.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, "content-secret");

    let body = serde_json::to_string(&envelope).unwrap();
    assert!(!body.contains("secret"));
    assert!(!body.contains("big_metadata"));
}

// ─── Query & filter ─────────────────────────────────────────────────

#[tokio::test]
async fn test_timeframe_excludes_old_content() {
    let (_tmp, pool) = setup().await;
    let now = Utc::now();

    ingest_at(
        &pool,
        &payload("old", "bob", "Old", [1, 0, 1, 0], &[]),
        now - ChronoDuration::days(8),
    )
    .await
    .unwrap();
    ingest_at(
        &pool,
        &payload("new", "bob", "New", [1, 0, 1, 0], &[]),
        now - ChronoDuration::hours(1),
    )
    .await
    .unwrap();

    let filter = list_filter(&[("timeframe", "7")]);
    let result = list_contents(&pool, &filter, first_page(), now).await.unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.items[0].content.unique_id, "new");
}

#[tokio::test]
async fn test_filters_are_conjunctive() {
    let (_tmp, pool) = setup().await;

    let rust_by_bob = ingest(&pool, &payload("c1", "bob", "Rust tips", [1, 0, 1, 0], &["rust"]))
        .await
        .unwrap();
    ingest(&pool, &payload("c2", "bob", "Go tips", [1, 0, 1, 0], &["go"]))
        .await
        .unwrap();
    ingest(&pool, &payload("c3", "alice", "Rust news", [1, 0, 1, 0], &["rust"]))
        .await
        .unwrap();

    let rust_tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = 'rust'")
        .fetch_one(&pool)
        .await
        .unwrap();
    let tag_id = rust_tag_id.to_string();

    let filter = list_filter(&[("author_username", "bob"), ("tag_id", &tag_id)]);
    let result = list_contents(&pool, &filter, first_page(), Utc::now())
        .await
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.items[0].content.id, rust_by_bob.content.id);

    let author_id = rust_by_bob.author.id.to_string();
    let filter = list_filter(&[("author_id", &author_id), ("title", "TIPS")]);
    let result = list_contents(&pool, &filter, first_page(), Utc::now())
        .await
        .unwrap();
    assert_eq!(result.total, 2);
}

#[tokio::test]
async fn test_title_filter_matches_wildcards_literally() {
    let (_tmp, pool) = setup().await;
    ingest(&pool, &payload("c1", "bob", "100% organic", [0, 0, 0, 0], &[]))
        .await
        .unwrap();
    ingest(&pool, &payload("c2", "bob", "100 percent", [0, 0, 0, 0], &[]))
        .await
        .unwrap();

    let filter = list_filter(&[("title", "100%")]);
    let result = list_contents(&pool, &filter, first_page(), Utc::now())
        .await
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.items[0].content.unique_id, "c1");
}

#[tokio::test]
async fn test_title_filter_folds_non_ascii_case() {
    let (_tmp, pool) = setup().await;
    ingest(&pool, &payload("c1", "bob", "Über Café", [0, 0, 0, 0], &[]))
        .await
        .unwrap();
    ingest(&pool, &payload("c2", "bob", "Uber Cafe", [0, 0, 0, 0], &[]))
        .await
        .unwrap();

    for needle in ["über café", "ÜBER", "CAFÉ"] {
        let filter = list_filter(&[("title", needle)]);
        let result = list_contents(&pool, &filter, first_page(), Utc::now())
            .await
            .unwrap();
        assert_eq!(result.total, 1, "title={}", needle);
        assert_eq!(result.items[0].content.unique_id, "c1");
        assert_eq!(result.items[0].content.title, "Über Café");
    }

    // Re-ingesting a new title refolds it.
    ingest(&pool, &payload("c1", "bob", "Ärger", [0, 0, 0, 0], &[]))
        .await
        .unwrap();
    let filter = list_filter(&[("title", "ÜBER")]);
    let result = list_contents(&pool, &filter, first_page(), Utc::now())
        .await
        .unwrap();
    assert_eq!(result.total, 0);
    let filter = list_filter(&[("title", "äRGER")]);
    let result = list_contents(&pool, &filter, first_page(), Utc::now())
        .await
        .unwrap();
    assert_eq!(result.total, 1);
}

#[test]
fn test_unknown_and_malformed_params_rejected() {
    let unknown = serde_json::from_value::<ListParams>(json!({"colour": "red"}));
    assert!(unknown.is_err());

    let params: ListParams = serde_json::from_value(json!({"timeframe": "soon"})).unwrap();
    assert!(matches!(
        params.filter(),
        Err(Error::InvalidFilter { ref field, .. }) if field == "timeframe"
    ));
}

#[tokio::test]
async fn test_pagination_newest_first_and_past_end() {
    let (_tmp, pool) = setup().await;
    let base = Utc::now() - ChronoDuration::hours(30);

    for i in 0..25 {
        ingest_at(
            &pool,
            &payload(&format!("c{:02}", i), "bob", "Item", [1, 0, 10, 0], &[]),
            base + ChronoDuration::hours(i),
        )
        .await
        .unwrap();
    }

    let now = Utc::now();
    let filter = ContentFilter::default();

    let first = list_contents(&pool, &filter, page(1, 10), now).await.unwrap();
    assert_eq!(first.total, 25);
    assert_eq!(first.total_pages(), 3);
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.items[0].content.unique_id, "c24");

    let last = list_contents(&pool, &filter, page(3, 10), now).await.unwrap();
    assert_eq!(last.items.len(), 5);
    assert_eq!(last.items[4].content.unique_id, "c00");

    let beyond = list_contents(&pool, &filter, page(4, 10), now).await.unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 25);
    assert_eq!(beyond.total_pages(), 3);
}

// ─── Aggregates ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_aggregate_matches_sum_of_items() {
    let (_tmp, pool) = setup().await;
    ingest(&pool, &payload("c1", "bob", "A", [10, 5, 100, 5], &["rust"]))
        .await
        .unwrap();
    ingest(&pool, &payload("c2", "alice", "B", [3, 2, 50, 1], &["rust"]))
        .await
        .unwrap();
    ingest(&pool, &payload("c3", "alice", "C", [7, 0, 0, 0], &["go"]))
        .await
        .unwrap();

    let now = Utc::now();
    let filter: ContentFilter = serde_json::from_value::<StatsParams>(json!({"tag": "rust"}))
        .unwrap()
        .filter()
        .unwrap();

    let stats = aggregate(&pool, &filter, now).await.unwrap();
    let listed = list_contents(&pool, &filter, page(1, 100), now).await.unwrap();

    let likes: i64 = listed.items.iter().map(|e| e.content.like_count).sum();
    let views: i64 = listed.items.iter().map(|e| e.content.view_count).sum();
    let engagement: i64 = listed.items.iter().map(|e| e.content.total_engagement).sum();

    assert_eq!(stats.total_contents, 2);
    assert_eq!(stats.total_likes, likes);
    assert_eq!(stats.total_views, views);
    assert_eq!(stats.total_engagement, engagement);
    assert_eq!(stats.total_engagement, 26);
    assert!((stats.total_engagement_rate - 26.0 / 150.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_aggregate_of_empty_set_is_zero() {
    let (_tmp, pool) = setup().await;
    let stats = aggregate(&pool, &ContentFilter::default(), Utc::now())
        .await
        .unwrap();
    assert_eq!(stats.total_contents, 0);
    assert_eq!(stats.total_engagement, 0);
    assert_eq!(stats.total_engagement_rate, 0.0);
}

#[tokio::test]
async fn test_counter_above_bound_is_rejected_before_writing() {
    let (_tmp, pool) = setup().await;
    let err = ingest(
        &pool,
        &payload("c1", "bob", "Huge", [MAX_COUNTER + 1, 1, 0, 0], &[]),
    )
    .await
    .unwrap_err();

    match err {
        Error::Validation { fields } => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].field, "stats.likes");
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let stats = aggregate(&pool, &ContentFilter::default(), Utc::now())
        .await
        .unwrap();
    assert_eq!(stats.total_contents, 0);
}

#[tokio::test]
async fn test_extreme_counters_saturate_instead_of_failing() {
    let (_tmp, pool) = setup().await;
    let envelope = ingest(
        &pool,
        &payload("c1", "bob", "Big", [MAX_COUNTER, MAX_COUNTER, 1, MAX_COUNTER], &[]),
    )
    .await
    .unwrap();
    assert_eq!(envelope.content.total_engagement, 3 * MAX_COUNTER);
    ingest(&pool, &payload("c2", "bob", "Big too", [MAX_COUNTER, 0, 1, 0], &[]))
        .await
        .unwrap();

    let stats = aggregate(&pool, &ContentFilter::default(), Utc::now())
        .await
        .unwrap();
    assert_eq!(stats.total_likes, 2 * MAX_COUNTER);
    assert_eq!(stats.total_contents, 2);

    // Rows written outside validation still read and aggregate.
    sqlx::query("UPDATE contents SET like_count = ? WHERE unique_id = 'c1'")
        .bind(i64::MAX - 1)
        .execute(&pool)
        .await
        .unwrap();

    let stats = aggregate(&pool, &ContentFilter::default(), Utc::now())
        .await
        .unwrap();
    assert_eq!(stats.total_likes, i64::MAX);
    assert_eq!(stats.total_engagement, i64::MAX);
    assert!(stats.total_engagement_rate.is_finite());

    let one = get_content(&pool, envelope.content.id).await.unwrap();
    assert_eq!(one.content.total_engagement, i64::MAX);
}

#[tokio::test]
async fn test_get_missing_content_is_not_found() {
    let (_tmp, pool) = setup().await;
    let err = get_content(&pool, 999).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { entity: "content", .. }));
}

// ─── Enrichment gate ────────────────────────────────────────────────

/// Counts calls; fails every call when `fail` is set.
struct StubGenerator {
    calls: AtomicUsize,
    fail: bool,
}

impl StubGenerator {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentGenerator for StubGenerator {
    async fn generate(&self, request: &CommentRequest) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(Error::upstream("comment generator", "HTTP 503"))
        } else {
            Ok(json!({"comment": format!("nice post, {}", request.author_username)}))
        }
    }
}

const DAY: Duration = Duration::from_secs(60 * 60 * 24);

#[tokio::test]
async fn test_gate_calls_collaborator_once_per_ttl() {
    let (_tmp, pool) = setup().await;
    let envelope = ingest(&pool, &payload("c1", "bob", "Hello", [1, 1, 1, 1], &[]))
        .await
        .unwrap();

    let cache = Arc::new(SqliteDedupCache::new(pool.clone()));
    let generator = StubGenerator::new(false);
    let gate = EnrichmentGate::new(pool.clone(), cache.clone(), generator.clone(), 10, DAY);

    let first = gate.tick().await.unwrap();
    let second = gate.tick().await.unwrap();

    assert_eq!(generator.calls(), 1);
    assert_eq!(first.generated, 1);
    assert_eq!(second.skipped, 1);

    let cached = cache.get(&comment_key(envelope.content.id)).await.unwrap();
    assert_eq!(cached, Some(json!({"comment": "nice post, bob"})));
}

#[tokio::test]
async fn test_gate_calls_collaborator_again_after_ttl_lapses() {
    let (_tmp, pool) = setup().await;
    ingest(&pool, &payload("c1", "bob", "Hello", [1, 1, 1, 1], &[]))
        .await
        .unwrap();

    let generator = StubGenerator::new(false);
    let gate = EnrichmentGate::new(
        pool.clone(),
        Arc::new(SqliteDedupCache::new(pool.clone())),
        generator.clone(),
        10,
        Duration::from_millis(300),
    );

    assert_eq!(gate.tick().await.unwrap().generated, 1);
    assert_eq!(gate.tick().await.unwrap().skipped, 1);
    assert_eq!(generator.calls(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(gate.tick().await.unwrap().generated, 1);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn test_sqlite_cache_expiry_purge_and_refresh() {
    let (_tmp, pool) = setup().await;
    let cache = SqliteDedupCache::new(pool.clone());

    cache.set("a", &json!(1), Duration::ZERO).await.unwrap();
    cache.set("b", &json!(2), DAY).await.unwrap();
    assert_eq!(cache.get("a").await.unwrap(), None);
    assert_eq!(cache.get("b").await.unwrap(), Some(json!(2)));

    assert_eq!(cache.purge_expired().await.unwrap(), 1);
    assert_eq!(cache.get("b").await.unwrap(), Some(json!(2)));

    cache.set("c", &json!(3), Duration::from_millis(300)).await.unwrap();
    assert_eq!(cache.get("c").await.unwrap(), Some(json!(3)));
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(cache.get("c").await.unwrap(), None);

    // Rewriting an expired key replaces its value and restarts its TTL.
    cache.set("c", &json!(4), DAY).await.unwrap();
    assert_eq!(cache.get("c").await.unwrap(), Some(json!(4)));
    assert_eq!(cache.purge_expired().await.unwrap(), 0);
}

/// Reads miss and every write fails.
struct UnwritableCache;

#[async_trait]
impl DedupCache for UnwritableCache {
    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &Value, _ttl: Duration) -> Result<()> {
        Err(Error::Database(sqlx::Error::PoolTimedOut))
    }

    async fn purge_expired(&self) -> Result<u64> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_gate_continues_when_cache_write_fails() {
    let (_tmp, pool) = setup().await;
    for i in 0..2 {
        ingest(&pool, &payload(&format!("c{}", i), "bob", "Item", [0, 0, 0, 0], &[]))
            .await
            .unwrap();
    }

    let generator = StubGenerator::new(false);
    let gate = EnrichmentGate::new(
        pool.clone(),
        Arc::new(UnwritableCache),
        generator.clone(),
        10,
        DAY,
    );

    let report = gate.tick().await.unwrap();
    assert_eq!(report.generated, 2);
    assert_eq!(generator.calls(), 2);

    // Nothing was recorded, so the next tick asks again.
    gate.tick().await.unwrap();
    assert_eq!(generator.calls(), 4);
}

#[tokio::test]
async fn test_gate_failure_is_not_cached() {
    let (_tmp, pool) = setup().await;
    ingest(&pool, &payload("c1", "bob", "Hello", [1, 1, 1, 1], &[]))
        .await
        .unwrap();

    let generator = StubGenerator::new(true);
    let gate = EnrichmentGate::new(
        pool.clone(),
        Arc::new(MemoryDedupCache::new()),
        generator.clone(),
        10,
        DAY,
    );

    let first = gate.tick().await.unwrap();
    let second = gate.tick().await.unwrap();

    assert_eq!(first.failed, 1);
    assert_eq!(second.failed, 1);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn test_gate_skips_cached_item_and_continues() {
    let (_tmp, pool) = setup().await;
    let older = ingest_at(
        &pool,
        &payload("c1", "bob", "Older", [1, 1, 1, 1], &[]),
        Utc::now() - ChronoDuration::minutes(5),
    )
    .await
    .unwrap();
    ingest(&pool, &payload("c2", "bob", "Newer", [1, 1, 1, 1], &[]))
        .await
        .unwrap();

    let cache = Arc::new(MemoryDedupCache::new());
    cache
        .set(&comment_key(older.content.id), &json!({"comment": "old"}), DAY)
        .await
        .unwrap();

    let generator = StubGenerator::new(false);
    let gate = EnrichmentGate::new(pool.clone(), cache, generator.clone(), 10, DAY);

    let report = gate.tick().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.generated, 1);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_gate_only_looks_at_recent_window() {
    let (_tmp, pool) = setup().await;
    let base = Utc::now() - ChronoDuration::hours(1);
    for i in 0..5 {
        ingest_at(
            &pool,
            &payload(&format!("c{}", i), "bob", "Item", [0, 0, 0, 0], &[]),
            base + ChronoDuration::minutes(i),
        )
        .await
        .unwrap();
    }

    let generator = StubGenerator::new(false);
    let gate = EnrichmentGate::new(
        pool.clone(),
        Arc::new(MemoryDedupCache::new()),
        generator.clone(),
        2,
        DAY,
    );

    let report = gate.tick().await.unwrap();
    assert_eq!(report.generated, 2);
    assert_eq!(generator.calls(), 2);
}

// ─── Feed ───────────────────────────────────────────────────────────

struct StaticFeed(Vec<Value>);

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch(&self) -> Result<Vec<Value>> {
        Ok(self.0.clone())
    }
}

struct DownFeed;

#[async_trait]
impl FeedSource for DownFeed {
    async fn fetch(&self) -> Result<Vec<Value>> {
        Err(Error::upstream("feed", "connection refused"))
    }
}

#[tokio::test]
async fn test_pull_skips_malformed_and_invalid_items() {
    let (_tmp, pool) = setup().await;

    let good = json!({
        "unq_external_id": "good",
        "author": {
            "unique_external_id": "a1",
            "unique_name": "bob",
            "full_name": "Bob",
            "url": "u",
            "title": "t",
        },
        "url": "cu",
        "title": "Good",
        "thumbnail_url": "th",
        "stats": {"likes": 1, "comments": 1, "views": 1, "shares": 1},
        "hashtags": ["feed"],
    });
    let mut invalid = good.clone();
    invalid["unq_external_id"] = json!("invalid");
    invalid["stats"]["views"] = json!(-5);
    let malformed = json!({"unq_external_id": "malformed"});

    let feed = StaticFeed(vec![malformed, good, invalid]);
    let report = pull_and_store(&pool, &feed).await.unwrap();

    assert_eq!(report.fetched, 3);
    assert_eq!(report.ingested, 1);
    assert_eq!(report.rejected, 2);

    let result = list_contents(&pool, &ContentFilter::default(), first_page(), Utc::now())
        .await
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.items[0].content.unique_id, "good");
}

#[tokio::test]
async fn test_pull_reports_feed_failure() {
    let (_tmp, pool) = setup().await;
    let err = pull_and_store(&pool, &DownFeed).await.unwrap_err();
    assert!(matches!(err, Error::Upstream { service: "feed", .. }));
}
