//! # Content Pulse
//!
//! A content ingestion and analytics query engine.
//!
//! Content Pulse accepts social-media style content payloads (an item, its
//! author, its engagement counters and hashtags), stores them idempotently
//! in SQLite, and serves filtered, paginated listings with derived
//! engagement metrics and aggregate stats over any filtered subset. A
//! scheduler pulls from an upstream feed and runs a dedup-gated enrichment
//! stage that asks an external collaborator for at most one comment per
//! content item per TTL window.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Feed / POST │──▶│   Ingest    │──▶│  SQLite  │
//! │  payloads   │   │  (upserts)  │   │          │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │
//!                  ┌───────────────────────┼──────────────┐
//!                  ▼                       ▼              ▼
//!            ┌──────────┐           ┌──────────┐   ┌────────────┐
//!            │   CLI    │           │   HTTP   │   │ Enrichment │
//!            │ (pulse)  │           │  (axum)  │   │    gate    │
//!            └──────────┘           └──────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pulse init                        # create database
//! pulse ingest ./payloads.json      # store one payload or a list
//! pulse list --tag-id 3 --page 2    # filtered, paginated listing
//! pulse stats --tag rust            # aggregate over a filtered set
//! pulse run                         # HTTP server + scheduled stages
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed domain errors |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`models`] | Payloads and public views |
//! | [`ingest`] | Idempotent upsert of authors, content, and tags |
//! | [`filter`] | Query parameters and SQL predicates |
//! | [`pagination`] | Page requests and page metadata |
//! | [`metrics`] | Per-item engagement metrics |
//! | [`query`] | Filtered listing |
//! | [`stats`] | Aggregate stats |
//! | [`get`] | Single-content lookup |
//! | [`cache`] | TTL dedup cache |
//! | [`enrichment`] | Dedup-gated comment generation |
//! | [`feed`] | Upstream feed and pull-and-store |
//! | [`scheduler`] | Periodic pipeline stages |
//! | [`server`] | HTTP API |

pub mod cache;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod feed;
pub mod filter;
pub mod get;
pub mod ingest;
pub mod metrics;
pub mod migrate;
pub mod models;
pub mod pagination;
pub mod query;
pub mod scheduler;
pub mod server;
pub mod stats;
