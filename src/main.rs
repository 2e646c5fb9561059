//! # Content Pulse CLI (`pulse`)
//!
//! ## Usage
//!
//! ```bash
//! pulse --config ./config/pulse.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pulse init` | Create the SQLite database and run schema migrations |
//! | `pulse ingest <file>` | Ingest a JSON file holding one payload or a list |
//! | `pulse list` | Filtered, paginated listing |
//! | `pulse stats` | Aggregate stats over a filtered set |
//! | `pulse get <id>` | Show one content item with its author |
//! | `pulse pull` | Pull the upstream feed once |
//! | `pulse enrich` | Run the enrichment gate once |
//! | `pulse serve` | Start the HTTP API |
//! | `pulse run` | HTTP API plus the scheduled pipeline stages |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `content_pulse=info`).

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use content_pulse::filter::{ListParams, StatsParams};
use content_pulse::scheduler::Scheduler;
use content_pulse::{
    config, db, enrichment, feed, get, ingest, migrate, query, server, stats,
};

/// Content Pulse: content ingestion and engagement analytics.
#[derive(Parser)]
#[command(
    name = "pulse",
    about = "Content Pulse: content ingestion and engagement analytics",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pulse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest content payloads from a JSON file.
    ///
    /// The file holds a single payload object or an array of them. The
    /// whole batch is validated before anything is written.
    Ingest {
        /// Path to the JSON payload file.
        path: PathBuf,
    },

    /// List content, newest first.
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// 1-based page number.
        #[arg(long)]
        page: Option<i64>,

        /// Items per page (clamped to `[pagination].max_page_size`).
        #[arg(long)]
        items_per_page: Option<i64>,
    },

    /// Aggregate engagement stats over the filtered set.
    Stats {
        #[command(flatten)]
        filter: FilterArgs,

        /// Only content linked to a tag with this exact name.
        #[arg(long)]
        tag: Option<String>,
    },

    /// Show one content item by its internal id.
    Get {
        /// Internal content id.
        id: i64,
    },

    /// Pull the configured feed once and ingest its items.
    Pull,

    /// Run one enrichment pass over the most recent content.
    Enrich,

    /// Start the HTTP API.
    Serve,

    /// Start the HTTP API and the scheduled pipeline stages until Ctrl-C.
    Run,
}

/// Filters shared by `list` and `stats`.
#[derive(Args)]
struct FilterArgs {
    /// Internal author id.
    #[arg(long)]
    author_id: Option<String>,

    /// Author username (exact match).
    #[arg(long)]
    author_username: Option<String>,

    /// Only content ingested within the last N days.
    #[arg(long)]
    timeframe: Option<String>,

    /// Only content linked to this tag id.
    #[arg(long)]
    tag_id: Option<String>,

    /// Case-insensitive title substring.
    #[arg(long)]
    title: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("content_pulse=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path } => {
            ingest::run_ingest(&cfg, &path).await?;
        }
        Commands::List {
            filter,
            page,
            items_per_page,
        } => {
            let filter = ListParams {
                author_id: filter.author_id,
                author_username: filter.author_username,
                timeframe: filter.timeframe,
                tag_id: filter.tag_id,
                title: filter.title,
                ..Default::default()
            }
            .filter()?;
            query::run_list(&cfg, &filter, page, items_per_page).await?;
        }
        Commands::Stats { filter, tag } => {
            let filter = StatsParams {
                author_id: filter.author_id,
                author_username: filter.author_username,
                timeframe: filter.timeframe,
                tag_id: filter.tag_id,
                title: filter.title,
                tag,
            }
            .filter()?;
            stats::run_stats(&cfg, &filter).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, id).await?;
        }
        Commands::Pull => {
            feed::run_pull(&cfg).await?;
        }
        Commands::Enrich => {
            enrichment::run_enrich(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Run => {
            run_all(&cfg).await?;
        }
    }

    Ok(())
}

/// Serve the API and run the pipeline stages until Ctrl-C or until the
/// server stops on its own.
async fn run_all(cfg: &config::Config) -> anyhow::Result<()> {
    let pool = db::connect(cfg).await?;
    migrate::apply(&pool).await?;
    let scheduler = Scheduler::from_config(cfg, pool.clone())?;

    let (stop_tx, stop_rx) = watch::channel(false);

    let signal_tx = stop_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                let _ = signal_tx.send(true);
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });

    let pipeline = tokio::spawn(scheduler.run_until(stopped(stop_rx.clone())));
    let served = server::serve(cfg, pool.clone(), stopped(stop_rx)).await;

    let _ = stop_tx.send(true);
    let _ = pipeline.await;
    pool.close().await;

    served
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
