mod api;
mod classifier;
mod collector;
mod config;
mod db;
mod ebay;
mod error;
mod fairvalue;
mod limiter;
mod roi;
mod scanner;
mod state;
mod stats;
mod types;

use std::sync::Arc;

use sqlx::sqlite::SqliteConnectOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::api::HealthState;
use crate::collector::HistoricalCollector;
use crate::config::Config;
use crate::db::{DismissalStore, SnapshotStore, WatchlistStore};
use crate::ebay::{EbayClient, TokenProvider};
use crate::error::Result;
use crate::limiter::CardRateLimiter;
use crate::scanner::Scanner;
use crate::state::{CardStore, OpportunityFeed};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let options = SqliteConnectOptions::new()
        .filename(&cfg.db_path)
        .create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    let watchlist = WatchlistStore::new(pool.clone());
    let snapshots = SnapshotStore::new(pool.clone());
    let dismissals = DismissalStore::new(pool.clone());

    // --- Marketplace client (one token provider per process) ---
    let auth = Arc::new(TokenProvider::new(&cfg)?);
    let client = Arc::new(EbayClient::new(&cfg, auth)?);

    // --- In-memory state ---
    let cards = CardStore::new();
    let bootstrap_cards = watchlist.list_all().await?;
    if bootstrap_cards.is_empty() {
        info!("Watchlist is empty — add cards via POST /cards to start scanning");
    } else {
        info!(
            "Bootstrap complete: {} watchlist cards ({} active)",
            bootstrap_cards.len(),
            bootstrap_cards.iter().filter(|c| c.active).count(),
        );
    }
    cards.replace_all(bootstrap_cards);

    let feed = OpportunityFeed::new();
    let health = Arc::new(HealthState::new());
    let limiter = CardRateLimiter::new(cfg.card_interval_ms);

    // --- Spawn background tasks ---

    // Opportunity scanner (first scan fires immediately)
    let scanner = Arc::new(Scanner::new(
        &cfg,
        Arc::clone(&client),
        Arc::clone(&cards),
        watchlist.clone(),
        snapshots.clone(),
        dismissals.clone(),
        limiter.clone(),
        Arc::clone(&feed),
        Arc::clone(&health),
    ));
    tokio::spawn(Arc::clone(&scanner).run());

    // Historical collector (interval-driven; on demand via POST /admin/collect)
    let collector = Arc::new(HistoricalCollector::new(
        &cfg,
        Arc::clone(&client),
        watchlist.clone(),
        snapshots.clone(),
        limiter.clone(),
        Arc::clone(&health),
    ));
    tokio::spawn(Arc::clone(&collector).run());

    // --- HTTP API server ---
    let api_state = ApiState {
        feed,
        cards,
        watchlist,
        snapshots,
        dismissals,
        health,
        scanner,
        collector,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
