use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::api::HealthState;
use crate::collector::HistoricalCollector;
use crate::db::{DismissalStore, SnapshotStore, WatchlistStore};
use crate::db::store::NewCard;
use crate::error::AppError;
use crate::scanner::Scanner;
use crate::state::{CardStore, OpportunityFeed};
use crate::types::{DismissalRecord, Opportunity, PriceSnapshot, WatchlistCard};

type ProdScanner = Scanner<SnapshotStore>;

#[derive(Clone)]
pub struct ApiState {
    pub feed: Arc<OpportunityFeed>,
    pub cards: Arc<CardStore>,
    pub watchlist: WatchlistStore,
    pub snapshots: SnapshotStore,
    pub dismissals: DismissalStore,
    pub health: Arc<HealthState>,
    pub scanner: Arc<ProdScanner>,
    pub collector: Arc<HistoricalCollector>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/opportunities", get(get_opportunities))
        .route("/cards", get(get_cards).post(post_card))
        .route("/cards/:id/snapshots", get(get_card_snapshots))
        .route("/dismissals", get(get_dismissals).post(post_dismissal))
        .route("/dismissals/:id", delete(delete_dismissal))
        .route("/admin/scan", post(post_admin_scan))
        .route("/admin/collect", post(post_admin_collect))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query/request param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct OpportunitiesQuery {
    pub limit: Option<usize>,
    pub min_percent: Option<f64>,
}

#[derive(Deserialize)]
pub struct DismissalsQuery {
    pub include_expired: Option<bool>,
}

#[derive(Deserialize)]
pub struct DismissRequest {
    pub item_id: String,
    pub card_id: i64,
    pub title: String,
    pub price: f64,
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub last_scan_at_secs: u64,
    pub last_scan_count: u64,
    pub scan_running: bool,
    pub last_collect_at_secs: u64,
    pub collect_running: bool,
    pub watchlist_size: usize,
    pub feed_size: usize,
}

#[derive(Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Serialize)]
pub struct TriggeredResponse {
    pub started: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    use std::sync::atomic::Ordering;
    Json(HealthResponse {
        status: "ok",
        last_scan_at_secs: state.health.last_scan_at_secs.load(Ordering::Relaxed),
        last_scan_count: state.health.last_scan_count.load(Ordering::Relaxed),
        scan_running: state.health.scan_running(),
        last_collect_at_secs: state.health.last_collect_at_secs.load(Ordering::Relaxed),
        collect_running: state.health.collect_running(),
        watchlist_size: state.cards.card_count(),
        feed_size: state.feed.len(),
    })
}

async fn get_opportunities(
    State(state): State<ApiState>,
    Query(params): Query<OpportunitiesQuery>,
) -> Json<Vec<Opportunity>> {
    let min_percent = params.min_percent.unwrap_or(0.0);
    let limit = params.limit.unwrap_or(usize::MAX);

    let opportunities: Vec<Opportunity> = state
        .feed
        .snapshot()
        .iter()
        .filter(|o| o.analysis.percent_below_avg >= min_percent)
        .take(limit)
        .cloned()
        .collect();

    Json(opportunities)
}

async fn get_cards(
    State(state): State<ApiState>,
) -> Result<Json<Vec<WatchlistCard>>, AppError> {
    Ok(Json(state.watchlist.list_all().await?))
}

async fn post_card(
    State(state): State<ApiState>,
    Json(card): Json<NewCard>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let id = state.watchlist.insert(&card).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

async fn get_card_snapshots(
    State(state): State<ApiState>,
    Path(card_id): Path<i64>,
) -> Result<Json<Vec<PriceSnapshot>>, AppError> {
    Ok(Json(state.snapshots.history(card_id).await?))
}

async fn get_dismissals(
    State(state): State<ApiState>,
    Query(params): Query<DismissalsQuery>,
) -> Result<Json<Vec<DismissalRecord>>, AppError> {
    // Opportunistic maintenance: expired dismissals are gone anyway, so drop
    // them whenever the admin surface looks at the list.
    if let Err(e) = state.dismissals.cleanup_expired().await {
        error!("Dismissal cleanup failed: {e}");
    }
    let records = state
        .dismissals
        .list(params.include_expired.unwrap_or(false))
        .await?;
    Ok(Json(records))
}

async fn post_dismissal(
    State(state): State<ApiState>,
    Json(req): Json<DismissRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let id = state
        .dismissals
        .dismiss(&req.item_id, req.card_id, &req.title, req.price, req.note.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

async fn delete_dismissal(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if state.dismissals.restore(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("dismissal {id}")))
    }
}

async fn post_admin_scan(
    State(state): State<ApiState>,
) -> (StatusCode, Json<TriggeredResponse>) {
    if state.health.scan_running() {
        return (StatusCode::CONFLICT, Json(TriggeredResponse { started: false }));
    }
    let scanner = Arc::clone(&state.scanner);
    tokio::spawn(async move {
        if let Err(e) = scanner.scan_once().await {
            error!("Triggered scan failed: {e}");
        }
    });
    (StatusCode::ACCEPTED, Json(TriggeredResponse { started: true }))
}

async fn post_admin_collect(
    State(state): State<ApiState>,
) -> (StatusCode, Json<TriggeredResponse>) {
    if state.health.collect_running() {
        return (StatusCode::CONFLICT, Json(TriggeredResponse { started: false }));
    }
    let collector = Arc::clone(&state.collector);
    tokio::spawn(async move {
        if let Err(e) = collector.collect_all().await {
            error!("Triggered collection failed: {e}");
        }
    });
    (StatusCode::ACCEPTED, Json(TriggeredResponse { started: true }))
}
