//! Historical completed-sale collection.
//!
//! A collection run walks the active watchlist and, per card, runs one
//! completed-sales search per grade cohort. Sales that survive the same
//! validation as live listings (plus a grade-consistency check) feed the
//! IQR statistics engine, and each cohort with enough sales becomes one
//! `PriceSnapshot` row for today's date.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::api::HealthState;
use crate::classifier::{validate, ValidationStats};
use crate::config::{Config, MIN_COHORT_SALES};
use crate::db::{SnapshotStore, WatchlistStore};
use crate::ebay::query::{build_base_query, negative_keywords};
use crate::ebay::EbayClient;
use crate::error::Result;
use crate::limiter::CardRateLimiter;
use crate::stats::{confidence_score, iqr_filtered_stats};
use crate::types::{CompletedSale, MarketplaceItem, PriceSnapshot, SearchChannel, WatchlistCard};

/// Grade cohorts collected per card, most liquid first.
const GRADE_SEARCHES: &[(&str, &str)] = &[
    ("PSA", "PSA 10"),
    ("PSA", "PSA 9"),
    ("PSA", "PSA 8"),
    ("PSA", "PSA 7"),
    ("BGS", "BGS 9.5"),
    ("BGS", "BGS 9"),
    ("BGS", "BGS 8"),
    ("SGC", "SGC 10"),
    ("SGC", "SGC 9"),
    ("Raw", "Raw"),
];

/// Upper bound on cards per collection run; collection walks the whole
/// active watchlist rather than the scan's priority slice.
const COLLECT_CARD_LIMIT: usize = 10_000;

#[derive(Debug, Default)]
pub struct CollectStats {
    pub cards: usize,
    pub snapshots_built: usize,
    pub snapshots_stored: usize,
}

pub struct HistoricalCollector {
    client: Arc<EbayClient>,
    watchlist: WatchlistStore,
    snapshots: SnapshotStore,
    limiter: CardRateLimiter,
    health: Arc<HealthState>,
    completed_search_limit: usize,
    interval_secs: u64,
}

impl HistoricalCollector {
    pub fn new(
        cfg: &Config,
        client: Arc<EbayClient>,
        watchlist: WatchlistStore,
        snapshots: SnapshotStore,
        limiter: CardRateLimiter,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            client,
            watchlist,
            snapshots,
            limiter,
            health,
            completed_search_limit: cfg.completed_search_limit,
            interval_secs: cfg.collect_interval_secs,
        }
    }

    /// Background task: one collection run per interval. The immediate first
    /// tick is consumed — startup scans should not compete with bootstrap,
    /// and the admin endpoint covers on-demand runs.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = self.collect_all().await {
                error!("Collection run failed: {e}");
            }
        }
    }

    /// Collect snapshots for every active card. Per-card failures are logged
    /// and skipped; a run that persists only part of its snapshots is still
    /// a success.
    pub async fn collect_all(&self) -> Result<CollectStats> {
        if !self.health.begin_collect() {
            warn!("Collection already in flight; skipping this run");
            return Ok(CollectStats::default());
        }

        let result = self.collect_all_inner().await;
        self.health.end_collect(now_secs());
        result
    }

    async fn collect_all_inner(&self) -> Result<CollectStats> {
        let cards = self.watchlist.list_active(COLLECT_CARD_LIMIT).await?;
        info!("Collecting historical data for {} cards", cards.len());

        let mut stats = CollectStats {
            cards: cards.len(),
            ..Default::default()
        };
        let mut all_snapshots = Vec::new();

        for card in &cards {
            match self.collect_for_card(card).await {
                Ok(snapshots) => {
                    stats.snapshots_built += snapshots.len();
                    all_snapshots.extend(snapshots);
                }
                Err(e) => {
                    warn!("Collection failed for {}: {e}", card.player);
                }
            }
        }

        stats.snapshots_stored = self.snapshots.upsert_batch(&all_snapshots).await?;
        info!(
            cards = stats.cards,
            built = stats.snapshots_built,
            stored = stats.snapshots_stored,
            "Collection run complete",
        );
        Ok(stats)
    }

    /// One snapshot per grade cohort with enough valid completed sales.
    pub async fn collect_for_card(&self, card: &WatchlistCard) -> Result<Vec<PriceSnapshot>> {
        let base = build_base_query(card);
        let negatives = negative_keywords();
        let today = Utc::now().date_naive();
        let now = Utc::now();

        let mut snapshots = Vec::new();

        for (grader, grade) in GRADE_SEARCHES {
            let query = if *grader == "Raw" {
                format!("{base} raw ungraded {negatives}")
            } else {
                format!("{base} {grade} {negatives}")
            };

            // Each cohort search is its own request against the marketplace,
            // so pacing applies per cohort, not per card.
            self.limiter.acquire().await;

            let items = match self
                .client
                .search_completed(&query, self.completed_search_limit)
                .await
            {
                Ok(items) => items,
                Err(e) => {
                    warn!("{grade} completed search failed for {}: {e}", card.player);
                    continue;
                }
            };

            let sales = attribute_sales(&items, grader, grade, now);
            if sales.len() < MIN_COHORT_SALES {
                continue;
            }

            let prices: Vec<f64> = sales.iter().map(|s| s.sold_price).collect();
            let sample = iqr_filtered_stats(&prices);

            let newest = sales.iter().map(|s| s.sold_date).max().unwrap_or(now);
            let days_since_newest = (now - newest).num_days().max(0);
            let confidence = confidence_score(sample.kept_count, days_since_newest);

            snapshots.push(PriceSnapshot {
                card_id: card.id,
                snapshot_date: today,
                grade: grade.to_string(),
                grader: grader.to_string(),
                mean: sample.mean,
                median: sample.median,
                p25: sample.p25,
                p75: sample.p75,
                stddev: sample.stddev,
                volume: sample.kept_count as i64,
                confidence,
            });

            info!(
                player = %card.player,
                grade = %grade,
                mean = sample.mean,
                volume = sample.kept_count,
                confidence,
                "Cohort snapshot built",
            );
        }

        Ok(snapshots)
    }
}

/// Keep only sales that pass listing validation and actually belong to the
/// cohort they were searched for: graded cohorts must mention their grade,
/// raw cohorts must carry no grading terms at all.
pub fn attribute_sales(
    items: &[MarketplaceItem],
    grader: &str,
    grade: &str,
    now: chrono::DateTime<Utc>,
) -> Vec<CompletedSale> {
    let mut stats = ValidationStats::default();
    let mut sales = Vec::new();

    for item in items {
        let channel = if grader == "Raw" {
            SearchChannel::Raw
        } else {
            SearchChannel::Bin
        };
        let outcome = validate(item, channel);
        stats.record(&outcome);
        if outcome.is_err() {
            continue;
        }

        if grader != "Raw" && !title_matches_grade(&item.title, grader, grade) {
            continue;
        }

        sales.push(CompletedSale {
            item_id: item.item_id.clone(),
            title: item.title.clone(),
            sold_price: item.effective_price(),
            sold_date: item.end_time.unwrap_or(now),
            grader: crate::types::Grader::parse(grader),
            grade: grade.to_string(),
        });
    }

    if stats.rejected() > 0 {
        tracing::debug!(
            grade,
            accepted = stats.accepted,
            rejected = stats.rejected(),
            "Cohort validation",
        );
    }

    sales
}

/// "PSA 9" cohort: title must mention both the grader and the grade value.
fn title_matches_grade(title: &str, grader: &str, grade: &str) -> bool {
    let title = title.to_lowercase();
    if !title.contains(&grader.to_lowercase()) {
        return false;
    }
    match grade.split_whitespace().nth(1) {
        Some(value) => title.contains(value),
        None => false,
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
