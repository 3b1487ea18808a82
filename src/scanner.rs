//! Opportunity scanning.
//!
//! One scan walks the priority slice of the watchlist strictly one card at a
//! time (paced by the shared limiter to respect the marketplace's rate
//! policy; the three channel queries inside a card run concurrently), scores
//! every surviving listing against fair value or raw ROI, and publishes the
//! ranked survivors as the new feed. A slow or failing card never blocks the
//! cards after it.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use tracing::{error, info, warn};

use crate::api::HealthState;
use crate::classifier::{
    effective_channel, extract_grade_info, listing_channel, validate, ValidationStats,
};
use crate::config::{thresholds, Config, MultiplierPolicy};
use crate::db::{DismissalStore, WatchlistStore};
use crate::ebay::EbayClient;
use crate::error::Result;
use crate::fairvalue::{heuristic_estimate, FairValueSource};
use crate::limiter::CardRateLimiter;
use crate::roi::estimate_roi;
use crate::state::{CardStore, OpportunityFeed};
use crate::types::{
    CardInfo, GradeInfo, ListingChannel, MarketplaceItem, Opportunity, PriceAnalysis,
    SearchChannel, WatchlistCard,
};

/// Marketplace image URLs carry a size segment we can rewrite for thumbnails.
static IMAGE_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"s-l\d+").expect("valid image size pattern"));

pub struct Scanner<S> {
    client: Arc<EbayClient>,
    cards: Arc<CardStore>,
    watchlist: WatchlistStore,
    fair_values: S,
    dismissals: DismissalStore,
    limiter: CardRateLimiter,
    feed: Arc<OpportunityFeed>,
    health: Arc<HealthState>,
    multipliers: MultiplierPolicy,
    scan_max_cards: usize,
    scan_result_cap: usize,
    search_limit_per_channel: usize,
    interval_secs: u64,
}

impl<S: FairValueSource + Send + Sync> Scanner<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: &Config,
        client: Arc<EbayClient>,
        cards: Arc<CardStore>,
        watchlist: WatchlistStore,
        fair_values: S,
        dismissals: DismissalStore,
        limiter: CardRateLimiter,
        feed: Arc<OpportunityFeed>,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            client,
            cards,
            watchlist,
            fair_values,
            dismissals,
            limiter,
            feed,
            health,
            multipliers: cfg.multipliers,
            scan_max_cards: cfg.scan_max_cards,
            scan_result_cap: cfg.scan_result_cap,
            search_limit_per_channel: cfg.search_limit_per_channel,
            interval_secs: cfg.scan_interval_secs,
        }
    }

    /// Background task: scan on an interval, starting immediately. A failed
    /// scan only costs one cycle.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));

        loop {
            interval.tick().await;
            match self.scan_once().await {
                Ok(count) => info!("Scan published {count} opportunities"),
                Err(e) => error!("Scan failed: {e}"),
            }
        }
    }

    /// One full pass over the watchlist. Returns the number of published
    /// opportunities; returns early if a scan is already in flight.
    pub async fn scan_once(&self) -> Result<usize> {
        if !self.health.begin_scan() {
            warn!("Scan already in flight; skipping");
            return Ok(self.feed.len());
        }

        let result = self.scan_inner().await;
        let count = result.as_ref().map(|c| *c).unwrap_or(0);
        self.health.end_scan(now_secs(), count);
        result
    }

    async fn scan_inner(&self) -> Result<usize> {
        // Refresh the in-memory mirror, then scan against the frozen view.
        let all_cards = self.watchlist.list_all().await?;
        self.cards.replace_all(all_cards);
        let scan_set = self.cards.active_by_priority(self.scan_max_cards);

        info!("Scanning {} watchlist cards", scan_set.len());

        let mut opportunities = Vec::new();
        for card in &scan_set {
            self.limiter.acquire().await;
            match self.scan_card(card).await {
                Ok(mut found) => opportunities.append(&mut found),
                Err(e) => warn!("Card scan failed for {}: {e}", card.player),
            }
        }

        rank_opportunities(&mut opportunities);
        opportunities.truncate(self.scan_result_cap);

        let count = opportunities.len();
        self.feed.publish(opportunities);
        Ok(count)
    }

    /// Search, validate and score a single card's listings.
    async fn scan_card(&self, card: &WatchlistCard) -> Result<Vec<Opportunity>> {
        let (items, fetch_stats) = self
            .client
            .triple_search(card, self.search_limit_per_channel)
            .await;

        let mut validation = ValidationStats::default();
        let mut kept = Vec::new();

        for item in items {
            // Dismissed listings are filtered before scoring; a store error
            // fails open so one bad read cannot hide the whole feed.
            let dismissed = match self.dismissals.is_dismissed(&item.item_id).await {
                Ok(d) => d,
                Err(e) => {
                    warn!("Dismissal lookup failed for {}: {e}", item.item_id);
                    false
                }
            };
            if dismissed {
                continue;
            }

            let outcome = validate(&item, item.channel);
            validation.record(&outcome);
            if outcome.is_err() {
                continue;
            }

            let grade_info = extract_grade_info(&item.title);
            let channel = effective_channel(&item, &grade_info);
            let opportunity = self.build_opportunity(&item, card, &grade_info, channel).await;

            if passes_threshold(channel, opportunity.analysis.percent_below_avg) {
                kept.push(opportunity);
            }
        }

        info!(
            player = %card.player,
            fetched = fetch_stats.total(),
            duplicates = fetch_stats.duplicates,
            accepted = validation.accepted,
            rejected = validation.rejected(),
            kept = kept.len(),
            "Card scan complete",
        );

        Ok(kept)
    }

    async fn build_opportunity(
        &self,
        item: &MarketplaceItem,
        card: &WatchlistCard,
        grade_info: &GradeInfo,
        channel: SearchChannel,
    ) -> Opportunity {
        let now = Utc::now();
        let price = item.effective_price();
        let listing = listing_channel(item);

        let analysis = if channel == SearchChannel::Raw {
            let roi = estimate_roi(&self.fair_values, &self.multipliers, price, card.id).await;
            let percent = roi.roi_percentage.max(0.0);
            PriceAnalysis {
                average_price: roi.expected_value,
                percent_below_avg: percent,
                is_hot_deal: percent > thresholds::ANY_CHANNEL_PCT,
                alert_reason: alert_reason(channel, listing, percent, roi.uses_real_data, item.hours_remaining(now)),
                confidence_score: roi.confidence_score,
                uses_real_data: roi.uses_real_data,
                listing_channel: listing,
                raw_roi: Some(roi),
            }
        } else {
            let grader_label = grade_info.grader.map(|g| g.as_str()).unwrap_or("Unknown");
            // A lookup failure behaves exactly like missing data: fall back
            // to the heuristic estimate rather than dropping the listing.
            let fair = self
                .fair_values
                .resolve(card.id, grader_label, &grade_info.grade)
                .await
                .unwrap_or_else(|e| {
                    warn!("Fair-value lookup failed for card {}: {e}", card.id);
                    crate::types::FairValue::none()
                });

            let (average, confidence, uses_real_data) = if fair.is_reliable() {
                (fair.average, fair.confidence, true)
            } else {
                (heuristic_estimate(price), crate::config::NO_DATA_CONFIDENCE, false)
            };
            let percent = (((average - price) / average) * 100.0).max(0.0);

            PriceAnalysis {
                average_price: average,
                percent_below_avg: percent,
                is_hot_deal: percent > thresholds::AUCTION_MIN_PCT,
                alert_reason: alert_reason(channel, listing, percent, uses_real_data, item.hours_remaining(now)),
                confidence_score: confidence,
                uses_real_data,
                listing_channel: listing,
                raw_roi: None,
            }
        };

        let (image_url, thumbnail_url) = image_variants(item.image_url.as_deref());

        Opportunity {
            listing_id: item.item_id.clone(),
            card_id: card.id,
            title: item.title.clone(),
            current_price: price,
            buy_it_now_price: matches!(
                listing,
                ListingChannel::BuyItNow | ListingChannel::AuctionPlusBin
            )
            .then_some(item.price),
            time_remaining_hours: item.hours_remaining(now),
            seller_username: item.seller_username.clone(),
            seller_feedback_score: item.seller_feedback_score,
            seller_positive_percentage: item.seller_feedback_percent,
            url: item.url.clone(),
            grade: grade_info.grade.clone(),
            grader: grade_info.grader,
            grade_number: grade_info.grade_number,
            image_url,
            thumbnail_url,
            created_at: now,
            card_info: CardInfo {
                player: card.player.clone(),
                year: card.year,
                brand: card.brand.clone(),
                set_name: card.set_name.clone(),
                parallel: card.parallel.clone(),
                priority_score: card.priority_score,
            },
            analysis,
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring policy — pure functions, unit-tested without any I/O
// ---------------------------------------------------------------------------

/// Does `percent` (below fair value, or ROI% for raw) clear its channel's
/// bar? The any-channel level is an escape valve: exceptional deals are
/// never excluded by a channel-specific threshold.
pub fn passes_threshold(channel: SearchChannel, percent: f64) -> bool {
    let channel_min = match channel {
        SearchChannel::Auction => thresholds::AUCTION_MIN_PCT,
        SearchChannel::Bin => thresholds::BIN_MIN_PCT,
        SearchChannel::Raw => thresholds::RAW_MIN_ROI_PCT,
    };
    percent >= channel_min || percent >= thresholds::ANY_CHANNEL_PCT
}

/// Percent-below/ROI descending; ties broken by card priority descending.
pub fn rank_opportunities(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(|a, b| {
        b.analysis
            .percent_below_avg
            .partial_cmp(&a.analysis.percent_below_avg)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.card_info.priority_score.cmp(&a.card_info.priority_score))
    });
}

/// Human-readable reason string shown next to an opportunity in the feed.
fn alert_reason(
    channel: SearchChannel,
    listing: ListingChannel,
    percent: f64,
    uses_real_data: bool,
    hours_remaining: Option<f64>,
) -> String {
    let source = if uses_real_data { "real data" } else { "estimated" };
    let mut reasons: Vec<String> = Vec::new();

    if channel == SearchChannel::Raw {
        reasons.push("raw card".to_string());
        if percent >= 100.0 {
            reasons.push(format!("100%+ ROI ({source})"));
        } else if percent >= 50.0 {
            reasons.push(format!("50%+ ROI ({source})"));
        }
    } else if percent >= 30.0 {
        reasons.push(format!("30%+ below average ({source})"));
    } else if percent >= 20.0 {
        reasons.push(format!("20%+ below average ({source})"));
    }

    if listing == ListingChannel::Auction {
        match hours_remaining {
            Some(h) if h <= 1.0 => reasons.push("auction ending very soon".to_string()),
            Some(h) if h <= 3.0 => reasons.push("auction ending soon".to_string()),
            _ => {}
        }
    }

    match listing {
        ListingChannel::BuyItNow => reasons.push("buy it now available".to_string()),
        ListingChannel::AuctionPlusBin => reasons.push("auction + BIN option".to_string()),
        ListingChannel::Auction => {}
    }

    if reasons.is_empty() {
        "price opportunity".to_string()
    } else {
        reasons.join(" | ")
    }
}

/// Rewrite the marketplace image URL to the modal size; returns
/// `(image_url, thumbnail_url)`.
pub fn image_variants(url: Option<&str>) -> (Option<String>, Option<String>) {
    match url {
        Some(u) if IMAGE_SIZE_RE.is_match(u) => (
            Some(IMAGE_SIZE_RE.replace(u, "s-l800").into_owned()),
            Some(IMAGE_SIZE_RE.replace(u, "s-l225").into_owned()),
        ),
        Some(u) => (Some(u.to_string()), Some(u.to_string())),
        None => (None, None),
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_thresholds() {
        assert!(passes_threshold(SearchChannel::Auction, 20.0));
        assert!(passes_threshold(SearchChannel::Auction, 25.0));
        assert!(!passes_threshold(SearchChannel::Auction, 19.9));

        assert!(passes_threshold(SearchChannel::Bin, 30.0));
        assert!(!passes_threshold(SearchChannel::Bin, 18.0));
        assert!(!passes_threshold(SearchChannel::Bin, 29.9));

        assert!(passes_threshold(SearchChannel::Raw, 40.0));
        assert!(!passes_threshold(SearchChannel::Raw, 39.9));
    }

    #[test]
    fn escape_valve_at_exactly_fifty() {
        // 50% qualifies on every channel, even where the channel bar is
        // higher than some other channel's.
        for channel in [SearchChannel::Auction, SearchChannel::Bin, SearchChannel::Raw] {
            assert!(passes_threshold(channel, 50.0), "{channel} blocked a 50% deal");
        }
        // Just under the valve, the per-channel bar still rules.
        assert!(!passes_threshold(SearchChannel::Bin, 29.0));
    }

    fn opportunity(percent: f64, priority: i64, id: &str) -> Opportunity {
        Opportunity {
            listing_id: id.to_string(),
            card_id: 1,
            title: "t".to_string(),
            current_price: 100.0,
            buy_it_now_price: None,
            time_remaining_hours: None,
            seller_username: "s".to_string(),
            seller_feedback_score: 0,
            seller_positive_percentage: 100.0,
            url: String::new(),
            grade: "Raw".to_string(),
            grader: None,
            grade_number: None,
            image_url: None,
            thumbnail_url: None,
            created_at: Utc::now(),
            card_info: CardInfo {
                player: "p".to_string(),
                year: 2020,
                brand: "b".to_string(),
                set_name: "s".to_string(),
                parallel: None,
                priority_score: priority,
            },
            analysis: PriceAnalysis {
                average_price: 100.0,
                percent_below_avg: percent,
                is_hot_deal: false,
                alert_reason: String::new(),
                confidence_score: 50.0,
                uses_real_data: true,
                listing_channel: ListingChannel::Auction,
                raw_roi: None,
            },
        }
    }

    #[test]
    fn ranking_by_percent_then_priority() {
        let mut opportunities = vec![
            opportunity(25.0, 50, "low-priority"),
            opportunity(40.0, 10, "best-percent"),
            opportunity(25.0, 90, "high-priority"),
        ];
        rank_opportunities(&mut opportunities);
        let ids: Vec<&str> = opportunities.iter().map(|o| o.listing_id.as_str()).collect();
        assert_eq!(ids, vec!["best-percent", "high-priority", "low-priority"]);
    }

    #[test]
    fn scan_scenario_auction_passes_bin_fails() {
        // One qualifying auction item at 25% (bar 20) and one BIN item at
        // 18% (bar 30): only the auction item survives, and it outranks an
        // equal-percent item from a lower-priority card.
        assert!(passes_threshold(SearchChannel::Auction, 25.0));
        assert!(!passes_threshold(SearchChannel::Bin, 18.0));

        let mut survivors = vec![
            opportunity(25.0, 40, "other-card"),
            opportunity(25.0, 90, "priority-card"),
        ];
        rank_opportunities(&mut survivors);
        assert_eq!(survivors[0].listing_id, "priority-card");
    }

    #[test]
    fn alert_reason_mentions_source_and_urgency() {
        let reason = alert_reason(
            SearchChannel::Auction,
            ListingChannel::Auction,
            32.0,
            true,
            Some(0.5),
        );
        assert!(reason.contains("30%+ below average (real data)"));
        assert!(reason.contains("ending very soon"));

        let raw = alert_reason(SearchChannel::Raw, ListingChannel::BuyItNow, 120.0, false, None);
        assert!(raw.contains("raw card"));
        assert!(raw.contains("100%+ ROI (estimated)"));
    }

    #[test]
    fn image_variants_rewrite_size_segment() {
        let (full, thumb) = image_variants(Some("https://i.ebayimg.com/images/g/abc/s-l500.jpg"));
        assert_eq!(full.unwrap(), "https://i.ebayimg.com/images/g/abc/s-l800.jpg");
        assert_eq!(thumb.unwrap(), "https://i.ebayimg.com/images/g/abc/s-l225.jpg");

        let (full, _) = image_variants(Some("https://example.com/plain.jpg"));
        assert_eq!(full.unwrap(), "https://example.com/plain.jpg");

        assert_eq!(image_variants(None), (None, None));
    }
}
