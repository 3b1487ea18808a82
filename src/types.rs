use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RELIABLE_CONFIDENCE;

// ---------------------------------------------------------------------------
// Watchlist
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistCard {
    pub id: i64,
    pub player: String,
    pub sport: String,
    pub year: i64,
    pub brand: String,
    pub set_name: String,
    /// Parallel/variant name; None or "Base" means the base card.
    pub parallel: Option<String>,
    /// Grade labels being monitored, e.g. ["PSA 9", "PSA 10", "Raw"].
    pub grades_monitored: Vec<String>,
    /// 0-100; drives scan ordering.
    pub priority_score: i64,
    pub active: bool,
}

// ---------------------------------------------------------------------------
// Graders and grades
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grader {
    Psa,
    Bgs,
    Sgc,
}

impl Grader {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grader::Psa => "PSA",
            Grader::Bgs => "BGS",
            Grader::Sgc => "SGC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PSA" => Some(Grader::Psa),
            "BGS" => Some(Grader::Bgs),
            "SGC" => Some(Grader::Sgc),
            _ => None,
        }
    }
}

impl std::fmt::Display for Grader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Grade information derived once from a listing title. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeInfo {
    pub grader: Option<Grader>,
    /// Display label: "PSA 9", "BGS 9.5", or "Raw".
    pub grade: String,
    pub grade_number: Option<f64>,
}

impl GradeInfo {
    pub fn raw() -> Self {
        Self {
            grader: None,
            grade: "Raw".to_string(),
            grade_number: None,
        }
    }

    pub fn is_raw(&self) -> bool {
        self.grader.is_none()
    }
}

// ---------------------------------------------------------------------------
// Search and listing channels
// ---------------------------------------------------------------------------

/// Which of the three per-card queries produced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchChannel {
    Auction,
    Bin,
    Raw,
}

impl std::fmt::Display for SearchChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SearchChannel::Auction => "auction",
            SearchChannel::Bin => "bin",
            SearchChannel::Raw => "raw",
        };
        write!(f, "{s}")
    }
}

/// How a listing can actually be bought, decided once from the normalized
/// buying-option flags (with a field-presence fallback).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingChannel {
    Auction,
    BuyItNow,
    AuctionPlusBin,
}

impl std::fmt::Display for ListingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ListingChannel::Auction => "Auction",
            ListingChannel::BuyItNow => "BIN",
            ListingChannel::AuctionPlusBin => "Auction+BIN",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Normalized marketplace items
// ---------------------------------------------------------------------------

/// One live listing or completed sale, normalized from either wire shape.
/// Constructed per API response; folded into an Opportunity or dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceItem {
    pub item_id: String,
    pub title: String,
    /// List/fixed price.
    pub price: f64,
    pub currency: String,
    /// Current bid, when the listing is an active auction.
    pub current_bid_price: Option<f64>,
    pub condition: String,
    pub seller_username: String,
    pub seller_feedback_score: i64,
    pub seller_feedback_percent: f64,
    pub url: String,
    pub end_time: Option<DateTime<Utc>>,
    pub buying_options: Vec<String>,
    pub image_url: Option<String>,
    /// The query channel that surfaced this item.
    pub channel: SearchChannel,
}

impl MarketplaceItem {
    /// The price a buyer would act on right now: current bid if one exists,
    /// else the list price.
    pub fn effective_price(&self) -> f64 {
        self.current_bid_price.unwrap_or(self.price)
    }

    pub fn hours_remaining(&self, now: DateTime<Utc>) -> Option<f64> {
        self.end_time
            .map(|end| ((end - now).num_seconds() as f64 / 3600.0).max(0.0))
    }
}

/// A completed sale attributed to a known (grader, grade) cohort.
#[derive(Debug, Clone)]
pub struct CompletedSale {
    pub item_id: String,
    pub title: String,
    pub sold_price: f64,
    pub sold_date: DateTime<Utc>,
    pub grader: Option<Grader>,
    pub grade: String,
}

// ---------------------------------------------------------------------------
// Fair value and snapshots
// ---------------------------------------------------------------------------

/// Result of a fair-value lookup for one (card, grader, grade) triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FairValue {
    pub average: f64,
    pub confidence: f64,
    pub volume: i64,
    pub has_data: bool,
}

impl FairValue {
    pub fn none() -> Self {
        Self {
            average: 0.0,
            confidence: 0.0,
            volume: 0,
            has_data: false,
        }
    }

    /// Evidence-backed enough to use as "real data" in scoring.
    pub fn is_reliable(&self) -> bool {
        self.has_data && self.confidence > RELIABLE_CONFIDENCE
    }
}

/// Persisted statistical summary for one (card, grader, grade) cohort on one
/// collection date. Upsert-keyed on (card_id, snapshot_date, grade, grader).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub card_id: i64,
    pub snapshot_date: NaiveDate,
    /// "PSA 9", "BGS 9.5", "Raw", ...
    pub grade: String,
    /// "PSA", "BGS", "SGC", or "Raw" for ungraded cohorts.
    pub grader: String,
    pub mean: f64,
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
    pub stddev: f64,
    pub volume: i64,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Opportunities — the scanner's output
// ---------------------------------------------------------------------------

/// ROI breakdown for an ungraded card at a given raw price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawRoi {
    pub roi_percentage: f64,
    /// Net expected sale value after fees, across the grading outcome
    /// distribution.
    pub expected_value: f64,
    pub grading_cost: f64,
    pub potential_profit: f64,
    pub confidence_score: f64,
    pub uses_real_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAnalysis {
    pub average_price: f64,
    /// Percent below fair value for graded items; ROI% for raw items.
    pub percent_below_avg: f64,
    pub is_hot_deal: bool,
    pub alert_reason: String,
    pub confidence_score: f64,
    pub uses_real_data: bool,
    pub listing_channel: ListingChannel,
    pub raw_roi: Option<RawRoi>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardInfo {
    pub player: String,
    pub year: i64,
    pub brand: String,
    pub set_name: String,
    pub parallel: Option<String>,
    pub priority_score: i64,
}

/// One validated listing enriched with card context and price analysis.
/// Rebuilt fresh each scan; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub listing_id: String,
    pub card_id: i64,
    pub title: String,
    pub current_price: f64,
    pub buy_it_now_price: Option<f64>,
    pub time_remaining_hours: Option<f64>,
    pub seller_username: String,
    pub seller_feedback_score: i64,
    pub seller_positive_percentage: f64,
    pub url: String,
    pub grade: String,
    pub grader: Option<Grader>,
    pub grade_number: Option<f64>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub card_info: CardInfo,
    pub analysis: PriceAnalysis,
}

// ---------------------------------------------------------------------------
// Dismissals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DismissalRecord {
    pub id: i64,
    pub item_id: String,
    pub card_id: i64,
    pub title: String,
    pub price: f64,
    pub dismissed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub note: Option<String>,
}
