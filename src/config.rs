use crate::error::{AppError, Result};

pub const EBAY_API_URL: &str = "https://api.ebay.com/buy/browse/v1";
pub const EBAY_AUTH_URL: &str = "https://api.ebay.com/identity/v1/oauth2/token";

/// eBay marketplace header value — all searches run against the US site.
pub const MARKETPLACE_ID: &str = "EBAY_US";

/// Browse API category for sports trading cards.
pub const CARD_CATEGORY_ID: &str = "212";

/// Refresh the cached bearer token this many seconds before it expires.
pub const TOKEN_EXPIRY_MARGIN_SECS: u64 = 300;

/// Listings priced outside this band are discarded as noise or mis-listings.
pub const MIN_SANE_PRICE: f64 = 1.0;
pub const MAX_SANE_PRICE: f64 = 50_000.0;

/// Flat grading submission cost (economy tier plus shipping).
pub const GRADING_COST: f64 = 35.0;

/// Combined marketplace + payment fee rate applied to gross sale proceeds.
pub const MARKETPLACE_FEE_RATE: f64 = 0.13;

/// Grading outcome distribution for a raw card: (grade, probability).
/// Population-report rates for modern submissions; a fixed policy constant.
pub const GRADE_OUTCOME_PROBS: [(u8, f64); 4] =
    [(10, 0.05), (9, 0.30), (8, 0.50), (7, 0.15)];

/// Confidence floor used when ROI is estimated without any historical data.
pub const NO_DATA_CONFIDENCE: f64 = 25.0;
/// Confidence floor for the emergency path (fair-value lookups failed outright).
pub const EMERGENCY_CONFIDENCE: f64 = 10.0;

/// Minimum completed sales a (grade, grader) cohort needs before a snapshot
/// is worth persisting.
pub const MIN_COHORT_SALES: usize = 3;

/// A fair-value estimate is treated as evidence-backed above this confidence.
pub const RELIABLE_CONFIDENCE: f64 = 50.0;

/// Dismissed listings stay suppressed for this many days.
pub const DISMISSAL_WINDOW_DAYS: i64 = 30;

/// Per-channel "percent below fair value" (or ROI%) acceptance thresholds.
pub mod thresholds {
    pub const AUCTION_MIN_PCT: f64 = 20.0;
    pub const BIN_MIN_PCT: f64 = 30.0;
    pub const RAW_MIN_ROI_PCT: f64 = 40.0;
    /// Escape valve: any channel qualifies at this level.
    pub const ANY_CHANNEL_PCT: f64 = 50.0;
}

/// Ratios used to backfill one missing grade from an adjacent grade that has
/// real data: value(missing) = value(anchor) * ratio.
pub mod grade_ratios {
    /// PSA 7 from PSA 8.
    pub const SEVEN_FROM_EIGHT: f64 = 0.6;
    /// PSA 8 from PSA 9.
    pub const EIGHT_FROM_NINE: f64 = 0.7;
    /// PSA 9 from PSA 10.
    pub const NINE_FROM_TEN: f64 = 0.4;
    /// PSA 10 from PSA 9.
    pub const TEN_FROM_NINE: f64 = 2.5;
}

/// Raw-price multipliers per grade 7/8/9/10 when a grade cannot be anchored
/// to any real data. Which set applies is a policy decision, not a derived
/// constant, so both live on `Config` and can be overridden from the
/// environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiplierPolicy {
    /// Used to backfill an isolated gap when at least one grade has real data.
    pub optimistic: [f64; 4],
    /// Used when no grade has real data, and (at minimal confidence) when
    /// the lookups themselves fail.
    pub conservative: [f64; 4],
}

impl Default for MultiplierPolicy {
    fn default() -> Self {
        Self {
            optimistic: [2.0, 3.5, 6.0, 12.0],
            conservative: [1.5, 2.5, 4.0, 8.0],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Full scan cadence in seconds (SCAN_INTERVAL_SECS).
    pub scan_interval_secs: u64,
    /// Historical collection cadence in seconds (COLLECT_INTERVAL_SECS).
    pub collect_interval_secs: u64,
    /// Max watchlist cards per scan, highest priority first (SCAN_MAX_CARDS).
    pub scan_max_cards: usize,
    /// Cap on the published opportunity feed (SCAN_RESULT_CAP).
    pub scan_result_cap: usize,
    /// Result-size cap per live channel query (SEARCH_LIMIT_PER_CHANNEL).
    pub search_limit_per_channel: usize,
    /// Result-size cap per completed-sales cohort query (COMPLETED_SEARCH_LIMIT).
    pub completed_search_limit: usize,
    /// Minimum milliseconds between cards during a scan (CARD_SCAN_INTERVAL_MS).
    pub card_interval_ms: u64,
    pub multipliers: MultiplierPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("EBAY_CLIENT_ID")
            .map_err(|_| AppError::Config("EBAY_CLIENT_ID must be set".to_string()))?;
        let client_secret = std::env::var("EBAY_CLIENT_SECRET")
            .map_err(|_| AppError::Config("EBAY_CLIENT_SECRET must be set".to_string()))?;

        Ok(Self {
            api_url: std::env::var("EBAY_API_URL").unwrap_or_else(|_| EBAY_API_URL.to_string()),
            auth_url: std::env::var("EBAY_AUTH_URL").unwrap_or_else(|_| EBAY_AUTH_URL.to_string()),
            client_id,
            client_secret,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "scanner.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            scan_interval_secs: std::env::var("SCAN_INTERVAL_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse::<u64>()
                .unwrap_or(900),
            collect_interval_secs: std::env::var("COLLECT_INTERVAL_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse::<u64>()
                .unwrap_or(86_400),
            scan_max_cards: std::env::var("SCAN_MAX_CARDS")
                .unwrap_or_else(|_| "25".to_string())
                .parse::<usize>()
                .unwrap_or(25),
            scan_result_cap: std::env::var("SCAN_RESULT_CAP")
                .unwrap_or_else(|_| "200".to_string())
                .parse::<usize>()
                .unwrap_or(200),
            search_limit_per_channel: std::env::var("SEARCH_LIMIT_PER_CHANNEL")
                .unwrap_or_else(|_| "4".to_string())
                .parse::<usize>()
                .unwrap_or(4),
            completed_search_limit: std::env::var("COMPLETED_SEARCH_LIMIT")
                .unwrap_or_else(|_| "50".to_string())
                .parse::<usize>()
                .unwrap_or(50),
            card_interval_ms: std::env::var("CARD_SCAN_INTERVAL_MS")
                .unwrap_or_else(|_| "600".to_string())
                .parse::<u64>()
                .unwrap_or(600),
            multipliers: MultiplierPolicy {
                optimistic: parse_multipliers(
                    "ROI_OPTIMISTIC_MULTIPLIERS",
                    MultiplierPolicy::default().optimistic,
                ),
                conservative: parse_multipliers(
                    "ROI_FALLBACK_MULTIPLIERS",
                    MultiplierPolicy::default().conservative,
                ),
            },
        })
    }
}

/// Parse an env var of the form "1.5,2.5,4.0,8.0" (grades 7,8,9,10).
/// Anything malformed falls back to the supplied default set.
fn parse_multipliers(var: &str, default: [f64; 4]) -> [f64; 4] {
    let Ok(raw) = std::env::var(var) else {
        return default;
    };
    let parsed: Vec<f64> = raw
        .split(',')
        .filter_map(|s| s.trim().parse::<f64>().ok())
        .collect();
    match <[f64; 4]>::try_from(parsed) {
        Ok(arr) if arr.iter().all(|m| *m > 0.0) => arr,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_conservative_below_optimistic() {
        let policy = MultiplierPolicy::default();
        for (c, o) in policy.conservative.iter().zip(policy.optimistic.iter()) {
            assert!(c < o, "conservative {c} should sit below optimistic {o}");
        }
    }

    #[test]
    fn outcome_probabilities_sum_to_one() {
        let total: f64 = GRADE_OUTCOME_PROBS.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-9, "total={total}");
    }
}
