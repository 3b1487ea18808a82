//! Listing validation and classification.
//!
//! A title is the only signal for grade and variant, so everything here is
//! string pattern matching: bundle/premium/grading term tables plus an
//! ordered grader-regex table, kept as pure functions independent of any
//! network code.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::{MAX_SANE_PRICE, MIN_SANE_PRICE};
use crate::types::{GradeInfo, Grader, ListingChannel, MarketplaceItem, SearchChannel};

/// Bundle/lot/collection indicators — none of these is a single card.
const BUNDLE_TERMS: &[&str] = &[
    "lot of",
    "choose",
    "pick",
    "you pick",
    "entire set",
    "complete set",
    "full set",
    "base set",
    "mixed lot",
    "random",
    "mystery",
    "grab bag",
    "commons",
    "base cards",
    "duplicates",
    "extras",
    "binder",
    "collection",
    "bulk",
    "wholesale",
];

/// Premium-variant indicators. These are rejected on every channel so that
/// fair-value comparisons stay base-card against base-card.
const PREMIUM_TERMS: &[&str] = &[
    "autograph",
    "auto ",
    "/25",
    "/50",
    "/75",
    "/99",
    "patch",
    "jersey",
    "game used",
    "worn",
    "relic",
    "memorabilia",
    "dual",
    "triple",
    "quad",
    "signature",
    "signed",
];

/// Grading-company indicators. A raw search must not leak graded cards.
const GRADED_TERMS: &[&str] = &["psa", "bgs", "sgc", "graded", "certified", "authenticated"];

/// Grade number followed by a qualitative grading word, e.g. "9 mint".
static GRADE_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(10|[1-9])(\.\d+)?\s*(gem|mint|excellent|good|poor|authentic|grade|graded)\b")
        .expect("valid grade-word pattern")
});

/// Ordered grader extraction table; first match wins.
static GRADER_PATTERNS: LazyLock<[(Regex, Grader); 3]> = LazyLock::new(|| {
    [
        (
            Regex::new(r"(?i)PSA\s*(\d+(?:\.\d+)?)").expect("valid PSA pattern"),
            Grader::Psa,
        ),
        (
            Regex::new(r"(?i)BGS\s*(\d+(?:\.\d+)?)").expect("valid BGS pattern"),
            Grader::Bgs,
        ),
        (
            Regex::new(r"(?i)SGC\s*(\d+(?:\.\d+)?)").expect("valid SGC pattern"),
            Grader::Sgc,
        ),
    ]
});

// ---------------------------------------------------------------------------
// Rejection accounting
// ---------------------------------------------------------------------------

/// Why a listing was rejected. Any one reason is sufficient; rules are
/// checked in this order.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    PriceOutOfBand(f64),
    Bundle(&'static str),
    PremiumVariant(&'static str),
    /// Raw-channel search surfaced a graded card.
    GradedLeak,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::PriceOutOfBand(p) => write!(f, "price out of band ({p})"),
            Rejection::Bundle(term) => write!(f, "bundle term \"{term}\""),
            Rejection::PremiumVariant(term) => write!(f, "premium indicator \"{term}\""),
            Rejection::GradedLeak => write!(f, "graded card in raw search"),
        }
    }
}

/// Per-scan validation counters, aggregated across all items of a card.
#[derive(Debug, Default, Clone)]
pub struct ValidationStats {
    pub accepted: usize,
    pub rejected_price: usize,
    pub rejected_bundle: usize,
    pub rejected_premium: usize,
    pub rejected_graded_leak: usize,
}

impl ValidationStats {
    pub fn record(&mut self, outcome: &Result<(), Rejection>) {
        match outcome {
            Ok(()) => self.accepted += 1,
            Err(Rejection::PriceOutOfBand(_)) => self.rejected_price += 1,
            Err(Rejection::Bundle(_)) => self.rejected_bundle += 1,
            Err(Rejection::PremiumVariant(_)) => self.rejected_premium += 1,
            Err(Rejection::GradedLeak) => self.rejected_graded_leak += 1,
        }
    }

    pub fn rejected(&self) -> usize {
        self.rejected_price + self.rejected_bundle + self.rejected_premium
            + self.rejected_graded_leak
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Apply the ordered rejection rules for a listing surfaced by `channel`.
pub fn validate(item: &MarketplaceItem, channel: SearchChannel) -> Result<(), Rejection> {
    let price = item.effective_price();
    if !(MIN_SANE_PRICE..=MAX_SANE_PRICE).contains(&price) {
        return Err(Rejection::PriceOutOfBand(price));
    }

    let title = item.title.to_lowercase();

    if let Some(term) = BUNDLE_TERMS.iter().find(|t| title.contains(*t)).copied() {
        return Err(Rejection::Bundle(term));
    }

    // Unconditional regardless of channel: a patch auto is never comparable
    // to the base card it would be priced against.
    if let Some(term) = PREMIUM_TERMS.iter().find(|t| title.contains(*t)).copied() {
        return Err(Rejection::PremiumVariant(term));
    }

    if channel == SearchChannel::Raw {
        if GRADED_TERMS.iter().any(|t| title.contains(t)) {
            return Err(Rejection::GradedLeak);
        }
        if GRADE_WORD_RE.is_match(&title) {
            return Err(Rejection::GradedLeak);
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Grade extraction
// ---------------------------------------------------------------------------

/// Extract grader and numeric grade from a title. First matching grader
/// pattern wins; no match means ungraded/raw.
pub fn extract_grade_info(title: &str) -> GradeInfo {
    for (pattern, grader) in GRADER_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(title) {
            let value = &caps[1];
            return GradeInfo {
                grader: Some(*grader),
                grade: format!("{} {}", grader.as_str(), value),
                grade_number: value.parse::<f64>().ok(),
            };
        }
    }
    GradeInfo::raw()
}

// ---------------------------------------------------------------------------
// Channel decisions
// ---------------------------------------------------------------------------

/// Decide how a listing can be bought from its buying-option flags, falling
/// back to field presence when the service omits them.
pub fn listing_channel(item: &MarketplaceItem) -> ListingChannel {
    let has_fixed = item.buying_options.iter().any(|o| o == "FIXED_PRICE");
    let has_auction = item.buying_options.iter().any(|o| o == "AUCTION");

    match (has_fixed, has_auction) {
        (true, true) => return ListingChannel::AuctionPlusBin,
        (true, false) => return ListingChannel::BuyItNow,
        (false, true) => return ListingChannel::Auction,
        (false, false) => {}
    }

    // No flags at all. A bare price with no bid and no end time reads as a
    // fixed-price listing; a bid plus an end time reads as an auction.
    if item.price > 0.0 && item.current_bid_price.is_none() && item.end_time.is_none() {
        return ListingChannel::BuyItNow;
    }
    if item.end_time.is_some() && item.current_bid_price.is_some() {
        return ListingChannel::Auction;
    }
    ListingChannel::BuyItNow
}

/// The channel an item is scored under. Grade evidence in the title beats
/// the query that surfaced the item: a graded card found by the raw query is
/// scored as auction/bin, and an ungraded card is only scored raw when the
/// title carries no grading terms at all.
pub fn effective_channel(item: &MarketplaceItem, grade_info: &GradeInfo) -> SearchChannel {
    let by_listing = || {
        if item.buying_options.iter().any(|o| o == "AUCTION") {
            SearchChannel::Auction
        } else {
            SearchChannel::Bin
        }
    };

    if !grade_info.is_raw() {
        return by_listing();
    }

    let title = item.title.to_lowercase();
    if GRADED_TERMS[..4].iter().any(|t| title.contains(t)) {
        // Mentions a grader but no parseable grade — not safely raw.
        by_listing()
    } else {
        SearchChannel::Raw
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, price: f64, channel: SearchChannel) -> MarketplaceItem {
        MarketplaceItem {
            item_id: "v1|1234|0".to_string(),
            title: title.to_string(),
            price,
            currency: "USD".to_string(),
            current_bid_price: None,
            condition: "Used".to_string(),
            seller_username: "seller".to_string(),
            seller_feedback_score: 1000,
            seller_feedback_percent: 99.8,
            url: "https://www.ebay.com/itm/1234".to_string(),
            end_time: None,
            buying_options: vec![],
            image_url: None,
            channel,
        }
    }

    #[test]
    fn price_band_is_enforced() {
        let low = item("2018 Prizm Luka Doncic card", 0.5, SearchChannel::Auction);
        assert!(matches!(
            validate(&low, SearchChannel::Auction),
            Err(Rejection::PriceOutOfBand(_))
        ));

        let high = item("2018 Prizm Luka Doncic card", 75_000.0, SearchChannel::Bin);
        assert!(matches!(
            validate(&high, SearchChannel::Bin),
            Err(Rejection::PriceOutOfBand(_))
        ));
    }

    #[test]
    fn bundle_terms_reject() {
        let lot = item(
            "Lot of 50 basketball cards you pick",
            25.0,
            SearchChannel::Bin,
        );
        assert!(matches!(
            validate(&lot, SearchChannel::Bin),
            Err(Rejection::Bundle(_))
        ));
    }

    #[test]
    fn premium_variant_rejects_on_every_channel() {
        for channel in [SearchChannel::Auction, SearchChannel::Bin, SearchChannel::Raw] {
            let it = item(
                "2020 Select Justin Herbert Patch Auto /25 RC",
                150.0,
                channel,
            );
            assert!(
                matches!(validate(&it, channel), Err(Rejection::PremiumVariant(_))),
                "channel {channel} let a patch auto through"
            );
        }
    }

    #[test]
    fn raw_channel_rejects_graded_titles() {
        let graded = item("2018 Prizm Luka Doncic PSA 9", 120.0, SearchChannel::Raw);
        assert_eq!(validate(&graded, SearchChannel::Raw), Err(Rejection::GradedLeak));

        // Same title is fine for the graded channels (pending other rules).
        assert!(validate(&graded, SearchChannel::Auction).is_ok());
        assert!(validate(&graded, SearchChannel::Bin).is_ok());
    }

    #[test]
    fn raw_channel_rejects_grade_word_pattern() {
        let sneaky = item(
            "2018 Prizm Luka Doncic rookie 9 mint condition",
            80.0,
            SearchChannel::Raw,
        );
        assert_eq!(validate(&sneaky, SearchChannel::Raw), Err(Rejection::GradedLeak));
    }

    #[test]
    fn clean_raw_title_passes() {
        let raw = item(
            "2018 Panini Prizm Luka Doncic rookie card",
            45.0,
            SearchChannel::Raw,
        );
        assert!(validate(&raw, SearchChannel::Raw).is_ok());
    }

    #[test]
    fn ungraded_in_title_still_counts_as_leak() {
        // Substring matching means "ungraded" trips the "graded" term. That
        // is deliberate slack: a title negotiating its grading status is not
        // safely raw.
        let it = item("Luka Doncic rookie ungraded sharp", 45.0, SearchChannel::Raw);
        assert_eq!(validate(&it, SearchChannel::Raw), Err(Rejection::GradedLeak));
    }

    #[test]
    fn extracts_psa_grade() {
        let info = extract_grade_info("2018 Prizm Luka Doncic PSA 10 Gem Mint");
        assert_eq!(info.grader, Some(Grader::Psa));
        assert_eq!(info.grade, "PSA 10");
        assert_eq!(info.grade_number, Some(10.0));
    }

    #[test]
    fn extracts_half_point_grades() {
        let info = extract_grade_info("2011 Topps Update bgs 9.5 quad-case");
        assert_eq!(info.grader, Some(Grader::Bgs));
        assert_eq!(info.grade, "BGS 9.5");
        assert_eq!(info.grade_number, Some(9.5));
    }

    #[test]
    fn first_grader_pattern_wins() {
        // PSA is first in the table, so a crossover title resolves to PSA.
        let info = extract_grade_info("PSA 9 crossover from SGC 8");
        assert_eq!(info.grader, Some(Grader::Psa));
        assert_eq!(info.grade_number, Some(9.0));
    }

    #[test]
    fn no_grader_means_raw() {
        let info = extract_grade_info("2003 Topps LeBron James rookie #221");
        assert!(info.is_raw());
        assert_eq!(info.grade, "Raw");
        assert_eq!(info.grade_number, None);
    }

    #[test]
    fn listing_channel_from_flags() {
        let mut it = item("x", 10.0, SearchChannel::Bin);

        it.buying_options = vec!["FIXED_PRICE".to_string(), "AUCTION".to_string()];
        assert_eq!(listing_channel(&it), ListingChannel::AuctionPlusBin);

        it.buying_options = vec!["FIXED_PRICE".to_string()];
        assert_eq!(listing_channel(&it), ListingChannel::BuyItNow);

        it.buying_options = vec!["AUCTION".to_string()];
        assert_eq!(listing_channel(&it), ListingChannel::Auction);
    }

    #[test]
    fn listing_channel_heuristic_without_flags() {
        // Price only, no bid, no end time: fixed price.
        let fixed = item("x", 10.0, SearchChannel::Bin);
        assert_eq!(listing_channel(&fixed), ListingChannel::BuyItNow);

        // Bid plus end time: auction.
        let mut auction = item("x", 10.0, SearchChannel::Auction);
        auction.current_bid_price = Some(7.5);
        auction.end_time = Some(chrono::Utc::now());
        assert_eq!(listing_channel(&auction), ListingChannel::Auction);
    }

    #[test]
    fn effective_channel_overrides_query_tag() {
        // Graded title found by the raw query scores as a graded channel.
        let mut graded = item("Luka Doncic PSA 9", 100.0, SearchChannel::Raw);
        graded.buying_options = vec!["AUCTION".to_string()];
        let info = extract_grade_info(&graded.title);
        assert_eq!(effective_channel(&graded, &info), SearchChannel::Auction);

        // Clean ungraded title scores raw even from a bin query.
        let raw = item("Luka Doncic rookie card", 40.0, SearchChannel::Bin);
        let info = extract_grade_info(&raw.title);
        assert_eq!(effective_channel(&raw, &info), SearchChannel::Raw);

        // Grader mention without a parseable grade is not safely raw.
        let murky = item("Luka Doncic ready for psa grading", 40.0, SearchChannel::Bin);
        let info = extract_grade_info(&murky.title);
        assert_eq!(effective_channel(&murky, &info), SearchChannel::Bin);
    }

    #[test]
    fn validation_stats_count_by_reason() {
        let mut stats = ValidationStats::default();
        stats.record(&Ok(()));
        stats.record(&Err(Rejection::Bundle("lot of")));
        stats.record(&Err(Rejection::PremiumVariant("patch")));
        stats.record(&Err(Rejection::GradedLeak));
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.rejected(), 3);
    }
}
