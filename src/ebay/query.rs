//! Search-query construction.
//!
//! Queries are built from the card's identity tokens plus a sizeable set of
//! negative keywords that keeps autographs, patches, numbered parallels,
//! lots and damaged copies out of the candidate pool before validation ever
//! sees them.

use crate::types::WatchlistCard;

/// Negative keywords appended to every search to isolate base cards.
const NEGATIVE_KEYWORDS: &[&str] = &[
    // Premium card exclusions
    "-auto",
    "-autograph",
    "-autographed",
    "-signed",
    "-signature",
    "-patch",
    "-jersey",
    "-game-used",
    "-worn",
    "-relic",
    "-memorabilia",
    "-dual",
    "-triple",
    "-quad",
    // Numbered/premium parallels
    "-/25",
    "-/50",
    "-/75",
    "-/99",
    "-/100",
    "-/199",
    "-/299",
    "-silver",
    "-gold",
    "-platinum",
    "-black",
    "-red",
    "-blue",
    "-green",
    "-prizm",
    "-refractor",
    "-chrome",
    "-shimmer",
    "-crystal",
    "-rainbow",
    "-disco",
    "-atomic",
    "-laser",
    "-holo",
    // Lots and sets
    "-lot",
    "-set",
    "-collection",
    "-complete",
    "-full",
    "-choose",
    "-pick",
    "-\"you pick\"",
    "-random",
    "-mystery",
    "-commons",
    "-\"base cards\"",
    "-duplicates",
    "-extras",
    "-bulk",
    "-wholesale",
    "-mixed",
    // Condition problems
    "-damaged",
    "-crease",
    "-corner",
    "-edge",
    "-surface",
    "-\"off-center\"",
    "-miscut",
    "-\"print line\"",
    "-stain",
    // Low-value copies
    "-reprint",
    "-reproduction",
    "-facsimile",
    "-copy",
    "-custom",
    "-proxy",
    "-alter",
    "-sketch",
];

/// Short negative core kept when a query must be compacted for the API's
/// length tolerance.
const COMPACT_NEGATIVES_GRADED: &str = "-auto -autograph -patch -jersey -/25 -/50";
const COMPACT_NEGATIVES_RAW: &str =
    "-auto -autograph -patch -jersey -/25 -/50 -/99 -silver -gold -prizm";

pub fn negative_keywords() -> String {
    NEGATIVE_KEYWORDS.join(" ")
}

fn identity_tokens(card: &WatchlistCard) -> Vec<String> {
    let mut parts = vec![
        card.player.clone(),
        card.year.to_string(),
        card.brand.clone(),
        card.set_name.clone(),
        "card".to_string(),
    ];
    if let Some(parallel) = &card.parallel {
        if parallel != "Base" {
            parts.push(parallel.clone());
        }
    }
    parts
}

/// Query for the graded (auction / buy-it-now) channels. Mentions "PSA" when
/// the card monitors PSA grades, which biases results toward slabs.
pub fn build_graded_query(card: &WatchlistCard) -> String {
    let mut parts = identity_tokens(card);
    let monitors_psa = card
        .grades_monitored
        .iter()
        .any(|g| g.starts_with("PSA"));
    let monitors_raw = card.grades_monitored.iter().any(|g| g == "Raw");
    // Cards that also track raw copies get no grader token — the slab bias
    // would starve the ungraded side of the comparison.
    if monitors_psa && !monitors_raw {
        parts.push("PSA".to_string());
    }
    format!("{} {}", parts.join(" "), negative_keywords())
}

/// Query for the raw/ungraded channel.
pub fn build_raw_query(card: &WatchlistCard) -> String {
    let mut parts = identity_tokens(card);
    parts.push("ungraded".to_string());
    format!("{} {}", parts.join(" "), negative_keywords())
}

/// Base query (identity tokens only) used by the historical collector, which
/// appends its own grade tokens.
pub fn build_base_query(card: &WatchlistCard) -> String {
    identity_tokens(card).join(" ")
}

/// Trim a query to the marketplace API's length tolerance: keep the leading
/// identity tokens, drop the long negative tail, and re-append a short
/// negative core. Raw queries keep fewer tokens but a wider negative core.
pub fn compact_live_query(query: &str, raw: bool) -> String {
    let take = if raw { 6 } else { 8 };
    let core: Vec<&str> = query
        .split_whitespace()
        .filter(|t| !t.starts_with('-'))
        .take(take)
        .collect();
    let negatives = if raw {
        COMPACT_NEGATIVES_RAW
    } else {
        COMPACT_NEGATIVES_GRADED
    };
    format!("{} {negatives}", core.join(" "))
}

/// Strip every negative keyword; the sold-items endpoint rejects long
/// negative tails outright.
pub fn strip_negatives(query: &str) -> String {
    query
        .split_whitespace()
        .filter(|t| !t.starts_with('-'))
        .collect::<Vec<_>>()
        .join(" ")
}
