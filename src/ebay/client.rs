//! Marketplace search client.
//!
//! Live listings and completed sales arrive in different wire shapes (the
//! flat item-summary form and a legacy nested completed-sales envelope);
//! both are normalized into `MarketplaceItem` here so validation and scoring
//! never see raw JSON. A failed channel query degrades to zero items — one
//! bad channel never aborts a card's scan.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::{Config, CARD_CATEGORY_ID, MARKETPLACE_ID};
use crate::ebay::auth::TokenProvider;
use crate::ebay::query::{build_graded_query, build_raw_query, compact_live_query, strip_negatives};
use crate::error::{AppError, Result};
use crate::types::{MarketplaceItem, SearchChannel, WatchlistCard};

/// Completed-sales requests accept a larger page than live ones.
const COMPLETED_MAX_LIMIT: usize = 200;

#[derive(Debug, Default, Clone)]
pub struct FetchStats {
    pub auction_items: usize,
    pub bin_items: usize,
    pub raw_items: usize,
    /// Items dropped by first-occurrence-wins deduplication.
    pub duplicates: usize,
}

impl FetchStats {
    pub fn total(&self) -> usize {
        self.auction_items + self.bin_items + self.raw_items
    }
}

pub struct EbayClient {
    http: reqwest::Client,
    api_url: String,
    auth: Arc<TokenProvider>,
}

impl EbayClient {
    pub fn new(cfg: &Config, auth: Arc<TokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_url: cfg.api_url.clone(),
            auth,
        })
    }

    /// Issue the three channel queries for a card concurrently and merge the
    /// results, deduplicated by item id (first occurrence wins). A channel
    /// that errors contributes nothing.
    pub async fn triple_search(
        &self,
        card: &WatchlistCard,
        limit: usize,
    ) -> (Vec<MarketplaceItem>, FetchStats) {
        let graded_query = build_graded_query(card);
        let raw_query = build_raw_query(card);

        let (auction, bin, raw) = tokio::join!(
            self.search_live(&graded_query, SearchChannel::Auction, limit),
            self.search_live(&graded_query, SearchChannel::Bin, limit),
            self.search_live(&raw_query, SearchChannel::Raw, limit),
        );

        let auction = recover_channel(auction, SearchChannel::Auction, &card.player);
        let bin = recover_channel(bin, SearchChannel::Bin, &card.player);
        let raw = recover_channel(raw, SearchChannel::Raw, &card.player);

        let mut stats = FetchStats {
            auction_items: auction.len(),
            bin_items: bin.len(),
            raw_items: raw.len(),
            duplicates: 0,
        };

        let (merged, duplicates) = merge_dedupe(vec![auction, bin, raw]);
        stats.duplicates = duplicates;

        debug!(
            player = %card.player,
            auction = stats.auction_items,
            bin = stats.bin_items,
            raw = stats.raw_items,
            duplicates = stats.duplicates,
            "Triple search complete",
        );

        (merged, stats)
    }

    /// Search live listings on one channel.
    pub async fn search_live(
        &self,
        query: &str,
        channel: SearchChannel,
        limit: usize,
    ) -> Result<Vec<MarketplaceItem>> {
        let compact = compact_live_query(query, channel == SearchChannel::Raw);
        let mut params = vec![
            ("q", compact),
            ("limit", limit.to_string()),
            ("category_ids", CARD_CATEGORY_ID.to_string()),
            ("sort", "EndTimeSoonest".to_string()),
        ];
        match channel {
            SearchChannel::Auction => {
                params.push(("filter", "buyingOptions:{AUCTION}".to_string()));
            }
            SearchChannel::Raw => {
                // Ungraded condition band; graded slabs list under separate
                // condition ids.
                params.push(("filter", "conditionIds:{1000,1500,2000,2500,3000}".to_string()));
            }
            SearchChannel::Bin => {}
        }

        let resp = self.get_json("item_summary/search", &params).await?;
        Ok(normalize_response(&resp, channel))
    }

    /// Search completed/sold listings. The sold-items endpoint rejects long
    /// negative tails, so the query is stripped down to its identity tokens.
    pub async fn search_completed(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MarketplaceItem>> {
        let clean = strip_negatives(query);
        let params = vec![
            ("q", clean),
            ("limit", limit.min(COMPLETED_MAX_LIMIT).to_string()),
            ("category_ids", CARD_CATEGORY_ID.to_string()),
            ("sort", "EndTimeSoonest".to_string()),
            ("filter", "conditions:{USED,NEW},soldItems:true".to_string()),
        ];

        let resp = self.get_json("item_summary/search", &params).await?;
        Ok(normalize_response(&resp, SearchChannel::Bin))
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let token = self.auth.get_valid_token().await?;
        let url = format!("{}/{path}", self.api_url);

        let resp = self
            .http
            .get(&url)
            .query(params)
            .bearer_auth(token)
            .header("X-EBAY-C-MARKETPLACE-ID", MARKETPLACE_ID)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Marketplace(status.as_u16(), body));
        }

        Ok(resp.json().await?)
    }
}

fn recover_channel(
    result: Result<Vec<MarketplaceItem>>,
    channel: SearchChannel,
    player: &str,
) -> Vec<MarketplaceItem> {
    match result {
        Ok(items) => items,
        Err(e) => {
            warn!("{channel} search failed for {player}: {e}");
            Vec::new()
        }
    }
}

/// Merge per-channel batches, dropping repeated item ids. The first
/// occurrence (and its channel tag) wins. Returns the merged pool and the
/// number of duplicates dropped.
pub fn merge_dedupe(batches: Vec<Vec<MarketplaceItem>>) -> (Vec<MarketplaceItem>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    let mut duplicates = 0;
    for batch in batches {
        for item in batch {
            if seen.insert(item.item_id.clone()) {
                merged.push(item);
            } else {
                duplicates += 1;
            }
        }
    }
    (merged, duplicates)
}

// ---------------------------------------------------------------------------
// Response normalization
// ---------------------------------------------------------------------------

/// Normalize either wire shape into items. Unparseable entries are skipped.
pub fn normalize_response(resp: &serde_json::Value, channel: SearchChannel) -> Vec<MarketplaceItem> {
    if let Some(summaries) = resp.get("itemSummaries").and_then(|v| v.as_array()) {
        return summaries
            .iter()
            .filter_map(|v| parse_item_summary(v, channel))
            .collect();
    }

    // Legacy completed-sales envelope: findCompletedItemsResponse[0]
    //   .searchResult[0].item[]
    let legacy_items = resp
        .get("findCompletedItemsResponse")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .and_then(|v| v.get("searchResult"))
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .and_then(|v| v.get("item"))
        .and_then(|v| v.as_array());

    match legacy_items {
        Some(items) => items
            .iter()
            .filter_map(|v| parse_legacy_completed(v, channel))
            .collect(),
        None => Vec::new(),
    }
}

fn parse_price(v: Option<&serde_json::Value>) -> Option<f64> {
    let v = v?;
    v.get("value")
        .and_then(|p| p.as_f64().or_else(|| p.as_str().and_then(|s| s.parse().ok())))
}

fn parse_item_summary(v: &serde_json::Value, channel: SearchChannel) -> Option<MarketplaceItem> {
    let item_id = v.get("itemId")?.as_str()?.to_string();
    let title = v.get("title")?.as_str()?.to_string();

    let price = parse_price(v.get("price"));
    let current_bid_price = parse_price(v.get("currentBidPrice"));
    // A listing with neither a price nor a bid is malformed; drop it.
    if price.is_none() && current_bid_price.is_none() {
        return None;
    }

    let currency = v
        .get("price")
        .and_then(|p| p.get("currency"))
        .and_then(|c| c.as_str())
        .unwrap_or("USD")
        .to_string();

    let seller = v.get("seller");
    let seller_username = seller
        .and_then(|s| s.get("username"))
        .and_then(|u| u.as_str())
        .unwrap_or("unknown_seller")
        .to_string();
    let seller_feedback_score = seller
        .and_then(|s| s.get("feedbackScore"))
        .and_then(|f| f.as_i64())
        .unwrap_or(0);
    let seller_feedback_percent = seller
        .and_then(|s| s.get("feedbackPercentage"))
        .and_then(|f| f.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(100.0);

    let url = v
        .get("itemWebUrl")
        .and_then(|u| u.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("https://www.ebay.com/itm/{item_id}"));

    let end_time = v
        .get("itemEndDate")
        .and_then(|d| d.as_str())
        .and_then(parse_timestamp);

    let buying_options = v
        .get("buyingOptions")
        .and_then(|b| b.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|o| o.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let image_url = v
        .get("image")
        .and_then(|i| i.get("imageUrl"))
        .and_then(|u| u.as_str())
        .map(|s| s.to_string());

    let condition = v
        .get("condition")
        .and_then(|c| c.as_str())
        .unwrap_or("Unknown")
        .to_string();

    Some(MarketplaceItem {
        item_id,
        title,
        price: price.unwrap_or(0.0),
        currency,
        current_bid_price,
        condition,
        seller_username,
        seller_feedback_score,
        seller_feedback_percent,
        url,
        end_time,
        buying_options,
        image_url,
        channel,
    })
}

/// First element of a single-element array field — the legacy envelope wraps
/// every value this way.
fn legacy_first<'a>(v: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    v.get(key)?.as_array()?.first()
}

fn parse_legacy_completed(
    v: &serde_json::Value,
    channel: SearchChannel,
) -> Option<MarketplaceItem> {
    let item_id = legacy_first(v, "itemId")?.as_str()?.to_string();
    let title = legacy_first(v, "title")?.as_str()?.to_string();

    let price = legacy_first(v, "sellingStatus")
        .and_then(|s| legacy_first(s, "currentPrice"))
        .and_then(|p| p.get("__value__"))
        .and_then(|p| p.as_str())
        .and_then(|s| s.parse::<f64>().ok())?;

    let end_time = legacy_first(v, "listingInfo")
        .and_then(|l| legacy_first(l, "endTime"))
        .and_then(|t| t.as_str())
        .and_then(parse_timestamp);

    let condition = legacy_first(v, "condition")
        .and_then(|c| legacy_first(c, "conditionDisplayName"))
        .and_then(|c| c.as_str())
        .unwrap_or("Unknown")
        .to_string();

    let seller_username = legacy_first(v, "sellerInfo")
        .and_then(|s| legacy_first(s, "sellerUserName"))
        .and_then(|u| u.as_str())
        .unwrap_or("unknown_seller")
        .to_string();

    let url = legacy_first(v, "viewItemURL")
        .and_then(|u| u.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("https://www.ebay.com/itm/{item_id}"));

    Some(MarketplaceItem {
        item_id,
        title,
        price,
        currency: "USD".to_string(),
        current_bid_price: None,
        condition,
        seller_username,
        seller_feedback_score: 0,
        seller_feedback_percent: 100.0,
        url,
        end_time,
        buying_options: Vec::new(),
        image_url: None,
        channel,
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_item_summary_shape() {
        let resp = json!({
            "total": 1,
            "itemSummaries": [{
                "itemId": "v1|123|0",
                "title": "2018 Prizm Luka Doncic PSA 9",
                "price": {"value": "150.00", "currency": "USD"},
                "currentBidPrice": {"value": "120.00", "currency": "USD"},
                "condition": "Used",
                "seller": {
                    "username": "cardshop",
                    "feedbackPercentage": "99.6",
                    "feedbackScore": 5230
                },
                "itemWebUrl": "https://www.ebay.com/itm/123",
                "itemEndDate": "2026-08-07T18:30:00.000Z",
                "buyingOptions": ["AUCTION"],
                "image": {"imageUrl": "https://i.ebayimg.com/images/g/abc/s-l500.jpg"}
            }]
        });

        let items = normalize_response(&resp, SearchChannel::Auction);
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.item_id, "v1|123|0");
        assert!((item.price - 150.0).abs() < 1e-9);
        assert_eq!(item.current_bid_price, Some(120.0));
        assert!((item.effective_price() - 120.0).abs() < 1e-9);
        assert_eq!(item.seller_feedback_score, 5230);
        assert!(item.end_time.is_some());
        assert_eq!(item.channel, SearchChannel::Auction);
    }

    #[test]
    fn parses_legacy_completed_shape() {
        let resp = json!({
            "findCompletedItemsResponse": [{
                "searchResult": [{
                    "@count": "1",
                    "item": [{
                        "itemId": ["987"],
                        "title": ["2018 Prizm Luka Doncic PSA 10"],
                        "sellingStatus": [{
                            "currentPrice": [{"__value__": "620.00", "@currencyId": "USD"}]
                        }],
                        "listingInfo": [{"endTime": ["2026-08-01T12:00:00.000Z"]}],
                        "condition": [{"conditionDisplayName": ["Used"]}],
                        "sellerInfo": [{"sellerUserName": ["slabseller"]}],
                        "viewItemURL": ["https://www.ebay.com/itm/987"]
                    }]
                }]
            }]
        });

        let items = normalize_response(&resp, SearchChannel::Bin);
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.item_id, "987");
        assert!((item.price - 620.0).abs() < 1e-9);
        assert_eq!(item.seller_username, "slabseller");
        assert!(item.end_time.is_some());
    }

    #[test]
    fn malformed_items_are_skipped() {
        let resp = json!({
            "itemSummaries": [
                {"itemId": "v1|1|0", "title": "no price at all"},
                {"title": "no item id", "price": {"value": "10.00"}},
                {
                    "itemId": "v1|2|0",
                    "title": "good item",
                    "price": {"value": "25.00", "currency": "USD"}
                }
            ]
        });

        let items = normalize_response(&resp, SearchChannel::Bin);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_id, "v1|2|0");
    }

    #[test]
    fn empty_or_unknown_shape_yields_nothing() {
        assert!(normalize_response(&json!({}), SearchChannel::Bin).is_empty());
        assert!(normalize_response(&json!({"total": 0}), SearchChannel::Bin).is_empty());
    }

    fn stub_item(id: &str, channel: SearchChannel) -> MarketplaceItem {
        MarketplaceItem {
            item_id: id.to_string(),
            title: "x".to_string(),
            price: 10.0,
            currency: "USD".to_string(),
            current_bid_price: None,
            condition: "Used".to_string(),
            seller_username: "s".to_string(),
            seller_feedback_score: 0,
            seller_feedback_percent: 100.0,
            url: String::new(),
            end_time: None,
            buying_options: Vec::new(),
            image_url: None,
            channel,
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let auction = vec![stub_item("a", SearchChannel::Auction)];
        let bin = vec![
            stub_item("a", SearchChannel::Bin),
            stub_item("b", SearchChannel::Bin),
        ];
        let (merged, duplicates) = merge_dedupe(vec![auction, bin]);

        assert_eq!(merged.len(), 2);
        assert_eq!(duplicates, 1);
        // The auction copy of "a" won.
        assert_eq!(merged[0].item_id, "a");
        assert_eq!(merged[0].channel, SearchChannel::Auction);
        assert_eq!(merged[1].item_id, "b");
    }
}
