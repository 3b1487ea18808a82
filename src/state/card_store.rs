//! In-memory mirror of the watchlist.
//!
//! Loaded from the database at bootstrap and refreshed before each scan, so
//! a scan cycle works against an immutable view of the cards while admin
//! writes land in the database underneath.

use std::sync::Arc;

use dashmap::DashMap;

use crate::types::WatchlistCard;

pub struct CardStore {
    cards: DashMap<i64, WatchlistCard>,
}

impl CardStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cards: DashMap::new(),
        })
    }

    pub fn add_card(&self, card: WatchlistCard) {
        self.cards.insert(card.id, card);
    }

    /// Swap in a freshly loaded watchlist.
    pub fn replace_all(&self, cards: Vec<WatchlistCard>) {
        self.cards.clear();
        for card in cards {
            self.cards.insert(card.id, card);
        }
    }

    /// Active cards ordered by priority descending, capped at `limit`.
    pub fn active_by_priority(&self, limit: usize) -> Vec<WatchlistCard> {
        let mut active: Vec<WatchlistCard> = self
            .cards
            .iter()
            .filter(|entry| entry.value().active)
            .map(|entry| entry.value().clone())
            .collect();
        active.sort_by(|a, b| b.priority_score.cmp(&a.priority_score).then(a.id.cmp(&b.id)));
        active.truncate(limit);
        active
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }
}

impl Default for CardStore {
    fn default() -> Self {
        Self {
            cards: DashMap::new(),
        }
    }
}
