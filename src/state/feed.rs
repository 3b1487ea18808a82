//! The published opportunity list.
//!
//! Opportunities are rebuilt from scratch each scan, so the feed is a
//! snapshot-replace: the scanner publishes a whole ranked list, API readers
//! clone an Arc. No per-item mutation ever happens.

use std::sync::{Arc, RwLock};

use crate::types::Opportunity;

#[derive(Default)]
pub struct OpportunityFeed {
    ranked: RwLock<Arc<Vec<Opportunity>>>,
}

impl OpportunityFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, opportunities: Vec<Opportunity>) {
        if let Ok(mut guard) = self.ranked.write() {
            *guard = Arc::new(opportunities);
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<Opportunity>> {
        self.ranked
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
