//! Request pacing against the marketplace's usage policy.
//!
//! The scan and collection loops are paced card-by-card through one shared
//! token bucket, so "how many requests per second" is a policy handed to the
//! aggregator rather than sleeps scattered through control flow.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use nonzero_ext::nonzero;

type GovernorLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// One permit per watchlist card (each card costs a burst of three channel
/// queries, so the card is the natural pacing unit).
#[derive(Clone)]
pub struct CardRateLimiter {
    inner: Arc<GovernorLimiter>,
}

impl CardRateLimiter {
    /// A limiter releasing one card every `period_ms` milliseconds.
    pub fn new(period_ms: u64) -> Self {
        let period = Duration::from_millis(period_ms.max(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)))
            .allow_burst(NonZeroU32::new(1).expect("1 > 0"));
        Self {
            inner: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Wait until the next card may start.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn first_permit_is_immediate() {
        let limiter = CardRateLimiter::new(600);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn second_permit_waits_a_period() {
        let limiter = CardRateLimiter::new(100);
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(
            start.elapsed() >= Duration::from_millis(80),
            "second permit arrived after only {:?}",
            start.elapsed()
        );
    }
}
