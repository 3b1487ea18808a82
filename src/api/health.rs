//! Shared health state for the /health endpoint.
//! Updated by the scanner and collector tasks, read by the API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared health metrics plus in-flight guards for the long-running tasks.
#[derive(Default)]
pub struct HealthState {
    /// Unix seconds of the last completed scan (0 = none yet).
    pub last_scan_at_secs: AtomicU64,
    /// Opportunity count published by the last scan.
    pub last_scan_count: AtomicU64,
    scan_running: AtomicBool,
    /// Unix seconds of the last completed collection run (0 = none yet).
    pub last_collect_at_secs: AtomicU64,
    collect_running: AtomicBool,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the scan slot. Returns false if a scan is already in flight.
    pub fn begin_scan(&self) -> bool {
        self.scan_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_scan(&self, now_secs: u64, count: usize) {
        self.last_scan_at_secs.store(now_secs, Ordering::Relaxed);
        self.last_scan_count.store(count as u64, Ordering::Relaxed);
        self.scan_running.store(false, Ordering::SeqCst);
    }

    pub fn scan_running(&self) -> bool {
        self.scan_running.load(Ordering::SeqCst)
    }

    /// Claim the collection slot. Returns false if a run is already in flight.
    pub fn begin_collect(&self) -> bool {
        self.collect_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_collect(&self, now_secs: u64) {
        self.last_collect_at_secs.store(now_secs, Ordering::Relaxed);
        self.collect_running.store(false, Ordering::SeqCst);
    }

    pub fn collect_running(&self) -> bool {
        self.collect_running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_slot_is_exclusive() {
        let health = HealthState::new();
        assert!(health.begin_scan());
        assert!(!health.begin_scan(), "second claim must fail while running");
        health.end_scan(100, 7);
        assert!(!health.scan_running());
        assert_eq!(health.last_scan_count.load(Ordering::Relaxed), 7);
        assert!(health.begin_scan());
    }
}
