//! Sync Statistics Module
//!
//! Tracks persistence and cross-context synchronization activity.

use serde::Serialize;

// == Sync Stats ==
/// Counters for one execution context.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    /// Values successfully persisted
    pub writes: u64,
    /// Persistence attempts that failed
    pub write_failures: u64,
    /// Completed reconciliation pulls
    pub reconciles: u64,
    /// Remote notifications acted upon
    pub notifications_received: u64,
    /// Self-originated notifications skipped
    pub notifications_ignored: u64,
    /// Polling fallback ticks
    pub polls: u64,
    /// Polls that found a newer watermark
    pub poll_refreshes: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl SyncStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Write Success Rate ==
    /// Returns writes / (writes + failures), or 1.0 if nothing was written yet.
    pub fn write_success_rate(&self) -> f64 {
        let total = self.writes + self.write_failures;
        if total == 0 {
            1.0
        } else {
            self.writes as f64 / total as f64
        }
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_write_failure(&mut self) {
        self.write_failures += 1;
    }

    pub fn record_reconcile(&mut self) {
        self.reconciles += 1;
    }

    pub fn record_notification(&mut self, is_remote: bool) {
        if is_remote {
            self.notifications_received += 1;
        } else {
            self.notifications_ignored += 1;
        }
    }

    pub fn record_poll(&mut self, refreshed: bool) {
        self.polls += 1;
        if refreshed {
            self.poll_refreshes += 1;
        }
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
