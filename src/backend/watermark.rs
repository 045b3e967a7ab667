//! Last-modified watermark tracking.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Reserved key holding the last-modified timestamp (Unix milliseconds)
pub const WATERMARK_KEY: &str = "storage_last_modified";

// == Watermark ==
/// Two views of the last-modified stamp.
///
/// `observed` is the newest stamp written or seen by this context and keeps
/// its own stamps increasing. `reconciled` is the newest durable stamp whose
/// writes are known to be in the cache; only it decides whether polling
/// has anything to pull.
#[derive(Debug, Default)]
pub struct Watermark {
    observed: AtomicI64,
    reconciled: AtomicI64,
}

impl Watermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observed(&self) -> i64 {
        self.observed.load(Ordering::SeqCst)
    }

    pub fn reconciled(&self) -> i64 {
        self.reconciled.load(Ordering::SeqCst)
    }

    /// Stamp for a new write: wall-clock milliseconds, forced strictly past
    /// anything already seen so the key only ever increases.
    pub fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let stamp = now.max(self.observed() + 1);
        self.observe(stamp);
        stamp
    }

    /// Records `stamp`; returns true when it is newer than anything seen before.
    pub fn observe(&self, stamp: i64) -> bool {
        self.observed.fetch_max(stamp, Ordering::SeqCst) < stamp
    }

    /// Records that every write up to `stamp` is in the cache.
    pub fn mark_reconciled(&self, stamp: i64) {
        self.observe(stamp);
        self.reconciled.fetch_max(stamp, Ordering::SeqCst);
    }

    /// True when durable storage holds writes the cache has not pulled.
    pub fn is_behind(&self, durable: i64) -> bool {
        durable > self.reconciled()
    }
}
