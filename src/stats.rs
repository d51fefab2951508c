//! Engine-scoped statistics (§4.7).
//!
//! Grounded on the teacher's `metrics.rs`: plain atomics, snapshot-and-reset
//! semantics for the periodic logger. Unlike the teacher, these counters are
//! owned per-`Engine` instance rather than process-global statics, per the
//! placement decision recorded in DESIGN.md.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Point-in-time snapshot of the three counters, used by the stats logger
/// and by tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub refreshes: u64,
    pub dropped: u64,
    pub deduplicated: u64,
}

/// `refreshes` / `dropped` / `deduplicated` counters, gated by a single
/// `collecting` predicate (§4.7): when stats logging isn't enabled, the
/// increments are skipped entirely rather than paying for atomics nobody
/// reads.
#[derive(Default)]
pub struct Statistics {
    collecting: AtomicBool,
    refreshes: AtomicU64,
    dropped: AtomicU64,
    deduplicated: AtomicU64,
}

impl Statistics {
    pub fn new(collecting: bool) -> Self {
        Self {
            collecting: AtomicBool::new(collecting),
            ..Default::default()
        }
    }

    #[inline]
    pub fn collecting(&self) -> bool {
        self.collecting.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn inc_refreshes(&self) {
        if self.collecting() {
            self.refreshes.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn inc_dropped(&self) {
        if self.collecting() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn inc_deduplicated(&self) {
        if self.collecting() {
            self.deduplicated.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot-and-reset: used by the periodic logger to compute rates.
    pub fn take_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            refreshes: self.refreshes.swap(0, Ordering::Relaxed),
            dropped: self.dropped.swap(0, Ordering::Relaxed),
            deduplicated: self.deduplicated.swap(0, Ordering::Relaxed),
        }
    }

    /// Read-only snapshot without resetting, for tests that want to observe
    /// counters without disturbing the next logger tick.
    pub fn peek(&self) -> StatsSnapshot {
        StatsSnapshot {
            refreshes: self.refreshes.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter. Used by `Engine::shutdown` to reset state to
    /// empty (§5).
    pub fn reset(&self) {
        self.refreshes.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.deduplicated.store(0, Ordering::Relaxed);
    }
}
