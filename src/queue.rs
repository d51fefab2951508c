//! The bounded, deduplicating refresh queue (§4.4).
//!
//! `contains` and `offer` are intentionally not atomic with respect to each
//! other across producers — a rare duplicate reaching the queue is harmless
//! because the worker's hash comparison (§4.5) makes the second pop a no-op.
//! This mirrors the teacher's acceptance of best-effort, not perfect,
//! coordination at non-critical points (e.g. the lazy-compaction threshold
//! check in `db/maintenance.rs`, which tolerates a stale read).

use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::EngineError;
use crate::stats::Statistics;

struct Inner<T> {
    order: VecDeque<T>,
    members: HashSet<T>,
}

/// A bounded FIFO of `T` (typically [`crate::types::ViewSig`]) with
/// set-semantics deduplication and drop-newest-on-full backpressure.
pub struct RefreshQueue<T> {
    capacity: usize,
    state: Mutex<Inner<T>>,
    not_empty: Condvar,
}

impl<T: Eq + Hash + Clone + Debug> RefreshQueue<T> {
    /// `capacity` must be greater than zero. `EngineBuilder::build` validates
    /// this ahead of time and returns `EngineError::InvalidConfig` instead of
    /// reaching this assertion; it remains as a last-resort invariant for
    /// other callers of this type.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "refresh_queue_size must be > 0");
        Self {
            capacity,
            state: Mutex::new(Inner {
                order: VecDeque::with_capacity(capacity.min(1024)),
                members: HashSet::with_capacity(capacity.min(1024)),
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Offer `item` for processing. See §4.4 for the exact decision tree.
    pub fn offer(&self, item: T, stats: &Statistics) {
        let mut guard = self.state.lock().unwrap();
        if guard.members.contains(&item) {
            stats.inc_deduplicated();
            log::debug!("{}", EngineError::Duplicate(format!("{item:?}")));
            return;
        }
        if guard.order.len() >= self.capacity {
            stats.inc_dropped();
            log::warn!("{}", EngineError::QueueFull(format!("{item:?}")));
            return;
        }
        guard.members.insert(item.clone());
        guard.order.push_back(item);
        self.not_empty.notify_one();
    }

    /// Blocks for up to `timeout`, returning `None` if nothing arrived or if
    /// `stop_requested` is observed set after a wakeup — this is what lets
    /// `shutdown`'s `Condvar::notify_all` return a blocked worker
    /// immediately instead of waiting out the full 60s timeout (§5).
    pub fn poll(&self, timeout: Duration, stop_requested: &AtomicBool) -> Option<T> {
        let mut guard = self.state.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = guard.order.pop_front() {
                guard.members.remove(&item);
                return Some(item);
            }
            if stop_requested.load(Ordering::Acquire) {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (g, timeout_result) = self
                .not_empty
                .wait_timeout(guard, deadline - now)
                .unwrap();
            guard = g;
            if timeout_result.timed_out() && guard.order.is_empty() {
                return None;
            }
        }
    }

    /// Wakes any thread blocked in `poll` without requiring an item — used
    /// by `shutdown` so workers don't wait out their full 60s timeout.
    pub fn notify_all(&self) {
        self.not_empty.notify_all();
    }

    /// Drop every pending item. Used by `Engine::shutdown` to reset state to
    /// empty (§5).
    pub fn clear(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.order.clear();
        guard.members.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().order.len()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<T> {
        self.state.lock().unwrap().order.iter().cloned().collect()
    }
}
