//! The hint set (§4.3): a deduplicated, atomically-drained pending set.
//!
//! Grounded on the teacher's `SubRegistry` (a single `Mutex<T>` holding the
//! whole collection; mutations take the lock, do the work, and drop it).

use std::collections::HashSet;
use std::sync::Mutex;

use crate::types::Hint;

/// Pending-invalidation set. `queue_hints` merges (set union); `drain_hints`
/// is the only legitimate reader and resets the set to empty atomically.
#[derive(Default)]
pub struct HintSet {
    inner: Mutex<HashSet<Hint>>,
}

impl HintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_hints(&self, hints: impl IntoIterator<Item = Hint>) {
        let mut guard = self.inner.lock().unwrap();
        guard.extend(hints);
    }

    /// Atomically takes the current set and resets it to empty.
    pub fn drain_hints(&self) -> HashSet<Hint> {
        let mut guard = self.inner.lock().unwrap();
        std::mem::take(&mut *guard)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Drop every pending hint. Used by `Engine::shutdown` to reset state to
    /// empty (§5).
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}
