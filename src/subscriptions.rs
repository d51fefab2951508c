//! The subscription index (§4.2): the bidirectional `subscribed`/`subscribers`
//! maps plus the `hashes` cache, held behind one coarse lock per §5
//! ("per-field locking is not permitted because invariants 1-4 span
//! multiple fields").
//!
//! Grounded on the teacher's `SubRegistry` (`subs.rs`): a single
//! `Mutex<Inner>` owned by the engine, mutated under the lock, with
//! callback/send work done outside it.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Mutex;

use crate::types::ViewSig;

struct Inner<K> {
    subscribed: HashMap<K, HashSet<ViewSig>>,
    subscribers: HashMap<ViewSig, HashSet<K>>,
    hashes: HashMap<ViewSig, u64>,
}

impl<K> Default for Inner<K> {
    fn default() -> Self {
        Self {
            subscribed: HashMap::new(),
            subscribers: HashMap::new(),
            hashes: HashMap::new(),
        }
    }
}

/// Bidirectional subscriber<->sig index plus the last-sent-hash cache.
///
/// Invariants maintained by every method below (see SPEC_FULL.md §3):
/// 1. `k ∈ subscribed[sig] ⇔ sig ∈ subscribers[k]`
/// 2. `subscribed[k]` is removed once it would be empty
/// 3. `subscribers[sig]` and `hashes[sig]` are removed together once the
///    former would be empty
/// 4. every `hashes` key has at least one subscriber
pub struct SubscriptionIndex<K> {
    inner: Mutex<Inner<K>>,
}

impl<K: Eq + Hash + Clone> SubscriptionIndex<K> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Insert `(sig, key)` into both indices. Idempotent: subscribing the
    /// same pair twice leaves the index unchanged (set semantics), even
    /// though the caller may still schedule two independent initial sends.
    pub fn insert(&self, sig: ViewSig, key: K) {
        let mut guard = self.inner.lock().unwrap();
        guard.subscribed.entry(key.clone()).or_default().insert(sig.clone());
        guard.subscribers.entry(sig).or_default().insert(key);
    }

    /// Remove `(sig, key)`. Idempotent; unknown pairs are a no-op.
    pub fn remove(&self, sig: &ViewSig, key: &K) {
        let mut guard = self.inner.lock().unwrap();
        if let Some(sigs) = guard.subscribed.get_mut(key) {
            sigs.remove(sig);
            if sigs.is_empty() {
                guard.subscribed.remove(key);
            }
        }
        if let Some(keys) = guard.subscribers.get_mut(sig) {
            keys.remove(key);
            if keys.is_empty() {
                guard.subscribers.remove(sig);
                guard.hashes.remove(sig);
            }
        }
    }

    /// Remove every sig subscribed by `key`. Returns the removed sigs so the
    /// caller can react (e.g. drop per-sig bookkeeping it owns elsewhere).
    pub fn remove_all(&self, key: &K) -> Vec<ViewSig> {
        let mut guard = self.inner.lock().unwrap();
        let Some(sigs) = guard.subscribed.remove(key) else {
            return Vec::new();
        };
        for sig in &sigs {
            if let Some(keys) = guard.subscribers.get_mut(sig) {
                keys.remove(key);
                if keys.is_empty() {
                    guard.subscribers.remove(sig);
                    guard.hashes.remove(sig);
                }
            }
        }
        sigs.into_iter().collect()
    }

    /// True if `sig` currently has at least one subscriber. Used by the
    /// initial-refresh task to decide whether its result is still wanted.
    pub fn is_subscribed(&self, sig: &ViewSig) -> bool {
        self.inner.lock().unwrap().subscribers.contains_key(sig)
    }

    /// Snapshot of current subscribers for `sig`, taken once per refresh
    /// (§4.5): subscribers added after this call are not sent this round.
    pub fn subscribers_snapshot(&self, sig: &ViewSig) -> HashSet<K> {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .get(sig)
            .cloned()
            .unwrap_or_default()
    }

    pub fn subscribed_views(&self) -> HashSet<ViewSig> {
        let guard = self.inner.lock().unwrap();
        guard.subscribed.values().flatten().cloned().collect()
    }

    pub fn active_view_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }

    /// Drop every subscription, subscriber, and cached hash. Used by
    /// `Engine::shutdown` to reset state to empty (§5).
    pub fn clear(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.subscribed.clear();
        guard.subscribers.clear();
        guard.hashes.clear();
    }

    pub fn get_hash(&self, sig: &ViewSig) -> Option<u64> {
        self.inner.lock().unwrap().hashes.get(sig).copied()
    }

    /// Worker-path write: unconditionally records the freshly computed hash,
    /// but only if the sig still has subscribers (it may have been
    /// unsubscribed between dequeue and compute).
    pub fn set_hash(&self, sig: &ViewSig, hash: u64) {
        let mut guard = self.inner.lock().unwrap();
        if guard.subscribers.contains_key(sig) {
            guard.hashes.insert(sig.clone(), hash);
        }
    }

    /// Initial-subscribe-path write (§4.2.1): "set if absent". Never
    /// overwrites a hash a racing refresh worker already wrote, and never
    /// writes at all if the subscription is already gone.
    pub fn set_hash_if_absent(&self, sig: &ViewSig, hash: u64) {
        let mut guard = self.inner.lock().unwrap();
        if !guard.subscribers.contains_key(sig) {
            return;
        }
        guard.hashes.entry(sig.clone()).or_insert(hash);
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, sig: &ViewSig) -> usize {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .get(sig)
            .map(HashSet::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Namespace, ViewId};

    fn sig(ns: &str) -> ViewSig {
        ViewSig::new(Namespace::new(ns), ViewId::new("v"), vec![])
    }

    #[test]
    fn insert_then_remove_clears_both_sides() {
        let index: SubscriptionIndex<u64> = SubscriptionIndex::new();
        let sig = sig("a");
        index.insert(sig.clone(), 1);
        assert!(index.is_subscribed(&sig));
        assert_eq!(index.subscriber_count(&sig), 1);

        index.set_hash(&sig, 42);
        assert_eq!(index.get_hash(&sig), Some(42));

        index.remove(&sig, &1);
        assert!(!index.is_subscribed(&sig));
        assert_eq!(index.get_hash(&sig), None, "hash must be purged once the last subscriber leaves");
        assert!(index.subscribed_views().is_empty());
    }

    #[test]
    fn two_subscribers_one_leaving_keeps_the_hash() {
        let index: SubscriptionIndex<u64> = SubscriptionIndex::new();
        let sig = sig("a");
        index.insert(sig.clone(), 1);
        index.insert(sig.clone(), 2);
        index.set_hash(&sig, 7);

        index.remove(&sig, &1);

        assert_eq!(index.subscriber_count(&sig), 1);
        assert_eq!(index.get_hash(&sig), Some(7), "hash survives while a subscriber remains");
    }

    #[test]
    fn remove_all_clears_every_sig_for_a_key() {
        let index: SubscriptionIndex<u64> = SubscriptionIndex::new();
        let a = sig("a");
        let b = sig("b");
        index.insert(a.clone(), 1);
        index.insert(b.clone(), 1);

        let removed = index.remove_all(&1);

        assert_eq!(removed.len(), 2);
        assert!(index.subscribed_views().is_empty());
        assert_eq!(index.active_view_count(), 0);
    }

    #[test]
    fn set_hash_if_absent_never_overwrites_a_racing_worker_write() {
        let index: SubscriptionIndex<u64> = SubscriptionIndex::new();
        let sig = sig("a");
        index.insert(sig.clone(), 1);

        index.set_hash(&sig, 100);
        index.set_hash_if_absent(&sig, 999);

        assert_eq!(index.get_hash(&sig), Some(100));
    }

    #[test]
    fn hash_writes_are_ignored_once_unsubscribed() {
        let index: SubscriptionIndex<u64> = SubscriptionIndex::new();
        let sig = sig("a");
        index.insert(sig.clone(), 1);
        index.remove(&sig, &1);

        index.set_hash(&sig, 5);
        index.set_hash_if_absent(&sig, 6);

        assert_eq!(index.get_hash(&sig), None);
    }
}
