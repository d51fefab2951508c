//! Deterministic hashing of view data for the change-suppression compare in
//! §4.5. Grounded on the teacher's `hash.rs`: an explicit, named hash kind
//! rather than `std::collections::hash_map::DefaultHasher`, reusing the same
//! `twox-hash` dependency the teacher uses for stable bucket hashing.
//!
//! Unlike the teacher, the kind isn't persisted anywhere (there is no
//! on-disk format here) — it exists purely so a future revision can add a
//! second `HashKind` without breaking `hash_value`'s signature.

use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

/// Stable 64-bit hash of any `Hash` value, seeded at zero. Used only to
/// detect "did this view's data change since last time", never persisted
/// and never compared across processes.
pub fn hash_value<V: Hash>(value: &V) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    value.hash(&mut hasher);
    hasher.finish()
}
