//! Test doubles used by this crate's own integration tests and exposed
//! under the `test-util` feature so downstream crates can write their own
//! engine tests without re-implementing a fake view and a recording sink.
//!
//! Grounded on the teacher's own test fixtures (in-memory `Db` instances
//! built over a `tempdir`): a minimal stand-in for the real collaborator,
//! owned by a `Mutex` so tests can mutate it from the main thread while the
//! engine reads it from worker threads.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::types::{Hint, Namespace, Parameters, UnnamespacedSig, ViewId};
use crate::view::View;

/// A fake [`View`] backed by a `namespace -> value` map. `relevant` treats
/// any hint whose namespace matches the queried namespace as relevant,
/// ignoring payload/kind — enough to drive the hint-propagation scenarios
/// without a full per-view relevance grammar.
pub struct MapView<V> {
    id: ViewId,
    data: Mutex<HashMap<Namespace, V>>,
}

impl<V> MapView<V> {
    pub fn new(id: impl Into<ViewId>, data: HashMap<Namespace, V>) -> Self {
        Self {
            id: id.into(),
            data: Mutex::new(data),
        }
    }

    /// Mutate the backing value for `namespace`, as a test would simulate a
    /// write to the underlying store.
    pub fn set(&self, namespace: Namespace, value: V) {
        self.data.lock().unwrap().insert(namespace, value);
    }
}

impl<V: Clone + Send + Sync> View<V> for MapView<V> {
    fn id(&self) -> ViewId {
        self.id.clone()
    }

    fn data(&self, namespace: &Namespace, _parameters: &Parameters) -> Result<V> {
        self.data
            .lock()
            .unwrap()
            .get(namespace)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("MapView({:?}): no data for namespace {namespace:?}", self.id))
    }

    fn relevant(&self, namespace: &Namespace, _parameters: &Parameters, hints: &HashSet<Hint>) -> Result<bool> {
        Ok(hints.iter().any(|hint| &hint.namespace == namespace))
    }
}

/// A recording `send_fn` double: every delivered `(key, sig, value)` is
/// appended to an internal log for assertions.
pub struct SinkLog<K, V> {
    sent: Mutex<Vec<(K, UnnamespacedSig, V)>>,
}

impl<K, V> Default for SinkLog<K, V> {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl<K: Clone, V: Clone> SinkLog<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &K, sig: UnnamespacedSig, value: V) -> Result<()> {
        self.sent.lock().unwrap().push((key.clone(), sig, value));
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<(K, UnnamespacedSig, V)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds an `EngineBuilder::send_fn` closure around a shared [`SinkLog`].
pub fn sink_send_fn<K, V>(
    sink: Arc<SinkLog<K, V>>,
) -> impl Fn(&K, UnnamespacedSig, V) -> Result<()> + Send + Sync + 'static
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    move |key, sig, value| sink.record(key, sig, value)
}

/// Polls `predicate` every 10ms until it returns `true` or `timeout`
/// elapses. Used in place of a fixed `thread::sleep` to keep integration
/// tests from being flaky under load.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut predicate: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}
