//! The view registry (§4.1): maps a [`ViewId`] to its provider.
//!
//! Grounded on the teacher's `Directory` (a small map-like registry swapped
//! atomically on mutation) and `SubRegistry` (a `Mutex`-protected map owned
//! by the engine, not the caller).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::types::{Namespace, Parameters, ViewId};
use crate::types::Hint;
use std::collections::HashSet;

/// An external data provider backing one or more view signatures.
///
/// `data` and `relevant` are called from worker/watcher threads and must be
/// `Send + Sync`; `relevant` must be pure with respect to its inputs.
pub trait View<V>: Send + Sync {
    /// Stable identity used as the registry key.
    fn id(&self) -> ViewId;

    /// Compute the current value for `(namespace, parameters)`.
    fn data(&self, namespace: &Namespace, parameters: &Parameters) -> Result<V>;

    /// Is this view instantiation affected by any hint in `hints`?
    fn relevant(&self, namespace: &Namespace, parameters: &Parameters, hints: &HashSet<Hint>) -> Result<bool>;
}

/// Maps view-id -> provider. Insert/replace is atomic with respect to
/// readers: the whole map is held behind one lock, so a reader never
/// observes a torn replacement.
pub struct ViewRegistry<V> {
    views: Mutex<HashMap<ViewId, Arc<dyn View<V>>>>,
}

impl<V> ViewRegistry<V> {
    pub fn new(initial: Vec<Arc<dyn View<V>>>) -> Self {
        let mut views = HashMap::with_capacity(initial.len());
        for view in initial {
            views.insert(view.id(), view);
        }
        Self {
            views: Mutex::new(views),
        }
    }

    /// Insert or replace entries by `view.id()`.
    pub fn add_views(&self, views: Vec<Arc<dyn View<V>>>) {
        let mut guard = self.views.lock().unwrap();
        for view in views {
            guard.insert(view.id(), view);
        }
    }

    pub fn get_view(&self, view_id: &ViewId) -> Option<Arc<dyn View<V>>> {
        self.views.lock().unwrap().get(view_id).cloned()
    }

    pub fn contains(&self, view_id: &ViewId) -> bool {
        self.views.lock().unwrap().contains_key(view_id)
    }
}
