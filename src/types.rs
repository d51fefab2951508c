//! Identity and value types shared across the engine: view ids, namespaces,
//! parameters, view signatures and hints.
//!
//! All of these are plain value types: equality and hashing are purely
//! structural, which is what lets [`crate::subscriptions::SubscriptionIndex`]
//! and [`crate::queue::RefreshQueue`] use them as map/set keys directly.

use std::fmt;
use std::sync::Arc;

/// Logical tenancy/partition tag a view's data is scoped to.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Namespace(Arc<str>);

impl Namespace {
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({:?})", self.0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Namespace {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Namespace {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Identifies a registered [`crate::view::View`] implementation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ViewId(Arc<str>);

impl ViewId {
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewId({:?})", self.0)
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ViewId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// One element of an ordered parameter list. Kept to hashable/comparable
/// scalars (no float) so a whole [`Parameters`] list is `Hash + Eq`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(Arc<str>),
    Bytes(Arc<[u8]>),
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(Arc::from(s))
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

/// Ordered parameter list for a view instantiation.
pub type Parameters = Vec<ParamValue>;

/// Identity tuple `(namespace, view_id, parameters)` for a concrete view
/// instantiation.
///
/// `namespace` is `None` only transiently, at the API boundary, before
/// [`crate::engine::Engine`] resolves it (see §4.2 step 1 of the design
/// notes); every sig stored internally in `subscribed`/`subscribers`/`hashes`
/// has `namespace = Some(..)`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ViewSig {
    pub namespace: Option<Namespace>,
    pub view_id: ViewId,
    pub parameters: Parameters,
}

impl ViewSig {
    pub fn new(namespace: impl Into<Namespace>, view_id: impl Into<ViewId>, parameters: Parameters) -> Self {
        Self {
            namespace: Some(namespace.into()),
            view_id: view_id.into(),
            parameters,
        }
    }

    /// A sig with no namespace yet attached; the engine will resolve one
    /// during `subscribe`/`unsubscribe`.
    pub fn unnamespaced(view_id: impl Into<ViewId>, parameters: Parameters) -> Self {
        Self {
            namespace: None,
            view_id: view_id.into(),
            parameters,
        }
    }

    pub fn with_namespace(&self, namespace: Namespace) -> Self {
        Self {
            namespace: Some(namespace),
            view_id: self.view_id.clone(),
            parameters: self.parameters.clone(),
        }
    }

    /// The payload handed to `send_fn`: the sig stripped of its namespace,
    /// since a subscriber already knows which namespace it asked for.
    pub fn without_namespace(&self) -> UnnamespacedSig {
        UnnamespacedSig {
            view_id: self.view_id.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

impl fmt::Debug for ViewSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewSig")
            .field("namespace", &self.namespace)
            .field("view_id", &self.view_id)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// A [`ViewSig`] with its namespace stripped, as delivered to subscribers.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct UnnamespacedSig {
    pub view_id: ViewId,
    pub parameters: Parameters,
}

/// The kind tag on a [`Hint`], interpreted only by views via `relevant`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum HintKind {
    /// A change observed directly in backing storage.
    Storage,
    /// A change inferred from an in-memory write path.
    Memory,
    /// An application-defined kind, named by the caller.
    Custom(Arc<str>),
}

/// Opaque hint payload. Closed over a few common shapes rather than made
/// generic: the engine never inspects it, only `relevant` does, so a small
/// enum of scalar/keyed/binary shapes covers real callers without forcing a
/// fourth generic parameter onto [`crate::engine::Engine`].
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum HintPayload {
    Tag(Arc<str>),
    Keyed(Arc<str>, Arc<str>),
    Bytes(Arc<[u8]>),
}

impl From<&str> for HintPayload {
    fn from(s: &str) -> Self {
        HintPayload::Tag(Arc::from(s))
    }
}

/// Change notification `(namespace, payload, kind)`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Hint {
    pub namespace: Namespace,
    pub payload: HintPayload,
    pub kind: HintKind,
}

impl Hint {
    pub fn new(namespace: impl Into<Namespace>, payload: impl Into<HintPayload>, kind: HintKind) -> Self {
        Self {
            namespace: namespace.into(),
            payload: payload.into(),
            kind,
        }
    }
}
