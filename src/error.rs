//! Typed error surface (§7). Most of the kinds below are never returned to a
//! caller — they are constructed, logged, and swallowed internally (see
//! [`crate::engine`], [`crate::queue`]) — but are kept public so test code can
//! match on them rather than scraping log output.

use crate::types::ViewSig;

/// Errors the engine can raise or log.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// `subscribe` referenced a view id that isn't in the registry. The only
    /// variant that is ever propagated to the caller of a public method.
    #[error("unknown view id: {0}")]
    UnknownView(crate::types::ViewId),

    /// `EngineBuilder::build()` was missing a required option.
    #[error("engine not configured: {0}")]
    NotConfigured(&'static str),

    /// `EngineBuilder::build()` was given a structurally invalid config
    /// value (e.g. `refresh_queue_size == 0`).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// `view.data` or `view.relevant` returned an error. Logged and
    /// swallowed; never returned to a caller.
    #[error("view provider error for {sig:?}: {source}")]
    ProviderError {
        sig: ViewSig,
        #[source]
        source: anyhow::Error,
    },

    /// `send_fn` returned an error. Logged and swallowed; other subscribers
    /// for the same sig still receive the payload.
    #[error("send failed for {sig:?}: {source}")]
    SendError {
        sig: ViewSig,
        #[source]
        source: anyhow::Error,
    },

    /// The refresh queue was full at `offer` time. Counted in
    /// `Statistics::dropped`, never returned to a caller. Holds the dropped
    /// item's `Debug` form rather than a `ViewSig` directly, since
    /// `RefreshQueue<T>` is generic over its item type.
    #[error("refresh queue full, dropping {0}")]
    QueueFull(String),

    /// The refresh queue already held this item at `offer` time. Counted in
    /// `Statistics::deduplicated`, never returned to a caller.
    #[error("refresh queue already holds {0}")]
    Duplicate(String),
}
