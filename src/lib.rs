//! A concurrent view subscription and refresh engine.
//!
//! An [`Engine`] holds a registry of [`View`] providers, a bidirectional
//! subscription index, a pending hint set, and a bounded deduplicating
//! refresh queue serviced by a worker pool. Subscribers register interest in
//! a [`ViewSig`] and receive an initial value immediately, then further
//! values whenever a [`Hint`] makes the watcher thread decide the view is
//! worth recomputing and the recomputed value actually differs from what
//! was last sent.

pub mod config;
pub mod engine;
pub mod error;
pub mod hash;
pub mod hints;
mod initial_pool;
pub mod queue;
pub mod stats;
pub mod subscriptions;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod types;
pub mod view;

pub use config::{EngineBuilder, EngineConfig, PutHintsMode};
pub use engine::{Engine, InitialRefreshHandle};
pub use error::EngineError;
pub use stats::StatsSnapshot;
pub use types::{Hint, HintKind, HintPayload, Namespace, ParamValue, Parameters, UnnamespacedSig, ViewId, ViewSig};
pub use view::View;
