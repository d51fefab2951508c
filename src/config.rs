//! Engine configuration and builder (§6).
//!
//! Grounded on the teacher's `config.rs`: a plain `from_env()` loader layered
//! under a fluent builder, `VIEWS_*` replacing the teacher's `P1_*` prefix.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;
use crate::types::{Namespace, ViewSig};
use crate::view::View;

/// Policy for `put_hints` (§4.3): either refresh immediately on the calling
/// thread's behalf, or park the hints for the watcher's next pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutHintsMode {
    /// Run a synchronous relevance-and-enqueue pass before `put_hints`
    /// returns.
    Immediate,
    /// Merge into the hint set; the watcher thread picks it up on its next
    /// `refresh_interval` tick.
    Batched,
}

pub(crate) type SendFn<K, V> =
    Arc<dyn Fn(&K, crate::types::UnnamespacedSig, V) -> anyhow::Result<()> + Send + Sync>;
pub(crate) type AuthFn<K, C> = Arc<dyn Fn(&ViewSig, &K, &C) -> bool + Send + Sync>;
pub(crate) type OnUnauthFn<K, C> = Arc<dyn Fn(&ViewSig, &K, &C) + Send + Sync>;
pub(crate) type NamespaceFn<K, C> =
    Arc<dyn Fn(&ViewSig, &K, &C) -> Option<Namespace> + Send + Sync>;

/// Tunable knobs, independent of the generic callback types (§6 table).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Env: `VIEWS_REFRESH_QUEUE_SIZE` (default 1000).
    pub refresh_queue_size: usize,
    /// Env: `VIEWS_REFRESH_INTERVAL_MS` (default 1000).
    pub refresh_interval: Duration,
    /// Env: `VIEWS_WORKER_THREADS` (default 8).
    pub worker_threads: usize,
    /// Size of the bounded pool that runs initial-subscribe computes, kept
    /// independent of `worker_threads` so a burst of subscribes cannot
    /// starve the refresh workers (§5). Env: `VIEWS_INITIAL_REFRESH_THREADS`
    /// (default 4).
    pub initial_refresh_threads: usize,
    /// Env: `VIEWS_STATS_LOG_INTERVAL_MS`. `None` disables stats collection
    /// and the periodic logger.
    pub stats_log_interval_ms: Option<u64>,
    pub put_hints_mode: Option<PutHintsMode>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_queue_size: 1000,
            refresh_interval: Duration::from_millis(1000),
            worker_threads: 8,
            initial_refresh_threads: 4,
            stats_log_interval_ms: None,
            put_hints_mode: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// [`EngineConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("VIEWS_REFRESH_QUEUE_SIZE") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.refresh_queue_size = n;
            }
        }

        if let Ok(v) = std::env::var("VIEWS_REFRESH_INTERVAL_MS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.refresh_interval = Duration::from_millis(n);
            }
        }

        if let Ok(v) = std::env::var("VIEWS_WORKER_THREADS") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.worker_threads = n;
            }
        }

        if let Ok(v) = std::env::var("VIEWS_INITIAL_REFRESH_THREADS") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.initial_refresh_threads = n;
            }
        }

        if let Ok(v) = std::env::var("VIEWS_STATS_LOG_INTERVAL_MS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.stats_log_interval_ms = Some(n);
            }
        }

        cfg
    }

    pub fn with_refresh_queue_size(mut self, n: usize) -> Self {
        self.refresh_queue_size = n;
        self
    }

    pub fn with_refresh_interval(mut self, d: Duration) -> Self {
        self.refresh_interval = d;
        self
    }

    pub fn with_worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n;
        self
    }

    pub fn with_initial_refresh_threads(mut self, n: usize) -> Self {
        self.initial_refresh_threads = n;
        self
    }

    pub fn with_stats_log_interval_ms(mut self, ms: Option<u64>) -> Self {
        self.stats_log_interval_ms = ms;
        self
    }

    pub fn with_put_hints_mode(mut self, mode: PutHintsMode) -> Self {
        self.put_hints_mode = Some(mode);
        self
    }
}

/// Builds an [`Engine`](crate::engine::Engine). Starts from
/// [`EngineConfig::from_env`] so callers get the env overrides for free,
/// then layers explicit setters and the required callbacks on top.
pub struct EngineBuilder<V, K, C> {
    pub(crate) config: EngineConfig,
    pub(crate) views: Vec<Arc<dyn View<V>>>,
    pub(crate) send_fn: Option<SendFn<K, V>>,
    pub(crate) auth_fn: Option<AuthFn<K, C>>,
    pub(crate) on_unauth_fn: Option<OnUnauthFn<K, C>>,
    pub(crate) namespace_fn: Option<NamespaceFn<K, C>>,
}

impl<V, K, C> Default for EngineBuilder<V, K, C> {
    fn default() -> Self {
        Self {
            config: EngineConfig::from_env(),
            views: Vec::new(),
            send_fn: None,
            auth_fn: None,
            on_unauth_fn: None,
            namespace_fn: None,
        }
    }
}

impl<V, K, C> EngineBuilder<V, K, C>
where
    V: Hash + Clone + Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default configuration instead of the environment.
    pub fn from_default_config() -> Self {
        Self {
            config: EngineConfig::default(),
            views: Vec::new(),
            send_fn: None,
            auth_fn: None,
            on_unauth_fn: None,
            namespace_fn: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn views(mut self, views: Vec<Arc<dyn View<V>>>) -> Self {
        self.views = views;
        self
    }

    pub fn put_hints_mode(mut self, mode: PutHintsMode) -> Self {
        self.config.put_hints_mode = Some(mode);
        self
    }

    pub fn send_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, crate::types::UnnamespacedSig, V) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.send_fn = Some(Arc::new(f));
        self
    }

    pub fn auth_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&ViewSig, &K, &C) -> bool + Send + Sync + 'static,
    {
        self.auth_fn = Some(Arc::new(f));
        self
    }

    pub fn on_unauth_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&ViewSig, &K, &C) + Send + Sync + 'static,
    {
        self.on_unauth_fn = Some(Arc::new(f));
        self
    }

    pub fn namespace_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&ViewSig, &K, &C) -> Option<Namespace> + Send + Sync + 'static,
    {
        self.namespace_fn = Some(Arc::new(f));
        self
    }

    /// Validates required fields (§7: `NotConfigured`) and constructs the
    /// engine, starting its threads.
    pub fn build(self) -> Result<crate::engine::Engine<V, K, C>, EngineError> {
        if self.config.refresh_queue_size == 0 {
            return Err(EngineError::InvalidConfig(
                "refresh_queue_size must be greater than 0",
            ));
        }
        let send_fn = self
            .send_fn
            .ok_or(EngineError::NotConfigured("send_fn"))?;
        let put_hints_mode = self
            .config
            .put_hints_mode
            .ok_or(EngineError::NotConfigured("put_hints_mode"))?;
        Ok(crate::engine::Engine::start(
            self.config,
            put_hints_mode,
            self.views,
            send_fn,
            self.auth_fn,
            self.on_unauth_fn,
            self.namespace_fn,
        ))
    }
}
