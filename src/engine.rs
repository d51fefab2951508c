//! The engine: wires the view registry, subscription index, hint set,
//! refresh queue, worker pool, watcher and optional stats logger together
//! (§4, §5).
//!
//! Grounded on the teacher's `Db` (top-level owner of WAL/pager/cache state
//! plus its background threads, exposing `open`/`close`) for the shape of
//! "one struct owns all shared state behind an `Arc`, spawns its own
//! threads, exposes a single entry point and a single shutdown."

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{AuthFn, EngineBuilder, EngineConfig, NamespaceFn, OnUnauthFn, PutHintsMode, SendFn};
use crate::error::EngineError;
use crate::hash::hash_value;
use crate::hints::HintSet;
use crate::initial_pool::InitialPool;
use crate::queue::RefreshQueue;
use crate::stats::{StatsSnapshot, Statistics};
use crate::subscriptions::SubscriptionIndex;
use crate::types::{Hint, ViewSig};
use crate::view::{View, ViewRegistry};

/// Completion signal for the asynchronous initial refresh spawned by
/// `subscribe` (§4.2 step 5). Ready once the compute has finished, whether
/// it resulted in a send or was silently discarded. Production callers can
/// drop it; tests use it to wait deterministically instead of sleeping.
pub struct InitialRefreshHandle {
    rx: mpsc::Receiver<()>,
}

impl InitialRefreshHandle {
    /// Blocks until the initial refresh completes.
    pub fn wait(self) {
        let _ = self.rx.recv();
    }

    /// Blocks up to `timeout`; returns `true` if the refresh completed in
    /// time.
    pub fn wait_timeout(self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }
}

struct Shared<V, K, C> {
    registry: ViewRegistry<V>,
    index: SubscriptionIndex<K>,
    hints: HintSet,
    queue: RefreshQueue<ViewSig>,
    stats: Statistics,
    config: EngineConfig,
    put_hints_mode: PutHintsMode,
    send_fn: SendFn<K, V>,
    auth_fn: Option<AuthFn<K, C>>,
    on_unauth_fn: Option<OnUnauthFn<K, C>>,
    namespace_fn: Option<NamespaceFn<K, C>>,
    stop: AtomicBool,
}

/// The concurrent view subscription and refresh engine.
///
/// Generic over the view payload `V`, the caller-opaque subscriber key `K`,
/// and a pass-through context `C` threaded into `auth_fn`, `on_unauth_fn`
/// and `namespace_fn`.
pub struct Engine<V, K, C> {
    shared: Arc<Shared<V, K, C>>,
    initial_pool: Arc<InitialPool>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    watcher_handle: Mutex<Option<JoinHandle<()>>>,
    stats_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<V, K, C> Engine<V, K, C>
where
    V: Hash + Clone + Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    pub fn builder() -> EngineBuilder<V, K, C> {
        EngineBuilder::new()
    }

    pub(crate) fn start(
        config: EngineConfig,
        put_hints_mode: PutHintsMode,
        views: Vec<Arc<dyn View<V>>>,
        send_fn: SendFn<K, V>,
        auth_fn: Option<AuthFn<K, C>>,
        on_unauth_fn: Option<OnUnauthFn<K, C>>,
        namespace_fn: Option<NamespaceFn<K, C>>,
    ) -> Self {
        let stats = Statistics::new(config.stats_log_interval_ms.is_some());
        let queue = RefreshQueue::new(config.refresh_queue_size);
        let worker_threads = config.worker_threads;
        let initial_threads = config.initial_refresh_threads;
        let stats_interval_ms = config.stats_log_interval_ms;

        let shared = Arc::new(Shared {
            registry: ViewRegistry::new(views),
            index: SubscriptionIndex::new(),
            hints: HintSet::new(),
            queue,
            stats,
            config,
            put_hints_mode,
            send_fn,
            auth_fn,
            on_unauth_fn,
            namespace_fn,
            stop: AtomicBool::new(false),
        });

        let initial_pool = InitialPool::start(initial_threads);

        let worker_handles = (0..worker_threads)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(shared))
            })
            .collect();

        let watcher_handle = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || watcher_loop(shared))
        };

        let stats_handle = stats_interval_ms.map(|ms| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || stats_loop(shared, Duration::from_millis(ms)))
        });

        log::info!(
            "engine started: worker_threads={}, initial_refresh_threads={}, refresh_queue_size={}, refresh_interval={:?}",
            worker_threads,
            initial_threads,
            shared.config.refresh_queue_size,
            shared.config.refresh_interval,
        );

        Self {
            shared,
            initial_pool,
            worker_handles: Mutex::new(worker_handles),
            watcher_handle: Mutex::new(Some(watcher_handle)),
            stats_handle: Mutex::new(stats_handle),
        }
    }

    /// Register or replace view providers by id (§4.1).
    pub fn add_views(&self, views: Vec<Arc<dyn View<V>>>) {
        self.shared.registry.add_views(views);
    }

    /// Subscribe `key` to `view_sig`, returning a handle that completes when
    /// the initial refresh finishes, or `Ok(None)` if `auth_fn` rejected the
    /// request (§4.2). Fails only on an unknown view id.
    pub fn subscribe(
        &self,
        view_sig: ViewSig,
        key: K,
        context: C,
    ) -> Result<Option<InitialRefreshHandle>, EngineError> {
        let sig = self.resolve_namespace(view_sig, &key, &context);

        if !self.shared.registry.contains(&sig.view_id) {
            return Err(EngineError::UnknownView(sig.view_id.clone()));
        }

        if let Some(auth_fn) = &self.shared.auth_fn {
            if !auth_fn(&sig, &key, &context) {
                if let Some(on_unauth) = &self.shared.on_unauth_fn {
                    on_unauth(&sig, &key, &context);
                }
                return Ok(None);
            }
        }

        self.shared.index.insert(sig.clone(), key.clone());

        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        self.initial_pool.submit(Box::new(move || {
            run_initial_refresh(&shared, &sig, &key);
            let _ = tx.send(());
        }));

        Ok(Some(InitialRefreshHandle { rx }))
    }

    /// Unsubscribe `key` from `view_sig`. Idempotent; unknown pairs are a
    /// no-op (§4.2).
    pub fn unsubscribe(&self, view_sig: ViewSig, key: K, context: C) {
        let sig = self.resolve_namespace(view_sig, &key, &context);
        self.shared.index.remove(&sig, &key);
    }

    /// Unsubscribe `key` from every sig it holds (§4.2).
    pub fn unsubscribe_all(&self, key: &K) {
        self.shared.index.remove_all(key);
    }

    pub fn subscribed_views(&self) -> HashSet<ViewSig> {
        self.shared.index.subscribed_views()
    }

    pub fn active_view_count(&self) -> usize {
        self.shared.index.active_view_count()
    }

    /// Read-only snapshot of the refresh/dropped/deduplicated counters,
    /// without resetting them (§4.7). Empty unless `stats_log_interval_ms`
    /// was configured.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.peek()
    }

    /// External entry point for change notification (§4.3): dispatches per
    /// `put_hints_mode`.
    pub fn put_hints(&self, hints: impl IntoIterator<Item = Hint>) {
        self.shared.hints.queue_hints(hints);
        if self.shared.put_hints_mode == PutHintsMode::Immediate {
            refresh_pass(&self.shared);
        }
    }

    /// Resolve the effective namespace for a sig that may not carry one yet
    /// (§4.2 step 1). Used identically by `subscribe` and `unsubscribe` so
    /// that `namespace_fn` locates the same stored sig both times.
    fn resolve_namespace(&self, view_sig: ViewSig, key: &K, context: &C) -> ViewSig {
        if view_sig.namespace.is_some() {
            return view_sig;
        }
        let resolved = self
            .shared
            .namespace_fn
            .as_ref()
            .and_then(|f| f(&view_sig, key, context));
        match resolved {
            Some(namespace) => view_sig.with_namespace(namespace),
            None => view_sig,
        }
    }

    /// Request shutdown. Flips the stop flag and wakes every blocked
    /// thread; if `wait` is true, joins each thread before returning (§5
    /// Cancellation). Inflight `view.data` calls are not forcibly canceled.
    ///
    /// Resets all engine state to empty (§5): after this call,
    /// `subscribed_views()`, `active_view_count()` and `stats()` all read as
    /// if the engine were freshly built.
    pub fn shutdown(&self, wait: bool) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.queue.notify_all();
        self.initial_pool.shutdown(wait);

        if wait {
            if let Some(handle) = self.watcher_handle.lock().unwrap().take() {
                let _ = handle.join();
            }
            if let Some(handle) = self.stats_handle.lock().unwrap().take() {
                let _ = handle.join();
            }
            for handle in self.worker_handles.lock().unwrap().drain(..) {
                let _ = handle.join();
            }
        }

        self.shared.index.clear();
        self.shared.hints.clear();
        self.shared.queue.clear();
        self.shared.stats.reset();

        log::info!("engine shutdown requested (wait={wait})");
    }
}

fn run_initial_refresh<V, K, C>(shared: &Arc<Shared<V, K, C>>, sig: &ViewSig, key: &K)
where
    V: Hash + Clone + Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    if !shared.index.is_subscribed(sig) {
        return;
    }
    let Some(namespace) = &sig.namespace else {
        log::warn!("initial refresh sig missing namespace: {sig:?}");
        return;
    };
    let Some(view) = shared.registry.get_view(&sig.view_id) else {
        log::warn!("view vanished for {sig:?} during initial refresh");
        return;
    };
    let vdata = match view.data(namespace, &sig.parameters) {
        Ok(v) => v,
        Err(source) => {
            log::warn!("{}", EngineError::ProviderError { sig: sig.clone(), source });
            return;
        }
    };
    if !shared.index.is_subscribed(sig) {
        return;
    }
    let h = hash_value(&vdata);
    shared.index.set_hash_if_absent(sig, h);
    if let Err(source) = (shared.send_fn)(key, sig.without_namespace(), vdata) {
        log::warn!("{}", EngineError::SendError { sig: sig.clone(), source });
    }
}

fn worker_loop<V, K, C>(shared: Arc<Shared<V, K, C>>)
where
    V: Hash + Clone + Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    loop {
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        let sig = match shared.queue.poll(Duration::from_secs(60), &shared.stop) {
            Some(sig) => sig,
            None => continue,
        };
        shared.stats.inc_refreshes();
        let Some(view) = shared.registry.get_view(&sig.view_id) else {
            log::warn!("view vanished for {sig:?}");
            continue;
        };
        let Some(namespace) = &sig.namespace else {
            log::warn!("refresh sig missing namespace: {sig:?}");
            continue;
        };
        let vdata = match view.data(namespace, &sig.parameters) {
            Ok(v) => v,
            Err(source) => {
                log::warn!("{}", EngineError::ProviderError { sig: sig.clone(), source });
                continue;
            }
        };
        let h = hash_value(&vdata);
        if shared.index.get_hash(&sig) == Some(h) {
            continue;
        }
        for key in shared.index.subscribers_snapshot(&sig) {
            if let Err(source) = (shared.send_fn)(&key, sig.without_namespace(), vdata.clone()) {
                log::warn!("{}", EngineError::SendError { sig: sig.clone(), source });
            }
        }
        shared.index.set_hash(&sig, h);
    }
    log::debug!("worker thread exiting");
}

fn watcher_loop<V, K, C>(shared: Arc<Shared<V, K, C>>)
where
    V: Hash + Clone + Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    let mut last_update = Instant::now();
    loop {
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        let elapsed = last_update.elapsed();
        if elapsed >= shared.config.refresh_interval {
            refresh_pass(&shared);
            last_update = Instant::now();
        } else {
            sleep_checking_stop(shared.config.refresh_interval - elapsed, &shared.stop);
        }
    }
    log::debug!("watcher thread exiting");
}

/// One relevance-testing-and-enqueue pass (§4.6): drains the hint set and,
/// for every currently subscribed sig whose view finds it relevant,
/// schedules a refresh. Shared between the watcher's periodic tick and
/// `put_hints`'s `Immediate` mode.
fn refresh_pass<V, K, C>(shared: &Arc<Shared<V, K, C>>)
where
    V: Hash + Clone + Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    let hints = shared.hints.drain_hints();
    if hints.is_empty() {
        return;
    }
    for sig in shared.index.subscribed_views() {
        let Some(view) = shared.registry.get_view(&sig.view_id) else {
            continue;
        };
        let Some(namespace) = &sig.namespace else {
            continue;
        };
        match view.relevant(namespace, &sig.parameters, &hints) {
            Ok(true) => shared.queue.offer(sig, &shared.stats),
            Ok(false) => {}
            Err(source) => log::warn!("{}", EngineError::ProviderError { sig: sig.clone(), source }),
        }
    }
}

fn stats_loop<V, K, C>(shared: Arc<Shared<V, K, C>>, interval: Duration)
where
    V: Hash + Clone + Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    loop {
        sleep_checking_stop(interval, &shared.stop);
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        let snapshot = shared.stats.take_snapshot();
        let secs = interval.as_secs_f64().max(0.001);
        log::info!(
            "stats: refreshes={:.1}/s dropped={:.1}/s deduplicated={:.1}/s active_views={}",
            snapshot.refreshes as f64 / secs,
            snapshot.dropped as f64 / secs,
            snapshot.deduplicated as f64 / secs,
            shared.index.active_view_count(),
        );
    }
    log::debug!("stats logger thread exiting");
}

/// Sleeps `duration` in small chunks, checking `stop` between each so
/// shutdown latency is bounded rather than waiting out the full interval
/// (§5 Cancellation).
fn sleep_checking_stop(duration: Duration, stop: &AtomicBool) {
    const CHUNK: Duration = Duration::from_millis(100);
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Acquire) {
            return;
        }
        let nap = remaining.min(CHUNK);
        thread::sleep(nap);
        remaining -= nap;
    }
}
