use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use env_logger::{Builder, Env};
use viewhub::testing::{sink_send_fn, wait_until, MapView, SinkLog};
use viewhub::{EngineConfig, Hint, HintKind, HintPayload, Namespace, PutHintsMode, ViewSig};

type Key = u64;
type Value = i64;
type Engine = viewhub::Engine<Value, Key, ()>;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Same shape as the teacher's `main.rs::init_logger`, with `try_init` so
/// repeated calls across tests in one process don't panic.
fn init_logger() {
    let _ = Builder::from_env(Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

fn next_key() -> Key {
    NEXT_KEY.fetch_add(1, Ordering::Relaxed)
}

fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_refresh_interval(Duration::from_millis(20))
        .with_worker_threads(2)
        .with_put_hints_mode(PutHintsMode::Batched)
        .with_stats_log_interval_ms(Some(60_000))
}

fn fixture() -> (Arc<MapView<Value>>, Arc<SinkLog<Key, Value>>) {
    let mut data = HashMap::new();
    data.insert(Namespace::new("a"), 1);
    data.insert(Namespace::new("b"), 2);
    let view = Arc::new(MapView::new("foo", data));
    let sink = Arc::new(SinkLog::new());
    (view, sink)
}

fn build_engine(view: Arc<MapView<Value>>, sink: Arc<SinkLog<Key, Value>>) -> Engine {
    Engine::builder()
        .config(fast_config())
        .views(vec![view as Arc<dyn viewhub::View<Value>>])
        .send_fn(sink_send_fn(sink))
        .build()
        .expect("engine builds with send_fn and put_hints_mode set")
}

fn sig(namespace: &str) -> ViewSig {
    ViewSig::new(namespace, "foo", vec![])
}

#[test]
fn basic_subscribe_sends_initial_value() {
    init_logger();
    let (view, sink) = fixture();
    let engine = build_engine(view, sink.clone());

    let key = next_key();
    let handle = engine.subscribe(sig("a"), key, ()).unwrap().unwrap();
    handle.wait_timeout(Duration::from_secs(2));

    assert_eq!(sink.len(), 1);
    let sent = sink.snapshot();
    assert_eq!(sent[0].0, key);
    assert_eq!(sent[0].2, 1);

    assert_eq!(engine.active_view_count(), 1);
    engine.shutdown(true);
}

#[test]
fn unsubscribe_clears_state() {
    init_logger();
    let (view, sink) = fixture();
    let engine = build_engine(view, sink.clone());

    let key = next_key();
    engine.subscribe(sig("a"), key, ()).unwrap().unwrap().wait();
    engine.unsubscribe(sig("a"), key, ());

    assert_eq!(engine.active_view_count(), 0);
    assert!(engine.subscribed_views().is_empty());
    engine.shutdown(true);
}

#[test]
fn two_subscribers_one_leaves() {
    init_logger();
    let (view, sink) = fixture();
    let engine = build_engine(view, sink.clone());

    let k1 = next_key();
    let k2 = next_key();
    engine.subscribe(sig("a"), k1, ()).unwrap().unwrap().wait();
    engine.subscribe(sig("a"), k2, ()).unwrap().unwrap().wait();
    assert_eq!(sink.len(), 2);

    engine.unsubscribe(sig("a"), k1, ());

    assert_eq!(engine.active_view_count(), 1);
    assert_eq!(engine.subscribed_views().len(), 1);
    engine.shutdown(true);
}

#[test]
fn duplicate_subscribe_sends_twice() {
    init_logger();
    let (view, sink) = fixture();
    let engine = build_engine(view, sink.clone());

    let key = next_key();
    engine.subscribe(sig("a"), key, ()).unwrap().unwrap().wait();
    engine.subscribe(sig("a"), key, ()).unwrap().unwrap().wait();

    assert_eq!(sink.len(), 2);
    for (k, _, v) in sink.snapshot() {
        assert_eq!(k, key);
        assert_eq!(v, 1);
    }

    engine.unsubscribe(sig("a"), key, ());
    assert_eq!(engine.active_view_count(), 0);
    engine.shutdown(true);
}

#[test]
fn irrelevant_hint_is_a_no_op() {
    init_logger();
    let (view, sink) = fixture();
    let engine = build_engine(view, sink.clone());

    let key = next_key();
    engine.subscribe(sig("a"), key, ()).unwrap().unwrap().wait();
    assert_eq!(sink.len(), 1);

    engine.put_hints(vec![Hint::new("b", HintPayload::from("foo"), HintKind::Memory)]);
    std::thread::sleep(Duration::from_millis(150));

    assert_eq!(sink.len(), 1, "hint for a different namespace must not trigger a send");
    engine.shutdown(true);
}

#[test]
fn relevant_hint_after_unchanged_data_suppresses_send() {
    init_logger();
    let (view, sink) = fixture();
    let engine = build_engine(Arc::clone(&view), sink.clone());

    let key = next_key();
    engine.subscribe(sig("a"), key, ()).unwrap().unwrap().wait();
    assert_eq!(sink.len(), 1);

    engine.put_hints(vec![Hint::new("a", HintPayload::from("foo"), HintKind::Memory)]);
    wait_until(Duration::from_millis(300), || engine.stats().refreshes >= 1);
    assert_eq!(sink.len(), 1, "unchanged data must not produce a second send");

    view.set(Namespace::new("a"), 21);
    engine.put_hints(vec![Hint::new("a", HintPayload::from("foo"), HintKind::Memory)]);
    let sent = wait_until(Duration::from_secs(2), || sink.len() == 2);
    assert!(sent, "changed data must produce exactly one more send");

    let last = sink.snapshot().into_iter().last().unwrap();
    assert_eq!(last.2, 21);

    engine.shutdown(true);
}

#[test]
fn queue_overflow_drops_newest() {
    init_logger();
    let mut data = HashMap::new();
    data.insert(Namespace::new("a"), 1);
    data.insert(Namespace::new("b"), 2);
    let view = Arc::new(MapView::new("foo", data));
    let sink: Arc<SinkLog<Key, Value>> = Arc::new(SinkLog::new());

    let engine = Engine::builder()
        .config(
            EngineConfig::default()
                .with_refresh_queue_size(1)
                .with_worker_threads(0)
                .with_refresh_interval(Duration::from_millis(20))
                .with_put_hints_mode(PutHintsMode::Batched)
                .with_stats_log_interval_ms(Some(60_000)),
        )
        .views(vec![Arc::clone(&view) as _])
        .send_fn(sink_send_fn(Arc::clone(&sink)))
        .build()
        .unwrap();

    engine.subscribe(sig("a"), next_key(), ()).unwrap().unwrap().wait();
    engine.subscribe(sig("b"), next_key(), ()).unwrap().unwrap().wait();

    engine.put_hints(vec![
        Hint::new("a", HintPayload::from("foo"), HintKind::Memory),
        Hint::new("b", HintPayload::from("foo"), HintKind::Memory),
    ]);
    wait_until(Duration::from_millis(300), || engine.stats().dropped >= 1);

    assert_eq!(engine.stats().dropped, 1);
    engine.shutdown(true);
}

#[test]
fn queue_dedup_counts_duplicate_offers() {
    init_logger();
    let (view, sink) = fixture();

    let engine = Engine::builder()
        .config(
            EngineConfig::default()
                .with_refresh_queue_size(1000)
                .with_worker_threads(0)
                .with_refresh_interval(Duration::from_millis(10))
                .with_put_hints_mode(PutHintsMode::Batched)
                .with_stats_log_interval_ms(Some(60_000)),
        )
        .views(vec![view as Arc<dyn viewhub::View<Value>>])
        .send_fn(sink_send_fn(sink))
        .build()
        .unwrap();

    engine.subscribe(sig("a"), next_key(), ()).unwrap().unwrap().wait();

    engine.put_hints(vec![Hint::new("a", HintPayload::from("foo"), HintKind::Memory)]);
    std::thread::sleep(Duration::from_millis(60));
    engine.put_hints(vec![Hint::new("a", HintPayload::from("foo"), HintKind::Memory)]);
    std::thread::sleep(Duration::from_millis(60));

    assert_eq!(engine.stats().deduplicated, 1);
    engine.shutdown(true);
}

#[test]
fn unsubscribe_before_initial_completes_discards_result() {
    init_logger();
    struct SlowView(Arc<std::sync::Mutex<HashMap<Namespace, Value>>>);
    impl viewhub::View<Value> for SlowView {
        fn id(&self) -> viewhub::ViewId {
            "slow".into()
        }
        fn data(&self, namespace: &Namespace, _parameters: &viewhub::Parameters) -> anyhow::Result<Value> {
            std::thread::sleep(Duration::from_secs(1));
            self.0
                .lock()
                .unwrap()
                .get(namespace)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing"))
        }
        fn relevant(
            &self,
            _namespace: &Namespace,
            _parameters: &viewhub::Parameters,
            _hints: &std::collections::HashSet<Hint>,
        ) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    let mut backing = HashMap::new();
    backing.insert(Namespace::new("a"), 1);
    let view = Arc::new(SlowView(Arc::new(std::sync::Mutex::new(backing))));
    let sink: Arc<SinkLog<Key, Value>> = Arc::new(SinkLog::new());

    let engine: viewhub::Engine<Value, Key, ()> = viewhub::Engine::builder()
        .config(fast_config())
        .views(vec![view as Arc<dyn viewhub::View<Value>>])
        .send_fn(sink_send_fn(Arc::clone(&sink)))
        .build()
        .unwrap();

    let slow_sig = ViewSig::new("a", "slow", vec![]);
    let key = next_key();
    engine.subscribe(slow_sig.clone(), key, ()).unwrap();
    engine.unsubscribe(slow_sig, key, ());

    std::thread::sleep(Duration::from_secs(2));

    assert!(sink.is_empty(), "unsubscribing before the initial compute finishes must suppress the send");
    assert_eq!(engine.active_view_count(), 0);
    engine.shutdown(true);
}

#[test]
fn unauthorized_subscribe_is_rejected() {
    init_logger();
    let (view, sink) = fixture();
    let unauth_calls: Arc<std::sync::Mutex<Vec<Key>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let unauth_calls_clone = Arc::clone(&unauth_calls);

    let engine: viewhub::Engine<Value, Key, ()> = viewhub::Engine::builder()
        .config(fast_config())
        .views(vec![view as Arc<dyn viewhub::View<Value>>])
        .send_fn(sink_send_fn(sink.clone()))
        .auth_fn(|_sig, _key, _ctx| false)
        .on_unauth_fn(move |_sig, key, _ctx| unauth_calls_clone.lock().unwrap().push(*key))
        .build()
        .unwrap();

    let key = next_key();
    let result = engine.subscribe(sig("a"), key, ()).unwrap();

    assert!(result.is_none());
    assert_eq!(unauth_calls.lock().unwrap().as_slice(), &[key]);
    assert_eq!(engine.active_view_count(), 0);
    assert!(sink.is_empty());
    engine.shutdown(true);
}

#[test]
fn namespace_is_resolved_consistently_for_subscribe_and_unsubscribe() {
    init_logger();
    let (view, sink) = fixture();

    let engine: viewhub::Engine<Value, Key, ()> = viewhub::Engine::builder()
        .config(fast_config())
        .views(vec![view as Arc<dyn viewhub::View<Value>>])
        .send_fn(sink_send_fn(sink.clone()))
        .namespace_fn(|_sig, _key, _ctx| Some(Namespace::new("b")))
        .build()
        .unwrap();

    let key = next_key();
    let unnamespaced = ViewSig::unnamespaced("foo", vec![]);
    engine
        .subscribe(unnamespaced.clone(), key, ())
        .unwrap()
        .unwrap()
        .wait();

    assert_eq!(sink.len(), 1);
    assert_eq!(sink.snapshot()[0].2, 2, "namespace_fn should resolve to b, whose foo value is 2");

    engine.unsubscribe(unnamespaced, key, ());
    assert_eq!(engine.active_view_count(), 0);
    engine.shutdown(true);
}
