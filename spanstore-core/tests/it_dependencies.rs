//! Dependency tracking integration tests
//!
//! Opens a span store adapter over the in-memory store and drives the
//! dependency cache the way the span write path does.

use spanstore_core::{
    AttrValue, CallIdentity, ManualClock, MemoryTableStore, SpanCall, SpanStoreAdapter,
    SpanStoreConfig, StoreOp,
};
use std::sync::Arc;
use std::time::Duration;

const DAY: u64 = 86_400;

async fn open(store: &MemoryTableStore, clock: Arc<ManualClock>) -> SpanStoreAdapter {
    let config = SpanStoreConfig {
        table_suffix: "-it".to_string(),
        // ttl = 100 days, dedup window = 10 days
        archive_ttl_days: 100,
        ..SpanStoreConfig::default()
    };
    SpanStoreAdapter::open_with_clock(Arc::new(store.clone()), config, clock)
        .await
        .unwrap()
}

#[tokio::test]
async fn repeated_calls_are_written_once_per_window() {
    let store = MemoryTableStore::new();
    let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_000));
    let adapter = open(&store, clock.clone()).await;
    let deps = adapter.dependencies();

    for i in 0..50 {
        deps.record_call("frontend", "GET /", "trace", &format!("span-{i}"))
            .await
            .unwrap();
    }
    assert_eq!(store.put_count("service-it"), 1);

    clock.advance(Duration::from_secs(9 * DAY));
    deps.record_call("frontend", "GET /", "trace", "late").await.unwrap();
    assert_eq!(store.put_count("service-it"), 1);

    clock.advance(Duration::from_secs(DAY + 1));
    deps.record_call("frontend", "GET /", "trace", "later").await.unwrap();
    assert_eq!(store.put_count("service-it"), 2);

    // The rewrite refreshed the expiry stamp
    let items = store.items("service-it");
    assert_eq!(items.len(), 1);
    let expected = (1_700_000_000 + 10 * DAY + 1 + 100 * DAY).to_string();
    assert_eq!(
        items[0].get("ttl").and_then(AttrValue::as_n),
        Some(expected.as_str())
    );

    adapter.shutdown();
}

#[tokio::test]
async fn trace_builds_service_graph() {
    let store = MemoryTableStore::new();
    let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_000));
    let adapter = open(&store, clock).await;
    let deps = adapter.dependencies();

    // frontend -> cart -> redis, cart -> cart (internal)
    let root = SpanCall::new("frontend", "GET /cart", "t1", "a");
    let cart = SpanCall::new("cart", "GetCart", "t1", "b");
    let internal = SpanCall::new("cart", "LoadCart", "t1", "c");
    let redis = SpanCall::new("redis", "HGET", "t1", "d");

    deps.observe_span(&root, &[]).await.unwrap();
    deps.observe_span(&cart, &[root.identity.clone()]).await.unwrap();
    deps.observe_span(&internal, &[cart.identity.clone()])
        .await
        .unwrap();
    deps.observe_span(&redis, &[internal.identity.clone()])
        .await
        .unwrap();

    assert_eq!(store.items("service-it").len(), 4);

    let mut edges: Vec<(String, String)> = store
        .items("dependency-it")
        .iter()
        .map(|item| {
            (
                item.get("parent_service")
                    .and_then(AttrValue::as_s)
                    .unwrap_or_default()
                    .to_string(),
                item.get("child_service")
                    .and_then(AttrValue::as_s)
                    .unwrap_or_default()
                    .to_string(),
            )
        })
        .collect();
    edges.sort();
    assert_eq!(
        edges,
        vec![
            ("cart".to_string(), "redis".to_string()),
            ("frontend".to_string(), "cart".to_string()),
        ]
    );

    adapter.shutdown();
}

#[tokio::test]
async fn observe_span_stops_at_first_error() {
    let store = MemoryTableStore::new();
    let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_000));
    let adapter = open(&store, clock).await;
    let deps = adapter.dependencies();

    deps.observe_span(&SpanCall::new("frontend", "GET /", "t1", "a"), &[])
        .await
        .unwrap();

    store.fail_next(StoreOp::PutItem);
    let child = SpanCall::new("cart", "GetCart", "t1", "b");
    let parents = [CallIdentity::new("t1", "a")];
    assert!(deps.observe_span(&child, &parents).await.is_err());
    assert_eq!(store.put_count("dependency-it"), 0);

    // A retry of the same span goes through completely
    deps.observe_span(&child, &parents).await.unwrap();
    assert_eq!(store.items("service-it").len(), 2);
    assert_eq!(store.items("dependency-it").len(), 1);

    adapter.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_do_not_block_each_other() {
    let store = MemoryTableStore::new();
    let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_000));
    let adapter = open(&store, clock).await;
    store.set_put_delay(Some(Duration::from_millis(200)));

    let started = std::time::Instant::now();
    let mut tasks = Vec::new();
    for service in 0..8 {
        for span in 0..4 {
            let deps = Arc::clone(adapter.dependencies());
            tasks.push(tokio::spawn(async move {
                deps.record_call(
                    &format!("svc-{service}"),
                    "op",
                    "trace",
                    &format!("{service}-{span}"),
                )
                .await
            }));
        }
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // One write per distinct service, issued in parallel
    assert_eq!(store.put_count("service-it"), 8);
    assert!(started.elapsed() < Duration::from_millis(8 * 200));

    adapter.shutdown();
}
