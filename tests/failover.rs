//! Failover behaviour against a shared registry

mod common;

use common::{allowed_registry, init_tracing, node_by_host};
use futures::future::join_all;
use node_sentinel::{
    CallError, ConnectionStatus, Failover, NetworkGroup, NodeStore, RequestError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

const GROUP: NetworkGroup = NetworkGroup::Btc;

#[tokio::test]
async fn test_two_network_failures_then_success() {
    init_tracing();
    let (_, registry) = allowed_registry(GROUP, &["a", "b", "c"]);
    // Ordered selection for a deterministic A, B, C sequence
    registry.set_prefer_fastest(GROUP, false);
    let failover = Failover::new(registry.clone());
    let attempts = AtomicUsize::new(0);

    let result = failover
        .perform(GROUP, false, |origin| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                match origin.host.as_str() {
                    "a" => Err(CallError::Timeout),
                    "b" => Err(CallError::Connection("reset by peer".into())),
                    _ => Ok(format!("served by {}", origin.host)),
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "served by c");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(node_by_host(&registry, GROUP, "a").status, Some(ConnectionStatus::Offline));
    assert_eq!(node_by_host(&registry, GROUP, "b").status, Some(ConnectionStatus::Offline));
    assert_eq!(node_by_host(&registry, GROUP, "c").status, Some(ConnectionStatus::Allowed));
}

#[tokio::test]
async fn test_rejected_request_is_not_retried() {
    init_tracing();
    let (_, registry) = allowed_registry(GROUP, &["only"]);
    let failover = Failover::new(registry.clone());
    let attempts = AtomicUsize::new(0);

    let result: Result<(), _> = failover
        .perform(GROUP, false, |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(CallError::rejected(400, "insufficient balance")) }
        })
        .await;

    let err = result.unwrap_err();
    assert!(!err.is_connectivity());
    assert_eq!(err.to_string(), "Server returned HTTP 400: insufficient balance");
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        node_by_host(&registry, GROUP, "only").status,
        Some(ConnectionStatus::Allowed)
    );
}

#[tokio::test]
async fn test_no_enabled_nodes_fails_fast() {
    init_tracing();
    let (_, registry) = allowed_registry(GROUP, &["a", "b"]);
    for node in registry.list(GROUP) {
        registry.set_enabled(GROUP, node.id, false);
    }
    let failover = Failover::new(registry);
    let attempts = AtomicUsize::new(0);

    let result: Result<(), _> = failover
        .perform(GROUP, false, |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

    assert_eq!(result, Err(RequestError::NoEndpointsAvailable));
    assert!(result.unwrap_err().is_connectivity());
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_exhaustion_reports_every_attempt() {
    init_tracing();
    let (_, registry) = allowed_registry(GROUP, &["a", "b"]);
    let failover = Failover::new(registry.clone());

    let result: Result<(), _> = failover
        .perform(GROUP, false, |_| async { Err(CallError::rejected(503, "maintenance")) })
        .await;

    match result {
        Err(RequestError::AllAttemptsExhausted { attempts, last }) => {
            assert_eq!(attempts, 2);
            assert_eq!(last, CallError::rejected(503, "maintenance"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(!registry.has_usable_node(GROUP));
}

#[tokio::test]
async fn test_no_node_is_tried_twice() {
    init_tracing();
    let (_, registry) = allowed_registry(GROUP, &["a", "b", "c"]);
    let failover = Failover::new(registry.clone());
    let seen = parking_lot::Mutex::new(Vec::new());

    let _: Result<(), _> = failover
        .perform(GROUP, false, |origin| {
            seen.lock().push(origin.host.clone());
            // Another caller revives the node we just tried
            for node in registry.list(GROUP) {
                registry.record_health(GROUP, node.id, |n| n.status = Some(ConnectionStatus::Allowed));
            }
            async { Err(CallError::Timeout) }
        })
        .await;

    let mut seen = seen.into_inner();
    assert_eq!(seen.len(), 3);
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_mark_node_once() {
    init_tracing();
    const CALLS: usize = 50;

    let (store, registry) = allowed_registry(GROUP, &["only"]);
    let writes_before = store.writes();
    let failover = Failover::new(registry.clone());
    // Every call selects the node before any of them fails
    let barrier = Arc::new(Barrier::new(CALLS));

    let calls = (0..CALLS).map(|_| {
        let failover = failover.clone();
        let barrier = barrier.clone();
        tokio::spawn(async move {
            failover
                .perform(GROUP, false, |_| {
                    let barrier = barrier.clone();
                    async move {
                        barrier.wait().await;
                        Err::<(), _>(CallError::Timeout)
                    }
                })
                .await
        })
    });

    for result in join_all(calls).await {
        match result.unwrap() {
            Err(RequestError::AllAttemptsExhausted { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    let node = node_by_host(&registry, GROUP, "only");
    assert_eq!(node.status, Some(ConnectionStatus::Offline));
    assert_eq!(store.writes() - writes_before, 1);

    let persisted = store.load_nodes(GROUP).unwrap().unwrap();
    assert_eq!(persisted[0].status, Some(ConnectionStatus::Offline));
}
