//! End-to-end engine tests over a scripted transport

mod common;

use common::{init_tracing, native_status, node_by_host, Reply, ScriptedTransport};
use node_sentinel::{
    CallError, ConfigFile, ConnectionStatus, MemoryNodeStore, NetworkGroup, NodeEngine,
    RejectedReason, Request, Scheme, Transport,
};
use std::sync::Arc;
use std::time::Duration;

const ADM: NetworkGroup = NetworkGroup::Adm;

fn engine(transport: Arc<ScriptedTransport>) -> NodeEngine {
    NodeEngine::from_config(
        &ConfigFile::default(),
        Arc::new(MemoryNodeStore::new()),
        transport,
    )
    .unwrap()
}

#[tokio::test]
async fn test_probe_cycle_classifies_nodes() {
    init_tracing();
    let transport = ScriptedTransport::new();
    transport.reply("clown.adamant.im", native_status(40_000_000, "0.8.3"));
    transport.reply("lake.adamant.im", native_status(39_999_995, "0.8.3"));
    transport.reply("bid.adamant.im", native_status(39_999_000, "0.8.3"));
    transport.reply("unusual.adamant.im", native_status(40_000_000, "0.7.4"));
    let engine = engine(transport.clone());

    assert!(engine.scheduler().run_cycle(ADM, node_sentinel::Trigger::Manual).await);

    let registry = engine.registry();
    assert_eq!(node_by_host(registry, ADM, "clown.adamant.im").status, Some(ConnectionStatus::Allowed));
    assert_eq!(node_by_host(registry, ADM, "lake.adamant.im").status, Some(ConnectionStatus::Allowed));
    assert_eq!(
        node_by_host(registry, ADM, "bid.adamant.im").status,
        Some(ConnectionStatus::Synchronizing { is_final: false })
    );
    assert_eq!(
        node_by_host(registry, ADM, "unusual.adamant.im").status,
        Some(ConnectionStatus::NotAllowed {
            reason: RejectedReason::OutdatedApiVersion
        })
    );
    assert_eq!(node_by_host(registry, ADM, "endless.adamant.im").status, Some(ConnectionStatus::Offline));

    let clown = node_by_host(registry, ADM, "clown.adamant.im");
    assert_eq!(clown.height, Some(40_000_000));
    assert!(clown.ws_enabled);
    assert_eq!(clown.ws_port, Some(36668));
    assert_eq!(transport.calls_to("clown.adamant.im"), 1);

    let info = engine.info(ADM);
    assert!(info.has_usable_node);
    assert!(!info.stale);
    assert_eq!(info.chosen_rest, Some(clown.id));
    assert_eq!(info.chosen_ws, Some(clown.id));
    // The hidden default is listed in `nodes` only
    assert_eq!(info.visible_nodes().count(), info.nodes.len() - 1);
}

#[tokio::test]
async fn test_requests_follow_health() {
    init_tracing();
    let transport = ScriptedTransport::new();
    transport.reply("clown.adamant.im", native_status(100, "0.8.3"));
    transport.reply("lake.adamant.im", native_status(100, "0.8.3"));
    let engine = engine(transport.clone());
    engine.scheduler().run_cycle(ADM, node_sentinel::Trigger::Manual).await;

    let ws = engine.websocket_origin(ADM).unwrap();
    assert_eq!(ws.scheme, Scheme::Wss);
    assert_eq!(ws.host, "clown.adamant.im");
    assert_eq!(ws.port, Some(36668));

    // clown drops out between the health check and the request
    transport.reply("clown.adamant.im", Reply::Fail(CallError::Timeout));

    let request = Request::get("/api/blocks/getHeight");
    let response = engine
        .perform(ADM, false, |origin| {
            let transport = transport.clone();
            let request = request.clone();
            async move {
                transport.send(&origin, &request).await?;
                Ok::<_, CallError>(origin.host)
            }
        })
        .await;

    assert_eq!(response.unwrap(), "lake.adamant.im");
    let registry = engine.registry();
    assert_eq!(node_by_host(registry, ADM, "clown.adamant.im").status, Some(ConnectionStatus::Offline));
    assert_eq!(engine.preferred_node(ADM).map(|n| n.main_origin.host), Some("lake.adamant.im".into()));
}

#[tokio::test]
async fn test_manual_controls_round_trip() {
    init_tracing();
    let transport = ScriptedTransport::new();
    transport.reply("mine.example", native_status(10, "0.9.0"));
    let engine = engine(transport.clone());
    let defaults = engine.nodes(ADM);

    for node in &defaults {
        engine.set_node_enabled(ADM, node.id, false);
    }
    let id = engine.add_node(ADM, "https://mine.example").unwrap().unwrap();
    assert!(engine.check_now(ADM).await.unwrap());

    assert!(engine.has_usable_node(ADM));
    assert_eq!(engine.preferred_node(ADM).map(|n| n.id), Some(id));
    // Disabled nodes were not probed
    assert_eq!(transport.calls().len(), 1);

    engine.set_prefer_fastest(ADM, true);
    assert!(*engine.observe_prefer_fastest(ADM).borrow());

    assert!(engine.reset_group(ADM));
    assert_eq!(engine.nodes(ADM), defaults);
    assert!(!engine.has_usable_node(ADM));
}

#[tokio::test(start_paused = true)]
async fn test_background_checks_recover_after_outage() {
    init_tracing();
    let transport = ScriptedTransport::new();
    let engine = engine(transport.clone());
    let handle = engine.start();
    let mut info = engine.observe_info(ADM);

    // Initial check: everything is down
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!engine.has_usable_node(ADM));

    // With no usable node the crucial interval applies
    transport.reply("clown.adamant.im", native_status(5, "0.8.3"));
    tokio::time::sleep(engine_params_crucial() + Duration::from_secs(1)).await;
    assert!(engine.has_usable_node(ADM));

    assert!(info.has_changed().unwrap());
    assert!(info.borrow_and_update().has_usable_node);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_foreground_and_connectivity_signals_check_all_groups() {
    init_tracing();
    let transport = ScriptedTransport::new();
    let engine = engine(transport.clone());

    engine.on_foreground();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let after_foreground = transport.calls().len();
    assert!(after_foreground > 0);
    assert!(transport.calls().iter().any(|(host, _)| host == "btcnode1.adamant.im"));
    assert!(transport.calls().iter().any(|(host, _)| host == "info2.adm.im"));

    engine.on_connectivity_restored();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.calls().len(), after_foreground * 2);
}

fn engine_params_crucial() -> Duration {
    node_sentinel::GroupParams::defaults(ADM)
        .crucial_interval
        .unwrap_or(Duration::from_secs(30))
}
