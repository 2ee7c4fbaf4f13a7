//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use node_sentinel::{
    CallError, ConnectionStatus, DefaultsProvider, MemoryNodeStore, NetworkGroup, Node,
    NodeOrigin, NodeRegistry, ParamsTable, RawResponse, Request, Scheme, Transport,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Canned answer of one host
#[derive(Clone)]
pub enum Reply {
    Json(Value),
    Fail(CallError),
}

/// In-memory transport answering per host
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, host: &str, reply: Reply) {
        self.replies.lock().insert(host.to_string(), reply);
    }

    /// Every (host, path) sent so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, host: &str) -> usize {
        self.calls.lock().iter().filter(|(h, _)| h == host).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, origin: &NodeOrigin, request: &Request) -> Result<RawResponse, CallError> {
        self.calls
            .lock()
            .push((origin.host.clone(), request.path.clone()));

        let reply = self.replies.lock().get(&origin.host).cloned();
        match reply {
            Some(Reply::Json(body)) => Ok(RawResponse::new(200, body.to_string())),
            Some(Reply::Fail(err)) => Err(err),
            None => Err(CallError::Connection(format!("{} refused", origin.host))),
        }
    }
}

/// Status body of a native ledger node
pub fn native_status(height: u64, version: &str) -> Reply {
    Reply::Json(serde_json::json!({
        "success": true,
        "network": { "height": height },
        "version": { "version": version },
        "wsClient": { "enabled": true, "port": 36668 }
    }))
}

/// Defaults provider serving the given hosts for every group
pub fn hosts_provider(hosts: &'static [&'static str]) -> DefaultsProvider {
    Arc::new(move |group| {
        hosts
            .iter()
            .map(|h| Node::default_for(group, NodeOrigin::new(Scheme::Https, *h, None)))
            .collect()
    })
}

/// Registry over a memory store whose nodes in `group` are all allowed
pub fn allowed_registry(
    group: NetworkGroup,
    hosts: &'static [&'static str],
) -> (Arc<MemoryNodeStore>, Arc<NodeRegistry>) {
    let store = Arc::new(MemoryNodeStore::new());
    let registry = NodeRegistry::with_defaults(store.clone(), &ParamsTable::new(), hosts_provider(hosts));
    for node in registry.list(group) {
        registry.record_health(group, node.id, |n| n.status = Some(ConnectionStatus::Allowed));
    }
    (store, Arc::new(registry))
}

pub fn node_by_host(registry: &NodeRegistry, group: NetworkGroup, host: &str) -> Node {
    registry
        .list(group)
        .into_iter()
        .find(|n| n.main_origin.host == host)
        .unwrap_or_else(|| panic!("no node {} in {}", host, group))
}
