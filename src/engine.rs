//! Process-wide entry point wiring registry, scheduler and failover together

use crate::config::{ConfigFile, NetworkGroup};
use crate::error::{CallError, RequestError, Result};
use crate::failover::Failover;
use crate::health::{HealthScheduler, HttpTransport, SchedulerHandle, Transport, Trigger};
use crate::node::{Node, NodeId, NodeOrigin};
use crate::registry::{FileNodeStore, NodeRegistry, NodeStore};
use crate::status::NodesListInfo;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Node health-check and selection engine.
///
/// Construct one per process and hand clones of it (or of its parts) to
/// whoever needs to issue requests or present node state.
#[derive(Clone)]
pub struct NodeEngine {
    registry: Arc<NodeRegistry>,
    scheduler: HealthScheduler,
    failover: Failover,
}

impl NodeEngine {
    /// Engine over an existing registry and scheduler
    pub fn new(scheduler: HealthScheduler) -> Self {
        let registry = scheduler.registry().clone();
        let failover = Failover::new(registry.clone()).with_scheduler(scheduler.clone());
        Self {
            registry,
            scheduler,
            failover,
        }
    }

    /// Engine using the given store and transport, tuned by `config`
    pub fn from_config(
        config: &ConfigFile,
        store: Arc<dyn NodeStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let params = config.params_table()?;
        let registry = Arc::new(NodeRegistry::new(store, &params));
        let scheduler = HealthScheduler::with_transport(
            registry,
            params,
            transport,
            config.settings.max_parallel_probes,
        );
        Ok(Self::new(scheduler))
    }

    /// Engine persisting to the configured nodes file over HTTP
    pub fn open(config: &ConfigFile) -> Result<Self> {
        let store = FileNodeStore::open_or_empty(config.nodes_path());
        let transport = HttpTransport::new(config.request_timeout())?;
        tracing::info!(nodes_file = %store.path().display(), "node engine opened");
        Self::from_config(config, Arc::new(store), Arc::new(transport))
    }

    /// Start periodic health checks; stop them with [`SchedulerHandle::shutdown`]
    pub fn start(&self) -> SchedulerHandle {
        self.scheduler.start()
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &HealthScheduler {
        &self.scheduler
    }

    // ========================================================================
    // Manual controls
    // ========================================================================

    /// Add a custom node by URL. Returns its id, or `None` if the group
    /// already has a node at that origin.
    pub fn add_node(&self, group: NetworkGroup, url: &str) -> Result<Option<NodeId>> {
        let node = Node::custom(NodeOrigin::parse(url)?);
        let id = node.id;
        Ok(self.registry.add(group, node).then_some(id))
    }

    pub fn remove_node(&self, group: NetworkGroup, id: NodeId) -> bool {
        self.registry.remove(group, id)
    }

    pub fn set_node_enabled(&self, group: NetworkGroup, id: NodeId, enabled: bool) -> bool {
        self.registry.set_enabled(group, id, enabled)
    }

    pub fn reset_group(&self, group: NetworkGroup) -> bool {
        self.registry.reset(group)
    }

    /// Force an immediate health check of one group
    pub fn check_now(&self, group: NetworkGroup) -> JoinHandle<bool> {
        self.scheduler.trigger(group, Trigger::Manual)
    }

    pub fn set_prefer_fastest(&self, group: NetworkGroup, value: bool) -> bool {
        self.registry.set_prefer_fastest(group, value)
    }

    // ========================================================================
    // Application signals
    // ========================================================================

    pub fn on_foreground(&self) {
        self.scheduler.on_foreground();
    }

    pub fn on_connectivity_restored(&self) {
        self.scheduler.on_connectivity_restored();
    }

    pub fn set_on_screen(&self, group: NetworkGroup, on_screen: bool) {
        self.scheduler.set_on_screen(group, on_screen);
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn nodes(&self, group: NetworkGroup) -> Vec<Node> {
        self.registry.list(group)
    }

    pub fn observe_nodes(&self, group: NetworkGroup) -> watch::Receiver<Vec<Node>> {
        self.registry.observe(group)
    }

    pub fn info(&self, group: NetworkGroup) -> NodesListInfo {
        self.scheduler.info(group)
    }

    pub fn observe_info(&self, group: NetworkGroup) -> watch::Receiver<NodesListInfo> {
        self.scheduler.observe_info(group)
    }

    /// Whether any enabled node of the group is currently usable
    pub fn has_usable_node(&self, group: NetworkGroup) -> bool {
        self.registry.has_usable_node(group)
    }

    pub fn prefer_fastest(&self, group: NetworkGroup) -> bool {
        self.registry.prefer_fastest(group)
    }

    pub fn observe_prefer_fastest(&self, group: NetworkGroup) -> watch::Receiver<bool> {
        self.registry.observe_prefer_fastest(group)
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Node the next plain request would go to
    pub fn preferred_node(&self, group: NetworkGroup) -> Option<Node> {
        self.failover.preferred_node(group, false)
    }

    /// Origin for a persistent connection. Falls back to a plain origin when
    /// no eligible node offers websockets.
    pub fn websocket_origin(&self, group: NetworkGroup) -> Option<NodeOrigin> {
        let node = self.failover.preferred_node(group, true)?;
        Some(
            node.ws_origin()
                .unwrap_or_else(|| node.preferred_origin().clone()),
        )
    }

    /// Run a request with failover; see [`Failover::perform`]
    pub async fn perform<T, F, Fut>(
        &self,
        group: NetworkGroup,
        needs_websocket: bool,
        operation: F,
    ) -> std::result::Result<T, RequestError>
    where
        F: FnMut(NodeOrigin) -> Fut,
        Fut: Future<Output = std::result::Result<T, CallError>>,
    {
        self.failover.perform(group, needs_websocket, operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::health::{RawResponse, Request};
    use crate::registry::MemoryNodeStore;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn send(
            &self,
            _origin: &NodeOrigin,
            _request: &Request,
        ) -> std::result::Result<RawResponse, CallError> {
            Err(CallError::Connection("unreachable".into()))
        }
    }

    fn engine() -> NodeEngine {
        NodeEngine::from_config(
            &ConfigFile::default(),
            Arc::new(MemoryNodeStore::new()),
            Arc::new(Unreachable),
        )
        .unwrap()
    }

    #[test]
    fn test_add_node_by_url() {
        let engine = engine();
        let before = engine.nodes(NetworkGroup::Eth).len();

        let id = engine.add_node(NetworkGroup::Eth, "my-node.example:8545").unwrap();
        assert!(id.is_some());
        assert_eq!(engine.nodes(NetworkGroup::Eth).len(), before + 1);

        // Same origin again
        assert_eq!(engine.add_node(NetworkGroup::Eth, "HTTPS://MY-NODE.example:8545/").unwrap(), None);
    }

    #[test]
    fn test_add_node_rejects_bad_url() {
        let err = engine().add_node(NetworkGroup::Btc, "ftp://nope").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_fresh_engine_has_no_endpoint() {
        let engine = engine();
        assert!(!engine.has_usable_node(NetworkGroup::Adm));
        assert!(engine.preferred_node(NetworkGroup::Adm).is_none());

        let result: std::result::Result<(), _> = engine
            .perform(NetworkGroup::Adm, false, |_| async { Ok(()) })
            .await;
        assert_eq!(result, Err(RequestError::NoEndpointsAvailable));
    }
}
