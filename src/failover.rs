//! Request failover across a group's nodes

use crate::config::NetworkGroup;
use crate::error::{CallError, RequestError};
use crate::health::{HealthScheduler, Trigger};
use crate::node::{Node, NodeOrigin};
use crate::registry::NodeRegistry;
use crate::selector::{self, SelectionParams};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Routes requests to the best node of a group and retries network failures
/// on the next one
#[derive(Clone)]
pub struct Failover {
    registry: Arc<NodeRegistry>,
    /// Asked for an immediate re-check after a node fails a request
    scheduler: Option<HealthScheduler>,
}

impl Failover {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            scheduler: None,
        }
    }

    /// Re-probe the group through `scheduler` whenever a node fails
    pub fn with_scheduler(mut self, scheduler: HealthScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Node the next request would go to
    pub fn preferred_node(&self, group: NetworkGroup, needs_websocket: bool) -> Option<Node> {
        let params = SelectionParams {
            prefer_fastest: self.registry.prefer_fastest(group),
            needs_websocket,
        };
        let nodes = self.registry.list(group);
        selector::select(&nodes, params, &HashSet::new()).cloned()
    }

    /// Run `operation` against the group's best origin, failing over on
    /// network errors.
    ///
    /// At most one attempt is made per node that was eligible when the call
    /// started, and no node is tried twice. Errors that are not network
    /// failures are returned as they are, without touching the node.
    pub async fn perform<T, F, Fut>(
        &self,
        group: NetworkGroup,
        needs_websocket: bool,
        mut operation: F,
    ) -> Result<T, RequestError>
    where
        F: FnMut(NodeOrigin) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let params = SelectionParams {
            prefer_fastest: self.registry.prefer_fastest(group),
            needs_websocket,
        };

        let budget = selector::eligible(&self.registry.list(group), &HashSet::new()).len();
        if budget == 0 {
            tracing::debug!(group = %group, "no eligible node");
            return Err(RequestError::NoEndpointsAvailable);
        }

        let mut tried = HashSet::with_capacity(budget);
        let mut last_error = None;

        while tried.len() < budget {
            // Fresh snapshot per attempt so nodes marked down meanwhile are skipped
            let (id, origin) = {
                let nodes = self.registry.list(group);
                let Some(node) = selector::select(&nodes, params, &tried) else {
                    break;
                };
                let ws = if needs_websocket { node.ws_origin() } else { None };
                let origin = ws.unwrap_or_else(|| node.preferred_origin().clone());
                (node.id, origin)
            };
            tried.insert(id);

            match operation(origin.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_network() => {
                    tracing::debug!(
                        group = %group,
                        node = %id,
                        origin = %origin,
                        attempt = tried.len(),
                        budget,
                        error = %e,
                        "request failed, trying next node"
                    );
                    self.registry.mark_offline(group, id);
                    if let Some(scheduler) = &self.scheduler {
                        scheduler.trigger(group, Trigger::Failover);
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(RequestError::NonRetryable(e)),
            }
        }

        match last_error {
            Some(last) => {
                tracing::warn!(group = %group, attempts = tried.len(), error = %last, "all nodes failed");
                Err(RequestError::AllAttemptsExhausted {
                    attempts: tried.len(),
                    last,
                })
            }
            None => Err(RequestError::NoEndpointsAvailable),
        }
    }
}
