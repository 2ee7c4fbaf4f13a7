//! Presentation-facing summary of one group

use crate::config::NetworkGroup;
use crate::node::{Node, NodeId};
use crate::selector;
use serde::Serialize;

/// Current node list of a group together with what the selector would pick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodesListInfo {
    pub group: NetworkGroup,
    /// Every node, hidden defaults included, in list order
    pub nodes: Vec<Node>,
    pub chosen_rest: Option<NodeId>,
    pub chosen_ws: Option<NodeId>,
    pub has_usable_node: bool,
    pub prefer_fastest: bool,
    /// No health check finished within the group's staleness threshold
    pub stale: bool,
}

impl NodesListInfo {
    pub fn compute(group: NetworkGroup, nodes: Vec<Node>, prefer_fastest: bool, stale: bool) -> Self {
        let selection = selector::pick(&nodes, prefer_fastest);
        let chosen_rest = selection.rest.map(|n| n.id);
        let chosen_ws = selection.ws.map(|n| n.id);
        let has_usable_node = selection.rest.is_some();

        Self {
            group,
            nodes,
            chosen_rest,
            chosen_ws,
            has_usable_node,
            prefer_fastest,
            stale,
        }
    }

    /// Nodes shown to users
    pub fn visible_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_visible())
    }

    pub fn chosen_rest_node(&self) -> Option<&Node> {
        let id = self.chosen_rest?;
        self.nodes.iter().find(|n| n.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ConnectionStatus, NodeOrigin, Scheme};
    use std::time::Duration;

    #[test]
    fn test_compute_picks_and_hides() {
        let mut fast = Node::default_for(NetworkGroup::Adm, NodeOrigin::new(Scheme::Https, "hidden.example", None)).hidden();
        fast.status = Some(ConnectionStatus::Allowed);
        fast.ping = Some(Duration::from_millis(5));

        let mut slow = Node::custom(NodeOrigin::new(Scheme::Https, "slow.example", None));
        slow.status = Some(ConnectionStatus::Allowed);
        slow.ping = Some(Duration::from_millis(500));
        slow.ws_enabled = true;

        let info = NodesListInfo::compute(NetworkGroup::Adm, vec![slow.clone(), fast.clone()], true, false);
        assert_eq!(info.chosen_rest, Some(fast.id));
        assert_eq!(info.chosen_ws, Some(slow.id));
        assert!(info.has_usable_node);
        assert_eq!(info.visible_nodes().count(), 1);
        assert_eq!(info.chosen_rest_node().map(|n| n.id), Some(fast.id));
    }

    #[test]
    fn test_no_nodes_is_unusable() {
        let info = NodesListInfo::compute(NetworkGroup::Eth, Vec::new(), false, true);
        assert!(info.stale);
        assert!(!info.has_usable_node);
        assert!(info.chosen_rest.is_none());
    }

    #[test]
    fn test_synchronizing_fallback_counts_as_usable() {
        let mut catching_up = Node::custom(NodeOrigin::new(Scheme::Https, "behind.example", None));
        catching_up.status = Some(ConnectionStatus::Synchronizing { is_final: false });
        let mut stuck = Node::custom(NodeOrigin::new(Scheme::Https, "stuck.example", None));
        stuck.status = Some(ConnectionStatus::Synchronizing { is_final: true });

        let info = NodesListInfo::compute(NetworkGroup::Eth, vec![stuck, catching_up.clone()], false, false);
        assert!(info.has_usable_node);
        assert_eq!(info.chosen_rest, Some(catching_up.id));
    }
}
