//! Node selection over a registry snapshot
//!
//! Everything here is a pure function of the node list it is given. Callers
//! take one snapshot from the registry and select from it, so a selection
//! never mixes two versions of a group's state.

use crate::node::{ConnectionStatus, Node, NodeId};
use std::collections::HashSet;

/// What a caller needs from the selected node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionParams {
    /// Rank by ping instead of list order
    pub prefer_fastest: bool,
    /// Caller wants a persistent websocket connection
    pub needs_websocket: bool,
}

impl SelectionParams {
    pub fn rest(prefer_fastest: bool) -> Self {
        Self {
            prefer_fastest,
            needs_websocket: false,
        }
    }

    pub fn websocket(prefer_fastest: bool) -> Self {
        Self {
            prefer_fastest,
            needs_websocket: true,
        }
    }
}

/// The nodes chosen for plain requests and for persistent connections
#[derive(Debug, Clone, Copy, Default)]
pub struct Selection<'a> {
    pub rest: Option<&'a Node>,
    /// Best websocket-capable node; `None` if no eligible node has one
    pub ws: Option<&'a Node>,
}

/// Enabled nodes that may receive requests, in list order.
///
/// Allowed nodes are preferred. Only when none exists do nodes that are
/// still catching up (not yet final) become candidates.
pub fn eligible<'a>(nodes: &'a [Node], exclude: &HashSet<NodeId>) -> Vec<&'a Node> {
    let allowed = with_status(nodes, exclude, ConnectionStatus::Allowed);
    if !allowed.is_empty() {
        return allowed;
    }
    with_status(nodes, exclude, ConnectionStatus::Synchronizing { is_final: false })
}

fn with_status<'a>(
    nodes: &'a [Node],
    exclude: &HashSet<NodeId>,
    status: ConnectionStatus,
) -> Vec<&'a Node> {
    nodes
        .iter()
        .filter(|n| n.enabled && !exclude.contains(&n.id) && n.status.as_ref() == Some(&status))
        .collect()
}

/// Eligible nodes in selection order
pub fn rank<'a>(nodes: &'a [Node], prefer_fastest: bool, exclude: &HashSet<NodeId>) -> Vec<&'a Node> {
    let mut ranked = eligible(nodes, exclude);
    if prefer_fastest {
        // Stable, so equal pings keep list order; unknown ping goes last
        ranked.sort_by_key(|n| (n.ping.is_none(), n.ping));
    }
    ranked
}

/// Best node for a request, skipping ids in `exclude`.
///
/// A websocket request falls back to the best non-websocket node when no
/// eligible node supports websockets.
pub fn select<'a>(
    nodes: &'a [Node],
    params: SelectionParams,
    exclude: &HashSet<NodeId>,
) -> Option<&'a Node> {
    let ranked = rank(nodes, params.prefer_fastest, exclude);
    if params.needs_websocket {
        if let Some(node) = ranked.iter().find(|n| n.ws_enabled) {
            return Some(*node);
        }
    }
    ranked.first().copied()
}

/// Both picks at once, from the same ranking
pub fn pick(nodes: &[Node], prefer_fastest: bool) -> Selection<'_> {
    let ranked = rank(nodes, prefer_fastest, &HashSet::new());
    Selection {
        rest: ranked.first().copied(),
        ws: ranked.iter().find(|n| n.ws_enabled).copied(),
    }
}
