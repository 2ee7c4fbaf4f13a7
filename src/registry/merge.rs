//! Reconciling a restored node list with the defaults of this build

use crate::node::{Node, NodeId, NodeKind};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Merge a persisted group list with the shipped defaults.
///
/// Stored nodes keep their order and user-controlled state. Stored defaults
/// take the shipped alternate origin and visibility; defaults this build no
/// longer ships are dropped. Newly shipped defaults are appended unless the
/// user removed them. Custom nodes duplicating a default origin are dropped
/// in favour of the default.
pub fn merge_with_defaults(
    stored: Vec<Node>,
    defaults: Vec<Node>,
    removed: &BTreeSet<NodeId>,
) -> Vec<Node> {
    let defaults: Vec<Node> = defaults
        .into_iter()
        .filter(|n| !removed.contains(&n.id))
        .collect();
    let mut shipped: HashMap<_, Node> = defaults.iter().map(|n| (n.id, n.clone())).collect();
    let default_origins: HashSet<_> = defaults.iter().map(|n| n.main_origin.clone()).collect();

    let mut merged = Vec::with_capacity(stored.len().max(defaults.len()));
    let mut seen = HashSet::new();

    for mut node in stored {
        if !seen.insert(node.id) {
            continue;
        }

        match node.kind {
            NodeKind::Default { .. } => {
                let Some(fresh) = shipped.remove(&node.id) else {
                    tracing::debug!(node = %node.id, origin = %node.main_origin, "dropping retired default node");
                    continue;
                };
                node.kind = fresh.kind;
                node.alt_origin = fresh.alt_origin;
                if node.alt_origin.is_none() {
                    node.preferred = Default::default();
                }
                merged.push(node);
            }
            NodeKind::Custom => {
                if default_origins.contains(&node.main_origin) {
                    continue;
                }
                merged.push(node);
            }
        }
    }

    // Keep shipped order for defaults the stored list did not know about
    for node in defaults {
        if let Some(fresh) = shipped.remove(&node.id) {
            merged.push(fresh);
        }
    }

    merged
}
