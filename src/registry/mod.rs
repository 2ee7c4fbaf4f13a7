//! Node registry: the single source of truth for every group's node list
//!
//! Each group's list lives in a `watch` channel, so readers always get a
//! complete snapshot and subscribers see the latest value immediately. Writes
//! to a group are serialized by a per-group lock, persisted, and only
//! published when the list actually changed.

mod merge;
mod store;

pub use merge::merge_with_defaults;
pub use store::{FileNodeStore, MemoryNodeStore, NodeStore, PersistedNodes, STORE_VERSION};

use crate::config::{NetworkGroup, ParamsTable};
use crate::node::{default_nodes, ConnectionStatus, Node, NodeId};
use crate::selector;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Source of a group's default node set
pub type DefaultsProvider = Arc<dyn Fn(NetworkGroup) -> Vec<Node> + Send + Sync>;

/// Capacity of the user-edit notification channel
const EDIT_CHANNEL_CAPACITY: usize = 64;

struct GroupSlot {
    write: Mutex<()>,
    nodes: watch::Sender<Vec<Node>>,
    fastest: watch::Sender<bool>,
    /// Shipped defaults the user removed; only touched under `write`
    removed: Mutex<BTreeSet<NodeId>>,
}

/// Per-process registry of every group's nodes
pub struct NodeRegistry {
    slots: Vec<GroupSlot>,
    store: Arc<dyn NodeStore>,
    defaults: DefaultsProvider,
    edits: broadcast::Sender<NetworkGroup>,
}

impl NodeRegistry {
    /// Restore every group from `store`, seeding the built-in defaults
    pub fn new(store: Arc<dyn NodeStore>, params: &ParamsTable) -> Self {
        Self::with_defaults(store, params, Arc::new(default_nodes))
    }

    /// Restore every group from `store` with a custom default set
    pub fn with_defaults(
        store: Arc<dyn NodeStore>,
        params: &ParamsTable,
        defaults: DefaultsProvider,
    ) -> Self {
        let slots = NetworkGroup::ALL
            .iter()
            .map(|&group| {
                let (nodes, removed) = restore_group(store.as_ref(), group, &defaults);
                let fastest = match store.load_fastest(group) {
                    Ok(Some(value)) => value,
                    Ok(None) => params.get(group).default_fastest,
                    Err(e) => {
                        tracing::warn!(group = %group, error = %e, "failed to load fastest-node preference");
                        params.get(group).default_fastest
                    }
                };

                GroupSlot {
                    write: Mutex::new(()),
                    nodes: watch::Sender::new(nodes),
                    fastest: watch::Sender::new(fastest),
                    removed: Mutex::new(removed),
                }
            })
            .collect();

        let (edits, _) = broadcast::channel(EDIT_CHANNEL_CAPACITY);

        Self {
            slots,
            store,
            defaults,
            edits,
        }
    }

    fn slot(&self, group: NetworkGroup) -> &GroupSlot {
        &self.slots[group.index()]
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current ordered snapshot of a group
    pub fn list(&self, group: NetworkGroup) -> Vec<Node> {
        self.slot(group).nodes.borrow().clone()
    }

    /// One node by id
    pub fn get(&self, group: NetworkGroup, id: NodeId) -> Option<Node> {
        self.slot(group)
            .nodes
            .borrow()
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    /// Live, replay-latest view of a group's list
    pub fn observe(&self, group: NetworkGroup) -> watch::Receiver<Vec<Node>> {
        self.slot(group).nodes.subscribe()
    }

    /// Groups edited by the user; each message asks for a health check
    pub fn subscribe_edits(&self) -> broadcast::Receiver<NetworkGroup> {
        self.edits.subscribe()
    }

    /// Whether a request could be routed right now, counting the
    /// still-synchronizing fallback the selector resorts to
    pub fn has_usable_node(&self, group: NetworkGroup) -> bool {
        selector::pick(&self.slot(group).nodes.borrow(), false).rest.is_some()
    }

    /// Whether any enabled node of the group is currently allowed
    pub fn has_allowed_node(&self, group: NetworkGroup) -> bool {
        self.slot(group).nodes.borrow().iter().any(Node::is_allowed)
    }

    /// Whether requests prefer the fastest node over list order
    pub fn prefer_fastest(&self, group: NetworkGroup) -> bool {
        *self.slot(group).fastest.borrow()
    }

    pub fn observe_prefer_fastest(&self, group: NetworkGroup) -> watch::Receiver<bool> {
        self.slot(group).fastest.subscribe()
    }

    // ========================================================================
    // User edits
    // ========================================================================

    /// Append a node; a node with the same main origin is not added twice
    pub fn add(&self, group: NetworkGroup, node: Node) -> bool {
        self.write(group, true, |nodes| {
            if nodes.iter().any(|n| n.id == node.id || n.main_origin == node.main_origin) {
                return;
            }
            tracing::info!(group = %group, node = %node.id, origin = %node.main_origin, "node added");
            nodes.push(node);
        })
    }

    /// Remove a node. Removing the last node restores the defaults.
    ///
    /// A removed default is remembered so it is not restored on the next
    /// start.
    pub fn remove(&self, group: NetworkGroup, id: NodeId) -> bool {
        self.write(group, true, |nodes| {
            let Some(pos) = nodes.iter().position(|n| n.id == id) else {
                return;
            };
            let node = nodes.remove(pos);

            if nodes.is_empty() {
                tracing::info!(group = %group, "last node removed, restoring defaults");
                *nodes = (self.defaults)(group);
                self.set_removed(group, |removed| removed.clear());
            } else if !node.is_custom() {
                self.set_removed(group, |removed| {
                    removed.insert(node.id);
                });
            }
        })
    }

    /// Mutate one node in place
    pub fn update<F>(&self, group: NetworkGroup, id: NodeId, mutate: F) -> bool
    where
        F: FnOnce(&mut Node),
    {
        self.write(group, true, |nodes| {
            if let Some(node) = nodes.iter_mut().find(|n| n.id == id) {
                mutate(node);
            }
        })
    }

    /// Enable or disable a node; its stored status is left alone
    pub fn set_enabled(&self, group: NetworkGroup, id: NodeId, enabled: bool) -> bool {
        self.update(group, id, |node| node.enabled = enabled)
    }

    /// Replace a group's list with the shipped defaults
    pub fn reset(&self, group: NetworkGroup) -> bool {
        let fresh = (self.defaults)(group);
        self.write(group, true, |nodes| {
            *nodes = fresh;
            self.set_removed(group, |removed| removed.clear());
        })
    }

    /// Update and persist the removed-defaults set; call under the write lock
    fn set_removed<F>(&self, group: NetworkGroup, f: F)
    where
        F: FnOnce(&mut BTreeSet<NodeId>),
    {
        let mut removed = self.slot(group).removed.lock();
        let before = removed.clone();
        f(&mut removed);
        if *removed == before {
            return;
        }

        let ids: Vec<NodeId> = removed.iter().copied().collect();
        if let Err(e) = self.store.save_removed(group, &ids) {
            tracing::warn!(group = %group, error = %e, "failed to persist removed defaults");
        }
    }

    pub fn set_prefer_fastest(&self, group: NetworkGroup, value: bool) -> bool {
        let slot = self.slot(group);
        let _guard = slot.write.lock();
        let changed = slot.fastest.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });

        if changed {
            if let Err(e) = self.store.save_fastest(group, value) {
                tracing::warn!(group = %group, error = %e, "failed to persist fastest-node preference");
            }
        }
        changed
    }

    // ========================================================================
    // Health updates
    // ========================================================================

    /// Apply a health observation to one node without asking for a new check
    pub fn record_health<F>(&self, group: NetworkGroup, id: NodeId, mutate: F) -> bool
    where
        F: FnOnce(&mut Node),
    {
        self.write(group, false, |nodes| {
            if let Some(node) = nodes.iter_mut().find(|n| n.id == id) {
                mutate(node);
            }
        })
    }

    /// Mark a node offline after a failed request
    pub fn mark_offline(&self, group: NetworkGroup, id: NodeId) -> bool {
        let changed = self.record_health(group, id, |node| {
            node.status = Some(ConnectionStatus::Offline);
        });
        if changed {
            tracing::info!(group = %group, node = %id, "node marked offline");
        }
        changed
    }

    /// Serialized, deduplicated, persisted write of one group
    fn write<F>(&self, group: NetworkGroup, user_edit: bool, f: F) -> bool
    where
        F: FnOnce(&mut Vec<Node>),
    {
        let slot = self.slot(group);
        let _guard = slot.write.lock();

        let changed = slot.nodes.send_if_modified(|nodes| {
            let before = nodes.clone();
            f(nodes);
            *nodes != before
        });

        if changed {
            let snapshot = slot.nodes.borrow().clone();
            if let Err(e) = self.store.save_nodes(group, &snapshot) {
                tracing::warn!(group = %group, error = %e, "failed to persist node list");
            }
            if user_edit {
                // Nobody listening just means no scheduler is running
                let _ = self.edits.send(group);
            }
        }

        changed
    }
}

/// Load one group, merge it with the defaults, and forget stale statuses.
///
/// Also returns the set of defaults the user removed.
fn restore_group(
    store: &dyn NodeStore,
    group: NetworkGroup,
    defaults: &DefaultsProvider,
) -> (Vec<Node>, BTreeSet<NodeId>) {
    let shipped = defaults(group);

    let stored = match store.load_nodes(group) {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!(group = %group, error = %e, "failed to load node list, using defaults");
            None
        }
    };

    let Some(stored) = stored else {
        return (shipped, BTreeSet::new());
    };

    let removed: BTreeSet<NodeId> = match store.load_removed(group) {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            tracing::warn!(group = %group, error = %e, "failed to load removed defaults");
            BTreeSet::new()
        }
    };

    let mut nodes = merge_with_defaults(stored, shipped.clone(), &removed);
    if nodes.is_empty() {
        return (shipped, BTreeSet::new());
    }

    // Health from a previous session is not evidence of current health
    for node in &mut nodes {
        node.status = None;
    }
    (nodes, removed)
}
