//! Persistence of node lists
//!
//! The registry only needs to read a group's list at startup and write it
//! after every change. The serialized form is a versioned JSON envelope.

use crate::config::NetworkGroup;
use crate::error::StoreError;
use crate::node::{Node, NodeId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Current envelope version
pub const STORE_VERSION: u32 = 1;

/// Everything the registry persists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedNodes {
    pub version: u32,
    #[serde(default)]
    pub groups: BTreeMap<NetworkGroup, Vec<Node>>,
    /// Fastest-node preference per group
    #[serde(default)]
    pub fastest: BTreeMap<NetworkGroup, bool>,
    /// Shipped defaults the user removed, per group
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub removed: BTreeMap<NetworkGroup, Vec<NodeId>>,
}

impl Default for PersistedNodes {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            groups: BTreeMap::new(),
            fastest: BTreeMap::new(),
            removed: BTreeMap::new(),
        }
    }
}

impl PersistedNodes {
    fn set_removed(&mut self, group: NetworkGroup, ids: &[NodeId]) {
        if ids.is_empty() {
            self.removed.remove(&group);
        } else {
            self.removed.insert(group, ids.to_vec());
        }
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::WriteError(e.to_string()))
    }

    /// Decode an envelope, rejecting versions newer than this build understands
    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        #[derive(Deserialize)]
        struct Header {
            version: u32,
        }

        let header: Header =
            serde_json::from_str(raw).map_err(|e| StoreError::Corrupted(e.to_string()))?;
        if header.version > STORE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                expected: STORE_VERSION,
                found: header.version,
            });
        }

        serde_json::from_str(raw).map_err(|e| StoreError::Corrupted(e.to_string()))
    }
}

/// External node-storage collaborator.
///
/// Calls happen under the registry's per-group write lock, so
/// implementations should be quick.
pub trait NodeStore: Send + Sync {
    /// Stored list for a group, `None` if the group was never saved
    fn load_nodes(&self, group: NetworkGroup) -> Result<Option<Vec<Node>>, StoreError>;

    fn save_nodes(&self, group: NetworkGroup, nodes: &[Node]) -> Result<(), StoreError>;

    fn load_fastest(&self, group: NetworkGroup) -> Result<Option<bool>, StoreError>;

    fn save_fastest(&self, group: NetworkGroup, value: bool) -> Result<(), StoreError>;

    /// Ids of shipped defaults the user removed from a group
    fn load_removed(&self, group: NetworkGroup) -> Result<Vec<NodeId>, StoreError>;

    fn save_removed(&self, group: NetworkGroup, ids: &[NodeId]) -> Result<(), StoreError>;
}

/// In-memory store, for tests and for hosts that persist elsewhere
#[derive(Default)]
pub struct MemoryNodeStore {
    state: Mutex<PersistedNodes>,
    writes: AtomicUsize,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful node-list writes
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of everything stored
    pub fn snapshot(&self) -> PersistedNodes {
        self.state.lock().clone()
    }
}

impl NodeStore for MemoryNodeStore {
    fn load_nodes(&self, group: NetworkGroup) -> Result<Option<Vec<Node>>, StoreError> {
        Ok(self.state.lock().groups.get(&group).cloned())
    }

    fn save_nodes(&self, group: NetworkGroup, nodes: &[Node]) -> Result<(), StoreError> {
        self.state.lock().groups.insert(group, nodes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_fastest(&self, group: NetworkGroup) -> Result<Option<bool>, StoreError> {
        Ok(self.state.lock().fastest.get(&group).copied())
    }

    fn save_fastest(&self, group: NetworkGroup, value: bool) -> Result<(), StoreError> {
        self.state.lock().fastest.insert(group, value);
        Ok(())
    }

    fn load_removed(&self, group: NetworkGroup) -> Result<Vec<NodeId>, StoreError> {
        Ok(self.state.lock().removed.get(&group).cloned().unwrap_or_default())
    }

    fn save_removed(&self, group: NetworkGroup, ids: &[NodeId]) -> Result<(), StoreError> {
        self.state.lock().set_removed(group, ids);
        Ok(())
    }
}

/// JSON file store, rewritten atomically on every save
pub struct FileNodeStore {
    path: PathBuf,
    state: Mutex<PersistedNodes>,
}

impl FileNodeStore {
    /// Open a store; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::ReadError(format!("{}: {}", path.display(), e)))?;
            PersistedNodes::from_json(&raw)?
        } else {
            PersistedNodes::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Open a store, starting empty if the file cannot be used
    pub fn open_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(path.clone()) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable node list");
                Self {
                    path,
                    state: Mutex::new(PersistedNodes::default()),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, state: &PersistedNodes) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::WriteError(format!("Failed to create directory: {}", e)))?;
        }

        let content = state.to_json()?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| StoreError::WriteError(format!("{}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| StoreError::WriteError(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

impl NodeStore for FileNodeStore {
    fn load_nodes(&self, group: NetworkGroup) -> Result<Option<Vec<Node>>, StoreError> {
        Ok(self.state.lock().groups.get(&group).cloned())
    }

    fn save_nodes(&self, group: NetworkGroup, nodes: &[Node]) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.groups.insert(group, nodes.to_vec());
        self.flush(&state)
    }

    fn load_fastest(&self, group: NetworkGroup) -> Result<Option<bool>, StoreError> {
        Ok(self.state.lock().fastest.get(&group).copied())
    }

    fn save_fastest(&self, group: NetworkGroup, value: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.fastest.insert(group, value);
        self.flush(&state)
    }

    fn load_removed(&self, group: NetworkGroup) -> Result<Vec<NodeId>, StoreError> {
        Ok(self.state.lock().removed.get(&group).cloned().unwrap_or_default())
    }

    fn save_removed(&self, group: NetworkGroup, ids: &[NodeId]) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.set_removed(group, ids);
        self.flush(&state)
    }
}
