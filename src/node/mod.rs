//! Node descriptors and their connection status

mod defaults;
mod origin;

pub use defaults::default_nodes;
pub use origin::{NodeOrigin, Scheme};

use crate::config::NetworkGroup;
use crate::health::HealthSample;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Stable node identity
pub type NodeId = Uuid;

/// Why a reachable node may not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectedReason {
    OutdatedApiVersion,
}

/// Health state of a node as of its latest probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Last probe failed
    Offline,
    /// Reachable but behind the group's best height.
    /// `is_final` once the lag survived a second cycle.
    Synchronizing { is_final: bool },
    /// Reachable, current and compatible
    Allowed,
    /// Reachable but unusable
    NotAllowed { reason: RejectedReason },
}

/// Where a node came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Added by the user
    Custom,
    /// Shipped with the application; hidden defaults are not listed to users
    Default { hidden: bool },
}

/// Which of a node's origins requests go to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginPreference {
    #[default]
    Main,
    Alt,
}

/// One candidate endpoint of a network group and its last known health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub enabled: bool,
    /// Websocket support as last reported by the node
    #[serde(default)]
    pub ws_enabled: bool,
    #[serde(default)]
    pub ws_port: Option<u16>,
    pub main_origin: NodeOrigin,
    /// Fallback origin, e.g. a CDN in front of the same node
    #[serde(default)]
    pub alt_origin: Option<NodeOrigin>,
    #[serde(default)]
    pub preferred: OriginPreference,
    #[serde(default)]
    pub version: Option<Version>,
    #[serde(default)]
    pub height: Option<u64>,
    /// Round-trip time of the last successful probe
    #[serde(default)]
    pub ping: Option<Duration>,
    /// `None` until the first probe completes
    #[serde(default)]
    pub status: Option<ConnectionStatus>,
    pub kind: NodeKind,
}

impl Node {
    /// A node added by the user
    pub fn custom(origin: NodeOrigin) -> Self {
        Self::with_id(Uuid::new_v4(), origin, NodeKind::Custom)
    }

    /// A shipped default node; its id is derived from group and origin
    pub fn default_for(group: NetworkGroup, origin: NodeOrigin) -> Self {
        let id = Self::default_id(group, &origin);
        Self::with_id(id, origin, NodeKind::Default { hidden: false })
    }

    fn with_id(id: NodeId, origin: NodeOrigin, kind: NodeKind) -> Self {
        Self {
            id,
            enabled: true,
            ws_enabled: false,
            ws_port: None,
            main_origin: origin,
            alt_origin: None,
            preferred: OriginPreference::Main,
            version: None,
            height: None,
            ping: None,
            status: None,
            kind,
        }
    }

    /// Deterministic id of a default node
    pub fn default_id(group: NetworkGroup, origin: &NodeOrigin) -> NodeId {
        let name = format!("{}:{}", group.as_str(), origin.as_url());
        Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
    }

    /// Builder-style setter for the alternate origin
    pub fn with_alt_origin(mut self, origin: NodeOrigin) -> Self {
        self.alt_origin = Some(origin);
        self
    }

    /// Builder-style setter hiding a default node from listings
    pub fn hidden(mut self) -> Self {
        if let NodeKind::Default { .. } = self.kind {
            self.kind = NodeKind::Default { hidden: true };
        }
        self
    }

    /// Origin requests should go to
    pub fn preferred_origin(&self) -> &NodeOrigin {
        match (self.preferred, &self.alt_origin) {
            (OriginPreference::Alt, Some(alt)) => alt,
            _ => &self.main_origin,
        }
    }

    /// The origin not currently preferred, if the node has two
    pub fn other_origin(&self) -> Option<(OriginPreference, &NodeOrigin)> {
        let alt = self.alt_origin.as_ref()?;
        match self.preferred {
            OriginPreference::Main => Some((OriginPreference::Alt, alt)),
            OriginPreference::Alt => Some((OriginPreference::Main, &self.main_origin)),
        }
    }

    /// Origin for a persistent connection, if the node supports one
    pub fn ws_origin(&self) -> Option<NodeOrigin> {
        self.ws_enabled
            .then(|| self.preferred_origin().websocket(self.ws_port))
    }

    /// Whether the node shows up in user-facing listings
    pub fn is_visible(&self) -> bool {
        !matches!(self.kind, NodeKind::Default { hidden: true })
    }

    pub fn is_custom(&self) -> bool {
        self.kind == NodeKind::Custom
    }

    /// Enabled and currently allowed
    pub fn is_allowed(&self) -> bool {
        self.enabled && self.status == Some(ConnectionStatus::Allowed)
    }

    /// Record the raw measurements of a successful probe
    pub fn apply_sample(&mut self, sample: &HealthSample, origin: OriginPreference) {
        self.ping = Some(sample.ping);
        self.height = Some(sample.height);
        self.version = sample.version.clone();
        self.ws_enabled = sample.ws_enabled;
        self.ws_port = sample.ws_port;
        if self.alt_origin.is_some() {
            self.preferred = origin;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(url: &str) -> NodeOrigin {
        NodeOrigin::parse(url).unwrap()
    }

    #[test]
    fn test_default_ids_are_stable() {
        let a = Node::default_for(NetworkGroup::Adm, origin("https://clown.adamant.im"));
        let b = Node::default_for(NetworkGroup::Adm, origin("https://CLOWN.adamant.im/"));
        let other_group = Node::default_for(NetworkGroup::Btc, origin("https://clown.adamant.im"));

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, other_group.id);
        assert_ne!(
            Node::custom(origin("https://x.com")).id,
            Node::custom(origin("https://x.com")).id
        );
    }

    #[test]
    fn test_preferred_origin() {
        let mut node = Node::default_for(NetworkGroup::Ipfs, origin("https://ipfs1.example.com"))
            .with_alt_origin(origin("http://95.216.45.88:44099"));
        assert_eq!(node.preferred_origin().host, "ipfs1.example.com");

        node.preferred = OriginPreference::Alt;
        assert_eq!(node.preferred_origin().host, "95.216.45.88");
        assert_eq!(
            node.other_origin().map(|(p, _)| p),
            Some(OriginPreference::Main)
        );

        let single = Node::custom(origin("https://x.com"));
        assert!(single.other_origin().is_none());
    }

    #[test]
    fn test_apply_sample() {
        let mut node = Node::custom(origin("https://x.com"));
        node.apply_sample(
            &HealthSample {
                ping: Duration::from_millis(120),
                height: 42,
                version: Some(Version::new(0, 9, 0)),
                ws_enabled: true,
                ws_port: Some(36668),
            },
            OriginPreference::Alt,
        );

        assert_eq!(node.height, Some(42));
        assert_eq!(node.ping, Some(Duration::from_millis(120)));
        // No alternate origin, so the preference stays on main
        assert_eq!(node.preferred, OriginPreference::Main);
        assert_eq!(node.ws_origin().unwrap().as_url(), "wss://x.com:36668");
        // Status is the scheduler's call, not the sample's
        assert_eq!(node.status, None);
    }

    #[test]
    fn test_hidden_only_applies_to_defaults() {
        let hidden = Node::default_for(NetworkGroup::Adm, origin("https://a.com")).hidden();
        assert!(!hidden.is_visible());

        let custom = Node::custom(origin("https://b.com")).hidden();
        assert!(custom.is_visible());
    }

    #[test]
    fn test_status_serialization_keeps_payloads() {
        let status = ConnectionStatus::NotAllowed {
            reason: RejectedReason::OutdatedApiVersion,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"state":"not_allowed","reason":"outdated_api_version"}"#);
        assert_eq!(serde_json::from_str::<ConnectionStatus>(&json).unwrap(), status);
    }
}
