//! Network groups and their health-check tuning

use crate::error::ConfigError;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One blockchain or service network with its own pool of candidate nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkGroup {
    /// Native ADAMANT ledger
    Adm,
    /// Bitcoin
    Btc,
    /// Ethereum and ERC20 tokens
    Eth,
    /// Klayr core nodes
    KlyNode,
    /// Klayr indexer service
    KlyService,
    /// Dogecoin
    Doge,
    /// Dash
    Dash,
    /// File storage gateway
    Ipfs,
    /// Currency rates / info service
    InfoService,
}

impl NetworkGroup {
    /// Every group, in a stable order
    pub const ALL: [NetworkGroup; 9] = [
        NetworkGroup::Adm,
        NetworkGroup::Btc,
        NetworkGroup::Eth,
        NetworkGroup::KlyNode,
        NetworkGroup::KlyService,
        NetworkGroup::Doge,
        NetworkGroup::Dash,
        NetworkGroup::Ipfs,
        NetworkGroup::InfoService,
    ];

    /// Position in [`NetworkGroup::ALL`]
    pub fn index(&self) -> usize {
        match self {
            NetworkGroup::Adm => 0,
            NetworkGroup::Btc => 1,
            NetworkGroup::Eth => 2,
            NetworkGroup::KlyNode => 3,
            NetworkGroup::KlyService => 4,
            NetworkGroup::Doge => 5,
            NetworkGroup::Dash => 6,
            NetworkGroup::Ipfs => 7,
            NetworkGroup::InfoService => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkGroup::Adm => "adm",
            NetworkGroup::Btc => "btc",
            NetworkGroup::Eth => "eth",
            NetworkGroup::KlyNode => "kly_node",
            NetworkGroup::KlyService => "kly_service",
            NetworkGroup::Doge => "doge",
            NetworkGroup::Dash => "dash",
            NetworkGroup::Ipfs => "ipfs",
            NetworkGroup::InfoService => "info_service",
        }
    }
}

impl fmt::Display for NetworkGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkGroup {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        NetworkGroup::ALL
            .into_iter()
            .find(|g| g.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownGroup(s.to_string()))
    }
}

/// Health-check tuning for one network group.
///
/// Intervals of `None` mean the group is never checked on a timer, only on
/// explicit triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupParams {
    /// Timer interval while nothing is wrong and the node screen is hidden
    pub normal_interval: Option<Duration>,
    /// Timer interval while the group has no allowed node
    pub crucial_interval: Option<Duration>,
    /// Timer interval while the group's node list is on screen
    pub on_screen_interval: Option<Duration>,
    /// Age after which the last completed cycle is considered stale
    pub stale_after: Duration,
    /// Nodes reporting an older version are not allowed
    pub min_version: Option<Version>,
    /// Tolerated block-height lag behind the best node of a cycle
    pub height_epsilon: u64,
    /// Whether the fastest node is preferred before the user chooses
    pub default_fastest: bool,
    /// Timeout for a single status probe
    pub probe_timeout: Duration,
}

fn secs(s: u64) -> Option<Duration> {
    Some(Duration::from_secs(s))
}

impl GroupParams {
    /// Built-in tuning for a group
    pub fn defaults(group: NetworkGroup) -> Self {
        let base = Self {
            normal_interval: secs(300),
            crucial_interval: secs(30),
            on_screen_interval: secs(10),
            stale_after: Duration::from_secs(1800),
            min_version: None,
            height_epsilon: 0,
            default_fastest: true,
            probe_timeout: Duration::from_secs(10),
        };

        match group {
            NetworkGroup::Adm => Self {
                normal_interval: secs(300),
                crucial_interval: secs(30),
                min_version: Some(Version::new(0, 8, 0)),
                height_epsilon: 10,
                default_fastest: false,
                ..base
            },
            NetworkGroup::Btc => Self {
                normal_interval: secs(360),
                crucial_interval: secs(60),
                height_epsilon: 2,
                ..base
            },
            NetworkGroup::Eth => Self {
                normal_interval: secs(300),
                crucial_interval: secs(30),
                height_epsilon: 5,
                ..base
            },
            NetworkGroup::KlyNode | NetworkGroup::KlyService => Self {
                normal_interval: secs(270),
                crucial_interval: secs(30),
                height_epsilon: 5,
                ..base
            },
            NetworkGroup::Doge | NetworkGroup::Dash => Self {
                normal_interval: secs(390),
                crucial_interval: secs(60),
                height_epsilon: 3,
                ..base
            },
            NetworkGroup::Ipfs => Self {
                normal_interval: secs(210),
                crucial_interval: secs(30),
                default_fastest: false,
                ..base
            },
            NetworkGroup::InfoService => Self {
                normal_interval: secs(210),
                crucial_interval: secs(30),
                on_screen_interval: secs(10),
                stale_after: Duration::from_secs(1800),
                default_fastest: false,
                ..base
            },
        }
    }

    /// Timer interval given the group's current state
    pub fn interval(&self, has_allowed_node: bool, on_screen: bool) -> Option<Duration> {
        if !has_allowed_node {
            return self.crucial_interval;
        }
        if on_screen {
            self.on_screen_interval
        } else {
            self.normal_interval
        }
    }

    /// Whether a reported version satisfies the group minimum
    pub fn accepts_version(&self, version: Option<&Version>) -> bool {
        match (&self.min_version, version) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(min), Some(v)) => v >= min,
        }
    }
}

/// Effective parameters for every group
#[derive(Debug, Clone, Default)]
pub struct ParamsTable {
    overrides: HashMap<NetworkGroup, GroupParams>,
}

impl ParamsTable {
    /// Table with built-in defaults only
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the parameters of one group
    pub fn with(mut self, group: NetworkGroup, params: GroupParams) -> Self {
        self.overrides.insert(group, params);
        self
    }

    /// Set the parameters of one group
    pub fn set(&mut self, group: NetworkGroup, params: GroupParams) {
        self.overrides.insert(group, params);
    }

    /// Parameters for a group
    pub fn get(&self, group: NetworkGroup) -> GroupParams {
        self.overrides
            .get(&group)
            .cloned()
            .unwrap_or_else(|| GroupParams::defaults(group))
    }
}
