//! Configuration file handling

use super::{GroupParams, NetworkGroup, ParamsTable};
use crate::error::{ConfigError, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Global settings
    #[serde(default)]
    pub settings: Settings,

    /// Per-group health-check overrides, keyed by group name
    #[serde(default)]
    pub groups: BTreeMap<String, GroupOverride>,
}

/// Global settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Transport request timeout in seconds
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// Max probes in flight per health-check cycle
    #[serde(default = "default_parallel_probes")]
    pub max_parallel_probes: usize,

    /// Where the node list is persisted
    #[serde(default)]
    pub nodes_file: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    15
}

fn default_parallel_probes() -> usize {
    16
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout(),
            max_parallel_probes: default_parallel_probes(),
            nodes_file: None,
        }
    }
}

/// Optional overrides of one group's [`GroupParams`].
///
/// Interval values of `0` disable the timer for that state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupOverride {
    #[serde(default)]
    pub normal_interval_secs: Option<u64>,
    #[serde(default)]
    pub crucial_interval_secs: Option<u64>,
    #[serde(default)]
    pub on_screen_interval_secs: Option<u64>,
    #[serde(default)]
    pub stale_after_secs: Option<u64>,
    /// Minimum node version, e.g. "0.8.0"
    #[serde(default)]
    pub min_version: Option<String>,
    #[serde(default)]
    pub height_epsilon: Option<u64>,
    #[serde(default)]
    pub prefer_fastest: Option<bool>,
    #[serde(default)]
    pub probe_timeout_secs: Option<u64>,
}

fn interval(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl GroupOverride {
    /// Apply this override on top of `params`
    pub fn apply(&self, mut params: GroupParams) -> std::result::Result<GroupParams, ConfigError> {
        if let Some(s) = self.normal_interval_secs {
            params.normal_interval = interval(s);
        }
        if let Some(s) = self.crucial_interval_secs {
            params.crucial_interval = interval(s);
        }
        if let Some(s) = self.on_screen_interval_secs {
            params.on_screen_interval = interval(s);
        }
        if let Some(s) = self.stale_after_secs {
            params.stale_after = Duration::from_secs(s);
        }
        if let Some(v) = &self.min_version {
            let version = Version::parse(v.trim())
                .map_err(|e| ConfigError::InvalidVersion(format!("{}: {}", v, e)))?;
            params.min_version = Some(version);
        }
        if let Some(eps) = self.height_epsilon {
            params.height_epsilon = eps;
        }
        if let Some(fastest) = self.prefer_fastest {
            params.default_fastest = fastest;
        }
        if let Some(s) = self.probe_timeout_secs {
            params.probe_timeout = Duration::from_secs(s.max(1));
        }
        Ok(params)
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Default location of the persisted node list
    pub fn default_nodes_path() -> PathBuf {
        Self::config_dir().join("nodes.json")
    }

    fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("node-sentinel")
    }

    /// Load from default path
    pub fn load_default() -> Result<Option<Self>> {
        let path = Self::default_path();
        if path.exists() {
            Ok(Some(Self::load(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Load from a specific path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {}", path.display(), e)))?;

        let config: Self = toml::from_str(&content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Save to a specific path
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidFile(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Save to default path
    pub fn save_default(&self) -> Result<()> {
        self.save(&Self::default_path())
    }

    /// Effective node list path
    pub fn nodes_path(&self) -> PathBuf {
        self.settings
            .nodes_file
            .clone()
            .unwrap_or_else(Self::default_nodes_path)
    }

    /// Effective parameters for one group
    pub fn params_for(&self, group: NetworkGroup) -> Result<GroupParams> {
        let base = GroupParams::defaults(group);
        let found = self
            .groups
            .iter()
            .find(|(name, _)| name.parse::<NetworkGroup>().ok() == Some(group));

        match found {
            Some((_, ov)) => Ok(ov.apply(base)?),
            None => Ok(base),
        }
    }

    /// Build the full parameter table, rejecting unknown group names
    pub fn params_table(&self) -> Result<ParamsTable> {
        let mut table = ParamsTable::new();
        for (name, ov) in &self.groups {
            let group: NetworkGroup = name.parse()?;
            table.set(group, ov.apply(GroupParams::defaults(group))?);
        }
        Ok(table)
    }

    /// Transport timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout_secs.max(1))
    }
}
