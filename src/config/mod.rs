//! Cache and Node Configuration
//!
//! Configuration reaches the platform cache subsystem from two equivalent
//! sources: in-process builders, or a declarative YAML/JSON file. Both
//! produce the same [`DistributedCacheConfig`] shape.
//!
//! # Example
//!
//! ```yaml
//! instance_name: node_0
//! client_mode: false
//! user_attributes:
//!   test_attribute: filtered
//! caches:
//!   - name: cache
//!     mode: partitioned
//!     backups: 1
//!     platform_cache:
//!       node_filter:
//!         kind: match_attribute
//!         key: test_attribute
//!         value: filtered
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cluster::{AttributeValue, NodeRole};
use crate::error::{Error, Result};
use crate::filter::NodeFilter;

// =============================================================================
// Cache Mode
// =============================================================================

/// Distribution mode of the backing cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Data split into partitions with `backups` extra copies
    #[default]
    Partitioned,
    /// Full copy on every server node
    Replicated,
}

impl std::fmt::Display for CacheMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheMode::Partitioned => write!(f, "partitioned"),
            CacheMode::Replicated => write!(f, "replicated"),
        }
    }
}

// =============================================================================
// Platform Cache Configuration
// =============================================================================

fn default_enabled() -> bool {
    true
}

/// Platform (near) cache settings of a distributed cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCacheConfig {
    /// Explicit opt-out; when false no node hosts a platform cache
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Nodes allowed to host the platform cache; `None` means all
    #[serde(default)]
    pub node_filter: Option<NodeFilter>,
}

impl Default for PlatformCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            node_filter: None,
        }
    }
}

impl PlatformCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_filter(mut self, filter: NodeFilter) -> Self {
        self.node_filter = Some(filter);
        self
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            node_filter: None,
        }
    }
}

// =============================================================================
// Distributed Cache Configuration
// =============================================================================

/// Configuration of a distributed cache.
///
/// Immutable once the cache exists in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributedCacheConfig {
    /// Cluster-unique cache name
    pub name: String,
    /// Distribution mode
    #[serde(default)]
    pub mode: CacheMode,
    /// Backup copies per partition (ignored for replicated caches)
    #[serde(default)]
    pub backups: u32,
    /// Platform cache settings
    #[serde(default)]
    pub platform_cache: Option<PlatformCacheConfig>,
}

impl DistributedCacheConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: CacheMode::default(),
            backups: 0,
            platform_cache: None,
        }
    }

    pub fn with_mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_backups(mut self, backups: u32) -> Self {
        self.backups = backups;
        self
    }

    pub fn with_platform_cache(mut self, platform_cache: PlatformCacheConfig) -> Self {
        self.platform_cache = Some(platform_cache);
        self
    }

    /// Shorthand for a platform cache restricted by `filter`
    pub fn with_node_filter(self, filter: NodeFilter) -> Self {
        self.with_platform_cache(PlatformCacheConfig::new().with_node_filter(filter))
    }

    /// The configured node filter, if any
    pub fn node_filter(&self) -> Option<&NodeFilter> {
        self.platform_cache
            .as_ref()
            .and_then(|p| p.node_filter.as_ref())
    }

    /// Backups that actually apply for this mode
    pub fn effective_backups(&self) -> u32 {
        match self.mode {
            CacheMode::Partitioned => self.backups,
            CacheMode::Replicated => 0,
        }
    }

    /// Structural validation; a failure here rejects the cache outright.
    ///
    /// Filter problems are not checked here: a malformed filter leaves the
    /// cache running without a platform cache instead.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("cache name must not be empty".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Node Configuration
// =============================================================================

/// Startup configuration of a single node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Logical instance name, unique in the cluster
    pub instance_name: String,
    /// Start as a client node
    #[serde(default)]
    pub client_mode: bool,
    /// User attributes published to the cluster
    #[serde(default)]
    pub user_attributes: BTreeMap<String, AttributeValue>,
    /// Statically configured caches
    #[serde(default)]
    pub caches: Vec<DistributedCacheConfig>,
}

impl NodeConfig {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            client_mode: false,
            user_attributes: BTreeMap::new(),
            caches: Vec::new(),
        }
    }

    pub fn client(mut self, client_mode: bool) -> Self {
        self.client_mode = client_mode;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.user_attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_cache(mut self, cache: DistributedCacheConfig) -> Self {
        self.caches.push(cache);
        self
    }

    pub fn role(&self) -> NodeRole {
        if self.client_mode {
            NodeRole::Client
        } else {
            NodeRole::Server
        }
    }

    /// Checks that make the node itself unusable.
    ///
    /// Problems with individual static caches are reported by
    /// [`NodeConfig::static_caches`] instead and never stop the node.
    pub fn validate(&self) -> Result<()> {
        if self.instance_name.trim().is_empty() {
            return Err(Error::Config("instance name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Split the static caches into usable configs and configuration errors.
    ///
    /// Caches with an invalid config are rejected. For a name configured more
    /// than once the first entry is kept.
    pub fn static_caches(&self) -> (Vec<&DistributedCacheConfig>, Vec<Error>) {
        let mut accepted = Vec::with_capacity(self.caches.len());
        let mut rejected = Vec::new();
        let mut seen = BTreeSet::new();
        for cache in &self.caches {
            if let Err(e) = cache.validate() {
                rejected.push(e);
            } else if !seen.insert(cache.name.as_str()) {
                rejected.push(Error::Config(format!(
                    "cache {} configured twice on node {}, keeping the first",
                    cache.name, self.instance_name
                )));
            } else {
                accepted.push(cache);
            }
        }
        (accepted, rejected)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_file(path.as_ref())
    }
}

// =============================================================================
// Cluster File
// =============================================================================

/// Cache created at runtime from a given node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicCacheEntry {
    /// Instance name of the creating node
    pub created_by: String,
    /// Cache configuration
    pub cache: DistributedCacheConfig,
}

/// Declarative description of a whole cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterFile {
    /// Nodes, started in order
    pub nodes: Vec<NodeConfig>,
    /// Caches created after all nodes are up
    #[serde(default)]
    pub dynamic_caches: Vec<DynamicCacheEntry>,
}

impl ClusterFile {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_file(path.as_ref())
    }

    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            node.validate()?;
        }
        for entry in &self.dynamic_caches {
            entry.cache.validate()?;
            if !self.nodes.iter().any(|n| n.instance_name == entry.created_by) {
                return Err(Error::Config(format!(
                    "cache {} created by unknown node {}",
                    entry.cache.name, entry.created_by
                )));
            }
        }
        Ok(())
    }
}

fn load_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(serde_json::from_str(&contents)?),
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&contents)?),
        other => Err(Error::Config(format!(
            "unsupported configuration file extension {:?} for {}",
            other,
            path.display()
        ))),
    }
}

// =============================================================================
// Tests
// =============================================================================
