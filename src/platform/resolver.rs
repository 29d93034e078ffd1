//! Cache Topology Resolver
//!
//! Decides which nodes host a platform cache for a distributed cache. The
//! decision is a pure function of the cache configuration and the node's
//! attributes, so every node can derive it on its own without a
//! coordinator, and static and dynamic starts agree.

use tracing::warn;

use crate::cluster::{ClusterNode, NodeId};
use crate::config::DistributedCacheConfig;

/// Why a node does not host a platform cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InactiveReason {
    /// Platform cache explicitly disabled in the configuration
    Disabled,
    /// Node filter evaluated to false
    FilterMismatch,
    /// Node filter is malformed
    InvalidFilter(String),
    /// Node filter could not be evaluated on this node
    FilterError(String),
}

impl std::fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InactiveReason::Disabled => write!(f, "platform cache disabled"),
            InactiveReason::FilterMismatch => write!(f, "node filter mismatch"),
            InactiveReason::InvalidFilter(e) => write!(f, "invalid node filter: {}", e),
            InactiveReason::FilterError(e) => write!(f, "node filter failed: {}", e),
        }
    }
}

/// Outcome of evaluating a cache configuration against one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Active,
    Inactive(InactiveReason),
}

impl Verdict {
    pub fn is_active(&self) -> bool {
        matches!(self, Verdict::Active)
    }
}

/// Stateless resolver
pub struct TopologyResolver;

impl TopologyResolver {
    /// Evaluate the configuration against a single node, failing closed.
    ///
    /// No platform cache settings, or settings without a filter, select
    /// every node.
    pub fn evaluate(config: &DistributedCacheConfig, node: &ClusterNode) -> Verdict {
        let Some(platform) = &config.platform_cache else {
            return Verdict::Active;
        };
        if !platform.enabled {
            return Verdict::Inactive(InactiveReason::Disabled);
        }
        let Some(filter) = &platform.node_filter else {
            return Verdict::Active;
        };

        if let Err(e) = filter.validate() {
            warn!(cache = %config.name, node = %node.name(), error = %e, "Malformed node filter");
            return Verdict::Inactive(InactiveReason::InvalidFilter(e.to_string()));
        }

        match filter.evaluate(node) {
            Ok(true) => Verdict::Active,
            Ok(false) => Verdict::Inactive(InactiveReason::FilterMismatch),
            Err(e) => {
                warn!(cache = %config.name, node = %node.name(), error = %e, "Node filter evaluation failed");
                Verdict::Inactive(InactiveReason::FilterError(e.to_string()))
            }
        }
    }

    /// Nodes, out of `nodes`, that should host the platform cache.
    ///
    /// Preserves the input order.
    pub fn resolve(config: &DistributedCacheConfig, nodes: &[ClusterNode]) -> Vec<NodeId> {
        nodes
            .iter()
            .filter(|node| Self::evaluate(config, node).is_active())
            .map(ClusterNode::id)
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::cluster::{AttributeValue, NodeAttributes, NodeRole};
    use crate::config::{CacheMode, PlatformCacheConfig};
    use crate::filter::NodeFilter;

    fn cluster(n: usize) -> Vec<ClusterNode> {
        (0..n)
            .map(|i| {
                let role = if i == n - 1 {
                    NodeRole::Client
                } else {
                    NodeRole::Server
                };
                ClusterNode::new(format!("node_{}", i), role, BTreeMap::new())
            })
            .collect()
    }

    fn ids(nodes: &[ClusterNode], idxs: &[usize]) -> Vec<NodeId> {
        idxs.iter().map(|&i| nodes[i].id()).collect()
    }

    #[test]
    fn test_no_platform_config_selects_all() {
        let nodes = cluster(4);
        let cfg = DistributedCacheConfig::new("cache");
        assert_eq!(TopologyResolver::resolve(&cfg, &nodes), ids(&nodes, &[0, 1, 2, 3]));
    }

    #[test]
    fn test_no_filter_selects_all() {
        let nodes = cluster(4);
        let cfg = DistributedCacheConfig::new("cache")
            .with_mode(CacheMode::Replicated)
            .with_platform_cache(PlatformCacheConfig::new());
        assert_eq!(TopologyResolver::resolve(&cfg, &nodes), ids(&nodes, &[0, 1, 2, 3]));
    }

    #[test]
    fn test_disabled_selects_none() {
        let nodes = cluster(4);
        let cfg =
            DistributedCacheConfig::new("cache").with_platform_cache(PlatformCacheConfig::disabled());
        assert!(TopologyResolver::resolve(&cfg, &nodes).is_empty());
        assert_eq!(
            TopologyResolver::evaluate(&cfg, &nodes[0]),
            Verdict::Inactive(InactiveReason::Disabled)
        );
    }

    #[test]
    fn test_name_filter_selects_subset() {
        let nodes = cluster(4);
        let cfg = DistributedCacheConfig::new("cache")
            .with_node_filter(NodeFilter::match_names(["node_0", "node_1"]));

        assert_eq!(TopologyResolver::resolve(&cfg, &nodes), ids(&nodes, &[0, 1]));
        assert_eq!(
            TopologyResolver::evaluate(&cfg, &nodes[2]),
            Verdict::Inactive(InactiveReason::FilterMismatch)
        );
    }

    #[test]
    fn test_name_filter_matches_client_node() {
        let nodes = cluster(4);
        let cfg = DistributedCacheConfig::new("cache")
            .with_node_filter(NodeFilter::match_names(["node_0", "node_3"]));
        assert_eq!(TopologyResolver::resolve(&cfg, &nodes), ids(&nodes, &[0, 3]));
    }

    #[test]
    fn test_invalid_filter_fails_closed() {
        let nodes = cluster(2);
        let cfg = DistributedCacheConfig::new("cache")
            .with_node_filter(NodeFilter::match_names(Vec::<String>::new()));

        assert!(TopologyResolver::resolve(&cfg, &nodes).is_empty());
        assert!(matches!(
            TopologyResolver::evaluate(&cfg, &nodes[0]),
            Verdict::Inactive(InactiveReason::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_evaluation_error_fails_closed() {
        let ghost = ClusterNode::from_parts(
            NodeId::random(),
            "node_0",
            NodeRole::Server,
            [("zone".to_string(), AttributeValue::from("eu"))]
                .into_iter()
                .collect::<NodeAttributes>(),
        );
        let cfg = DistributedCacheConfig::new("cache")
            .with_node_filter(NodeFilter::match_names(["node_0"]));

        assert!(matches!(
            TopologyResolver::evaluate(&cfg, &ghost),
            Verdict::Inactive(InactiveReason::FilterError(_))
        ));
    }

    #[test]
    fn test_self_evaluation_agrees_with_resolution() {
        let nodes = cluster(4);
        let cfg = DistributedCacheConfig::new("cache")
            .with_node_filter(NodeFilter::match_names(["node_1", "node_2"]));

        let resolved = TopologyResolver::resolve(&cfg, &nodes);
        for node in &nodes {
            assert_eq!(
                TopologyResolver::evaluate(&cfg, node).is_active(),
                resolved.contains(&node.id())
            );
        }
    }
}
