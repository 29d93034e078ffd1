//! Property-Based Tests for Node Filters
//!
//! # Test Properties
//!
//! 1. **Determinism**: evaluating a filter twice on the same node agrees
//! 2. **Transmission**: a filter rebuilt from its serialized form gives the
//!    same verdict on every node
//! 3. **Resolver Consistency**: a node's self-evaluation agrees with the
//!    resolution computed over the whole membership
//! 4. **No Filter**: a cache without a filter is active everywhere

#![cfg(test)]

use std::collections::BTreeMap;

use proptest::prelude::*;

use super::NodeFilter;
use crate::cluster::{AttributeValue, ClusterNode, NodeRole};
use crate::config::{CacheMode, DistributedCacheConfig, PlatformCacheConfig};
use crate::platform::TopologyResolver;

// =============================================================================
// Property Strategies
// =============================================================================

fn attribute_value_strategy() -> impl Strategy<Value = AttributeValue> {
    prop_oneof![
        any::<bool>().prop_map(AttributeValue::Bool),
        (0i64..4).prop_map(AttributeValue::Int),
        "[a-c]{1,2}".prop_map(AttributeValue::Str),
    ]
}

fn attributes_strategy() -> impl Strategy<Value = BTreeMap<String, AttributeValue>> {
    prop::collection::btree_map("(zone|rack|tier)", attribute_value_strategy(), 0..3)
}

/// Cluster of 1-6 uniquely named nodes with random roles and attributes
fn cluster_strategy() -> impl Strategy<Value = Vec<ClusterNode>> {
    prop::collection::vec((any::<bool>(), attributes_strategy()), 1..6).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (client, attrs))| {
                let role = if client {
                    NodeRole::Client
                } else {
                    NodeRole::Server
                };
                ClusterNode::new(format!("node_{}", i), role, attrs)
            })
            .collect()
    })
}

fn filter_strategy() -> impl Strategy<Value = NodeFilter> {
    prop_oneof![
        Just(NodeFilter::MatchAll),
        prop::collection::btree_set("node_[0-7]", 0..4)
            .prop_map(|names| NodeFilter::MatchNames { names }),
        ("(zone|rack|tier)", attribute_value_strategy())
            .prop_map(|(key, value)| NodeFilter::MatchAttribute { key, value }),
        attributes_strategy().prop_map(|attributes| NodeFilter::MatchAttributes { attributes }),
    ]
}

fn mode_strategy() -> impl Strategy<Value = CacheMode> {
    prop_oneof![Just(CacheMode::Partitioned), Just(CacheMode::Replicated)]
}

// =============================================================================
// Filter Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: evaluation is a pure function of filter and node
    #[test]
    fn prop_evaluation_is_deterministic(
        filter in filter_strategy(),
        nodes in cluster_strategy(),
    ) {
        for node in &nodes {
            prop_assert_eq!(filter.matches(node), filter.matches(node));
        }
    }

    /// Property: JSON and YAML transmission preserve every verdict
    #[test]
    fn prop_transmitted_filter_agrees(
        filter in filter_strategy(),
        nodes in cluster_strategy(),
    ) {
        let json = serde_json::to_string(&filter).unwrap();
        let from_json: NodeFilter = serde_json::from_str(&json).unwrap();
        let yaml = serde_yaml::to_string(&filter).unwrap();
        let from_yaml: NodeFilter = serde_yaml::from_str(&yaml).unwrap();

        for node in &nodes {
            let local = filter.matches(node);
            prop_assert_eq!(from_json.matches(node), local);
            prop_assert_eq!(from_yaml.matches(node), local);
        }
    }

    /// Property: a matching attribute filter implies the attribute is present
    #[test]
    fn prop_attribute_match_requires_presence(
        key in "(zone|rack|tier)",
        value in attribute_value_strategy(),
        nodes in cluster_strategy(),
    ) {
        let filter = NodeFilter::match_attribute(key.clone(), value.clone());
        for node in &nodes {
            prop_assert_eq!(filter.matches(node), node.attribute(&key) == Some(&value));
        }
    }
}

// =============================================================================
// Resolver Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: self-evaluation on each node agrees with full resolution
    #[test]
    fn prop_self_evaluation_matches_resolution(
        filter in filter_strategy(),
        mode in mode_strategy(),
        nodes in cluster_strategy(),
    ) {
        let config = DistributedCacheConfig::new("cache")
            .with_mode(mode)
            .with_node_filter(filter);
        let resolved = TopologyResolver::resolve(&config, &nodes);

        for node in &nodes {
            prop_assert_eq!(
                TopologyResolver::evaluate(&config, node).is_active(),
                resolved.contains(&node.id())
            );
        }
    }

    /// Property: name filters select exactly the listed nodes, whatever the mode
    #[test]
    fn prop_name_filter_selects_listed_nodes(
        names in prop::collection::btree_set("node_[0-7]", 1..4),
        mode in mode_strategy(),
        nodes in cluster_strategy(),
    ) {
        let config = DistributedCacheConfig::new("cache")
            .with_mode(mode)
            .with_node_filter(NodeFilter::MatchNames { names: names.clone() });
        let resolved = TopologyResolver::resolve(&config, &nodes);

        for node in &nodes {
            prop_assert_eq!(resolved.contains(&node.id()), names.contains(node.name()));
        }
    }

    /// Property: without a filter every node is selected
    #[test]
    fn prop_no_filter_selects_every_node(
        mode in mode_strategy(),
        with_platform_config in any::<bool>(),
        nodes in cluster_strategy(),
    ) {
        let mut config = DistributedCacheConfig::new("cache").with_mode(mode);
        if with_platform_config {
            config = config.with_platform_cache(PlatformCacheConfig::new());
        }
        prop_assert_eq!(TopologyResolver::resolve(&config, &nodes).len(), nodes.len());
    }
}
