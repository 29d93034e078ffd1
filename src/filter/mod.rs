//! Node Filters
//!
//! A node filter decides whether a node belongs to the set that hosts a
//! platform cache. Filters are plain data: they travel inside cache
//! configurations and are rebuilt on every receiving node, so they never
//! capture closures or live references.
//!
//! # Variants
//!
//! ```text
//! MatchAll          every node matches (same as "no filter")
//! MatchNames        node instance name ∈ names
//! MatchAttribute    node attribute `key` == `value`
//! MatchAttributes   every listed attribute pair matches
//! ```

mod proptest;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cluster::{AttributeValue, ClusterNode, INSTANCE_NAME_ATTR};
use crate::error::{Error, Result};

/// Predicate over a cluster node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeFilter {
    /// Every node matches
    #[default]
    MatchAll,
    /// Node's instance name attribute is one of `names`
    MatchNames { names: BTreeSet<String> },
    /// Node attribute `key` equals `value`; absent attribute is no match
    MatchAttribute { key: String, value: AttributeValue },
    /// All listed attributes equal their values
    MatchAttributes {
        attributes: BTreeMap<String, AttributeValue>,
    },
}

impl NodeFilter {
    /// Filter matching nodes by instance name
    pub fn match_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NodeFilter::MatchNames {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Filter matching a single attribute pair
    pub fn match_attribute(key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        NodeFilter::MatchAttribute {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Filter matching every listed attribute pair
    pub fn match_attributes<I, K, V>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        NodeFilter::MatchAttributes {
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Evaluate the filter against a node.
    ///
    /// Fails only when the node lacks a usable instance name for a
    /// name-based filter; a missing user attribute is a plain non-match.
    pub fn evaluate(&self, node: &ClusterNode) -> Result<bool> {
        match self {
            NodeFilter::MatchAll => Ok(true),
            NodeFilter::MatchNames { names } => match node.attribute(INSTANCE_NAME_ATTR) {
                Some(AttributeValue::Str(name)) => Ok(names.contains(name)),
                Some(other) => Err(Error::FilterEvaluation {
                    node: node.name().to_string(),
                    reason: format!(
                        "attribute {} is not a string: {}",
                        INSTANCE_NAME_ATTR, other
                    ),
                }),
                None => Err(Error::FilterEvaluation {
                    node: node.name().to_string(),
                    reason: format!("attribute {} is missing", INSTANCE_NAME_ATTR),
                }),
            },
            NodeFilter::MatchAttribute { key, value } => Ok(node.attribute(key) == Some(value)),
            NodeFilter::MatchAttributes { attributes } => Ok(attributes
                .iter()
                .all(|(key, value)| node.attribute(key) == Some(value))),
        }
    }

    /// Evaluate the filter, failing closed.
    ///
    /// Evaluation errors are logged and reported as a non-match.
    pub fn matches(&self, node: &ClusterNode) -> bool {
        match self.evaluate(node) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(node = %node.name(), error = %e, "Node filter evaluation failed, treating as no match");
                false
            }
        }
    }

    /// Check that the filter is well formed.
    ///
    /// A malformed filter can never select any node.
    pub fn validate(&self) -> Result<()> {
        match self {
            NodeFilter::MatchAll => Ok(()),
            NodeFilter::MatchNames { names } if names.is_empty() => Err(Error::Config(
                "name filter must list at least one node name".to_string(),
            )),
            NodeFilter::MatchNames { names } if names.iter().any(|n| n.is_empty()) => Err(
                Error::Config("name filter contains an empty node name".to_string()),
            ),
            NodeFilter::MatchNames { .. } => Ok(()),
            NodeFilter::MatchAttribute { key, .. } if key.is_empty() => Err(Error::Config(
                "attribute filter key must not be empty".to_string(),
            )),
            NodeFilter::MatchAttribute { .. } => Ok(()),
            NodeFilter::MatchAttributes { attributes } if attributes.is_empty() => Err(
                Error::Config("attribute filter must list at least one attribute".to_string()),
            ),
            NodeFilter::MatchAttributes { attributes } if attributes.keys().any(|k| k.is_empty()) => {
                Err(Error::Config(
                    "attribute filter key must not be empty".to_string(),
                ))
            }
            NodeFilter::MatchAttributes { .. } => Ok(()),
        }
    }
}

impl std::fmt::Display for NodeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeFilter::MatchAll => write!(f, "all"),
            NodeFilter::MatchNames { names } => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                write!(f, "names[{}]", names.join(","))
            }
            NodeFilter::MatchAttribute { key, value } => write!(f, "attr[{}={}]", key, value),
            NodeFilter::MatchAttributes { attributes } => {
                let pairs: Vec<String> = attributes
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                write!(f, "attrs[{}]", pairs.join(","))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;

    use super::*;
    use crate::cluster::{NodeAttributes, NodeId, NodeRole};

    fn node(name: &str, attrs: &[(&str, &str)]) -> ClusterNode {
        let attrs: BTreeMap<String, AttributeValue> = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), AttributeValue::from(*v)))
            .collect();
        ClusterNode::new(name, NodeRole::Server, attrs)
    }

    #[test]
    fn test_match_all() {
        assert!(NodeFilter::MatchAll.matches(&node("node_0", &[])));
    }

    #[test]
    fn test_match_names() {
        let filter = NodeFilter::match_names(["node_0", "node_1"]);

        assert!(filter.matches(&node("node_0", &[])));
        assert!(filter.matches(&node("node_1", &[])));
        assert!(!filter.matches(&node("node_2", &[])));
    }

    #[test]
    fn test_match_names_uses_instance_name_attribute() {
        // Local name says node_0 but the published attribute does not exist
        let ghost = ClusterNode::from_parts(
            NodeId::random(),
            "node_0",
            NodeRole::Server,
            NodeAttributes::default(),
        );
        let filter = NodeFilter::match_names(["node_0"]);

        assert_matches!(filter.evaluate(&ghost), Err(Error::FilterEvaluation { .. }));
        assert!(!filter.matches(&ghost));
    }

    #[test]
    fn test_match_names_non_string_attribute_fails_closed() {
        let attrs: NodeAttributes = [(
            INSTANCE_NAME_ATTR.to_string(),
            AttributeValue::Int(7),
        )]
        .into_iter()
        .collect();
        let odd = ClusterNode::from_parts(NodeId::random(), "node_7", NodeRole::Server, attrs);

        assert!(NodeFilter::match_names(["node_7"]).evaluate(&odd).is_err());
        assert!(!NodeFilter::match_names(["node_7"]).matches(&odd));
    }

    #[test]
    fn test_match_attribute() {
        let filter = NodeFilter::match_attribute("test_attribute", "filtered");

        assert!(filter.matches(&node("a", &[("test_attribute", "filtered")])));
        assert!(!filter.matches(&node("b", &[("test_attribute", "non_filtered")])));
    }

    #[test]
    fn test_match_attribute_absent_is_no_match() {
        let filter = NodeFilter::match_attribute("test_attribute", "filtered");
        let result = filter.evaluate(&node("a", &[]));
        assert_matches!(result, Ok(false));
    }

    #[test]
    fn test_match_attribute_type_mismatch_is_no_match() {
        let filter = NodeFilter::match_attribute("rack", 3i64);
        assert!(!filter.matches(&node("a", &[("rack", "3")])));
    }

    #[test]
    fn test_match_attributes_requires_all() {
        let filter = NodeFilter::match_attributes([("zone", "eu"), ("tier", "hot")]);

        assert!(filter.matches(&node("a", &[("zone", "eu"), ("tier", "hot")])));
        assert!(!filter.matches(&node("b", &[("zone", "eu")])));
        assert!(!filter.matches(&node("c", &[("zone", "us"), ("tier", "hot")])));
    }

    #[test]
    fn test_validate() {
        assert!(NodeFilter::MatchAll.validate().is_ok());
        assert!(NodeFilter::match_names(["node_0"]).validate().is_ok());
        assert_matches!(
            NodeFilter::match_names(Vec::<String>::new()).validate(),
            Err(Error::Config(_))
        );
        assert_matches!(
            NodeFilter::match_attribute("", "x").validate(),
            Err(Error::Config(_))
        );
        assert_matches!(
            NodeFilter::match_attributes(Vec::<(String, String)>::new()).validate(),
            Err(Error::Config(_))
        );
    }

    #[test]
    fn test_serialized_filter_evaluates_identically() {
        let filter = NodeFilter::match_names(["node_0", "node_3"]);
        let wire = serde_json::to_string(&filter).unwrap();
        let received: NodeFilter = serde_json::from_str(&wire).unwrap();

        for name in ["node_0", "node_1", "node_2", "node_3"] {
            let n = node(name, &[]);
            assert_eq!(filter.matches(&n), received.matches(&n));
        }
    }

    #[test]
    fn test_yaml_shape() {
        let filter: NodeFilter =
            serde_yaml::from_str("kind: match_attribute\nkey: test_attribute\nvalue: filtered\n")
                .unwrap();
        assert_eq!(filter, NodeFilter::match_attribute("test_attribute", "filtered"));
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeFilter::MatchAll.to_string(), "all");
        assert_eq!(
            NodeFilter::match_names(["b", "a"]).to_string(),
            "names[a,b]"
        );
        assert_eq!(
            NodeFilter::match_attribute("k", "v").to_string(),
            "attr[k=v]"
        );
    }
}
