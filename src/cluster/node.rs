//! Cluster Node Identity and Attributes
//!
//! A [`ClusterNode`] is established once at node startup and never mutated.
//! Its attribute map is shared behind an `Arc` so snapshots handed out by the
//! membership view stay cheap to clone.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attribute carrying the node's logical instance name.
///
/// Name-based filters match against this attribute rather than the local
/// `name` field, so a filter shipped to a peer evaluates identically there.
pub const INSTANCE_NAME_ATTR: &str = "platcache.node.name";

/// Attribute carrying the client-mode flag.
pub const CLIENT_MODE_ATTR: &str = "platcache.node.client";

// =============================================================================
// Node Identifier
// =============================================================================

/// Unique node identifier (value object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generate a fresh random identifier
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Node Role
// =============================================================================

/// Role of a node within the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Data-holding server node
    Server,
    /// Client node (holds no partitions, may still host a platform cache)
    Client,
}

impl NodeRole {
    pub fn is_client(&self) -> bool {
        matches!(self, NodeRole::Client)
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Server => write!(f, "server"),
            NodeRole::Client => write!(f, "client"),
        }
    }
}

// =============================================================================
// Attributes
// =============================================================================

/// Attribute value.
///
/// Untagged so that declarative files can write `zone: eu-1` or `rack: 3`
/// directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl AttributeValue {
    /// Returns the string payload, if this is a string attribute
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Str(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Str(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

/// Immutable attribute map of a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAttributes(BTreeMap<String, AttributeValue>);

impl NodeAttributes {
    pub fn new(attributes: BTreeMap<String, AttributeValue>) -> Self {
        Self(attributes)
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, AttributeValue)> for NodeAttributes {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// Cluster Node
// =============================================================================

/// A member of the cluster as seen by every other member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    id: NodeId,
    name: String,
    role: NodeRole,
    attributes: Arc<NodeAttributes>,
}

impl ClusterNode {
    /// Build a node from its startup configuration.
    ///
    /// Well-known attributes (instance name, client flag) always win over
    /// user attributes with the same key.
    pub fn new(
        name: impl Into<String>,
        role: NodeRole,
        user_attributes: BTreeMap<String, AttributeValue>,
    ) -> Self {
        let name = name.into();
        let mut attributes = user_attributes;
        attributes.insert(INSTANCE_NAME_ATTR.to_string(), AttributeValue::Str(name.clone()));
        attributes.insert(CLIENT_MODE_ATTR.to_string(), AttributeValue::Bool(role.is_client()));

        Self {
            id: NodeId::random(),
            name,
            role,
            attributes: Arc::new(NodeAttributes::new(attributes)),
        }
    }

    /// Rebuild a node from raw parts, e.g. a snapshot received from a peer.
    ///
    /// Well-known attributes are taken as given; nothing is injected.
    pub fn from_parts(
        id: NodeId,
        name: impl Into<String>,
        role: NodeRole,
        attributes: NodeAttributes,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            attributes: Arc::new(attributes),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_client(&self) -> bool {
        self.role.is_client()
    }

    pub fn attributes(&self) -> &NodeAttributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Instance name as published in the node's attributes
    pub fn instance_name(&self) -> Option<&str> {
        self.attribute(INSTANCE_NAME_ATTR).and_then(AttributeValue::as_str)
    }
}

impl std::fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.role, self.id)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_attributes_injected() {
        let node = ClusterNode::new("node_0", NodeRole::Server, BTreeMap::new());

        assert_eq!(node.instance_name(), Some("node_0"));
        assert_eq!(
            node.attribute(CLIENT_MODE_ATTR),
            Some(&AttributeValue::Bool(false))
        );
    }

    #[test]
    fn test_well_known_attributes_override_user_values() {
        let mut attrs = BTreeMap::new();
        attrs.insert(INSTANCE_NAME_ATTR.to_string(), AttributeValue::from("spoofed"));
        attrs.insert("zone".to_string(), AttributeValue::from("eu-1"));

        let node = ClusterNode::new("node_3", NodeRole::Client, attrs);

        assert_eq!(node.instance_name(), Some("node_3"));
        assert_eq!(node.attribute("zone"), Some(&AttributeValue::from("eu-1")));
        assert!(node.is_client());
    }

    #[test]
    fn test_node_ids_are_unique() {
        let a = ClusterNode::new("a", NodeRole::Server, BTreeMap::new());
        let b = ClusterNode::new("a", NodeRole::Server, BTreeMap::new());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_attribute_value_untagged_yaml() {
        let attrs: NodeAttributes =
            serde_yaml::from_str("zone: eu-1\nrack: 3\nssd: true\n").unwrap();

        assert_eq!(attrs.get("zone"), Some(&AttributeValue::from("eu-1")));
        assert_eq!(attrs.get("rack"), Some(&AttributeValue::Int(3)));
        assert_eq!(attrs.get("ssd"), Some(&AttributeValue::Bool(true)));
    }

    #[test]
    fn test_from_parts_keeps_attributes_verbatim() {
        let node = ClusterNode::from_parts(
            NodeId::random(),
            "ghost",
            NodeRole::Server,
            NodeAttributes::default(),
        );
        assert_eq!(node.instance_name(), None);
        assert!(node.attributes().is_empty());
    }
}
