//! Cluster Membership
//!
//! Ordered view of the nodes currently in the cluster. Join order is the
//! ordering contract of [`Membership::list_nodes`].

use parking_lot::RwLock;

use super::node::{ClusterNode, NodeId};
use crate::error::{Error, Result};

/// Port for querying cluster membership.
pub trait Membership: Send + Sync {
    /// All current members, in join order
    fn list_nodes(&self) -> Vec<ClusterNode>;

    /// Look up a member by id
    fn node(&self, id: NodeId) -> Option<ClusterNode>;

    /// Look up a member by instance name
    fn node_by_name(&self, name: &str) -> Option<ClusterNode>;

    /// Number of current members
    fn size(&self) -> usize {
        self.list_nodes().len()
    }
}

/// In-process membership list
#[derive(Debug, Default)]
pub struct InMemoryMembership {
    nodes: RwLock<Vec<ClusterNode>>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Instance names must be unique among live members.
    pub fn join(&self, node: ClusterNode) -> Result<()> {
        let mut nodes = self.nodes.write();
        if nodes.iter().any(|n| n.name() == node.name()) {
            return Err(Error::DuplicateNodeName(node.name().to_string()));
        }
        nodes.push(node);
        Ok(())
    }

    /// Remove a node, returning it if it was a member
    pub fn leave(&self, id: NodeId) -> Option<ClusterNode> {
        let mut nodes = self.nodes.write();
        let pos = nodes.iter().position(|n| n.id() == id)?;
        Some(nodes.remove(pos))
    }

    pub fn clear(&self) {
        self.nodes.write().clear();
    }
}

impl Membership for InMemoryMembership {
    fn list_nodes(&self) -> Vec<ClusterNode> {
        self.nodes.read().clone()
    }

    fn node(&self, id: NodeId) -> Option<ClusterNode> {
        self.nodes.read().iter().find(|n| n.id() == id).cloned()
    }

    fn node_by_name(&self, name: &str) -> Option<ClusterNode> {
        self.nodes.read().iter().find(|n| n.name() == name).cloned()
    }

    fn size(&self) -> usize {
        self.nodes.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;

    use super::*;
    use crate::cluster::node::NodeRole;

    fn server(name: &str) -> ClusterNode {
        ClusterNode::new(name, NodeRole::Server, BTreeMap::new())
    }

    #[test]
    fn test_join_preserves_order() {
        let membership = InMemoryMembership::new();
        for i in 0..4 {
            membership.join(server(&format!("node_{}", i))).unwrap();
        }

        let names: Vec<_> = membership
            .list_nodes()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(names, vec!["node_0", "node_1", "node_2", "node_3"]);
        assert_eq!(membership.size(), 4);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let membership = InMemoryMembership::new();
        membership.join(server("node_0")).unwrap();

        let result = membership.join(server("node_0"));
        assert_matches!(result, Err(Error::DuplicateNodeName(name)) if name == "node_0");
    }

    #[test]
    fn test_leave_and_rejoin() {
        let membership = InMemoryMembership::new();
        let node = server("node_0");
        let id = node.id();
        membership.join(node).unwrap();

        assert!(membership.node(id).is_some());
        assert!(membership.leave(id).is_some());
        assert!(membership.leave(id).is_none());
        assert!(membership.node_by_name("node_0").is_none());

        membership.join(server("node_0")).unwrap();
        assert_eq!(membership.size(), 1);
    }
}
