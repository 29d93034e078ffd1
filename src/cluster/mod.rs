//! Cluster Harness
//!
//! Explicit, caller-owned registry of the nodes running in this process.
//! Nothing here is global: tests and embedding applications create a
//! [`Cluster`], start nodes on it and tear it down with
//! [`Cluster::stop_all`].
//!
//! # Configuration propagation
//!
//! The cluster keeps one configuration per cache name. Statically
//! configured caches register themselves when the first node carrying them
//! starts; dynamically created caches register at creation time. Every
//! running node then activates the cache by evaluating the node filter
//! against its own attributes, and nodes joining later do the same from the
//! registered configuration.
//!
//! ```text
//!   start_node ──▶ runtimes.insert ──▶ read registry ──▶ activate(Join)
//!   create_cache ──▶ registry.insert ──▶ read runtimes ──▶ activate(Dynamic)
//! ```
//!
//! Both paths publish before they read, so a node starting concurrently
//! with a cache creation sees the cache through at least one of them.

pub mod membership;
pub mod node;

pub use membership::{InMemoryMembership, Membership};
pub use node::{
    AttributeValue, ClusterNode, NodeAttributes, NodeId, NodeRole, CLIENT_MODE_ATTR,
    INSTANCE_NAME_ATTR,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::adapters::LoggingEventPublisher;
use crate::config::{ClusterFile, DistributedCacheConfig, NodeConfig};
use crate::domain::{DomainEvent, EventPublisher};
use crate::error::{Error, Result};
use crate::node::Node;
use crate::platform::{ActivationTrigger, PlatformCacheActivator};
use crate::store::{DistributedStore, InMemoryDistributedStore};

/// Builder for [`Cluster`]
#[derive(Default)]
pub struct ClusterBuilder {
    store: Option<Arc<dyn DistributedStore>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl ClusterBuilder {
    /// Use a custom distributed store
    pub fn store(mut self, store: Arc<dyn DistributedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom event publisher
    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn build(self) -> Arc<Cluster> {
        Arc::new(Cluster {
            membership: InMemoryMembership::new(),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryDistributedStore::new())),
            publisher: self
                .publisher
                .unwrap_or_else(|| Arc::new(LoggingEventPublisher::debug_level())),
            registry: RwLock::new(BTreeMap::new()),
            runtimes: DashMap::new(),
        })
    }
}

/// In-process cluster of nodes sharing one distributed store
pub struct Cluster {
    membership: InMemoryMembership,
    store: Arc<dyn DistributedStore>,
    publisher: Arc<dyn EventPublisher>,
    /// Cluster-wide cache configurations, by name
    registry: RwLock<BTreeMap<String, DistributedCacheConfig>>,
    runtimes: DashMap<NodeId, Arc<PlatformCacheActivator>>,
}

impl Cluster {
    /// Cluster backed by a fresh in-memory store
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ClusterBuilder {
        ClusterBuilder::default()
    }

    pub fn membership(&self) -> &dyn Membership {
        &self.membership
    }

    pub fn store(&self) -> &Arc<dyn DistributedStore> {
        &self.store
    }

    pub fn publisher(&self) -> &Arc<dyn EventPublisher> {
        &self.publisher
    }

    /// Running nodes, in join order
    pub fn nodes(&self) -> Vec<ClusterNode> {
        self.membership.list_nodes()
    }

    /// Registered cache configurations, sorted by name
    pub fn cache_configs(&self) -> Vec<DistributedCacheConfig> {
        self.registry.read().values().cloned().collect()
    }

    pub fn cache_config(&self, name: &str) -> Option<DistributedCacheConfig> {
        self.registry.read().get(name).cloned()
    }

    pub(crate) fn runtime(&self, id: NodeId) -> Option<Arc<PlatformCacheActivator>> {
        self.runtimes.get(&id).map(|r| r.clone())
    }

    /// Handle to a running node, by instance name
    pub fn node(self: &Arc<Self>, name: &str) -> Result<Node> {
        let member = self
            .membership
            .node_by_name(name)
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))?;
        let runtime = self
            .runtime(member.id())
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))?;
        Ok(Node::new(self.clone(), runtime))
    }

    /// Start a node: join the membership, start its static caches, then every
    /// cache already registered in the cluster.
    pub async fn start_node(self: &Arc<Self>, config: NodeConfig) -> Result<Node> {
        config.validate()?;

        let member = ClusterNode::new(
            config.instance_name.clone(),
            config.role(),
            config.user_attributes.clone(),
        );
        self.membership.join(member.clone())?;

        let runtime = Arc::new(PlatformCacheActivator::new(
            member.clone(),
            self.store.clone(),
            self.publisher.clone(),
        ));
        self.runtimes.insert(member.id(), runtime.clone());

        info!(
            node = %member.name(),
            id = %member.id(),
            role = %member.role(),
            static_caches = config.caches.len(),
            "Node joined cluster"
        );
        self.publish(DomainEvent::node_joined(member.name(), member.is_client()))
            .await;

        let (static_caches, rejected) = config.static_caches();
        for error in &rejected {
            warn!(node = %member.name(), error = %error, "Ignoring static cache configuration");
        }
        for static_config in static_caches {
            let effective = self.register_static(member.name(), static_config);
            self.activate_registered(&runtime, &effective, ActivationTrigger::Static)
                .await?;
            self.propagate(&effective, Some(member.id())).await;
        }

        let registered = self.cache_configs();
        for cache in &registered {
            self.activate_registered(&runtime, cache, ActivationTrigger::Join)
                .await?;
        }

        Ok(Node::new(self.clone(), runtime))
    }

    /// Register a static cache configuration; the first registration wins.
    fn register_static(&self, node: &str, config: &DistributedCacheConfig) -> DistributedCacheConfig {
        let mut registry = self.registry.write();
        match registry.get(&config.name).cloned() {
            Some(existing) => {
                if &existing != config {
                    warn!(
                        node = %node,
                        cache = %config.name,
                        "Static cache configuration conflicts with the cluster's, using the cluster's"
                    );
                }
                existing
            }
            None => {
                registry.insert(config.name.clone(), config.clone());
                config.clone()
            }
        }
    }

    /// Activate `config` on one node, undoing it if the cache was destroyed
    /// while the node was activating it.
    ///
    /// `destroy_cache` unregisters before it deactivates, so either it sees
    /// this activation or the registry check here does.
    async fn activate_registered(
        &self,
        runtime: &PlatformCacheActivator,
        config: &DistributedCacheConfig,
        trigger: ActivationTrigger,
    ) -> Result<()> {
        runtime.activate(config, trigger).await?;
        if self.cache_config(&config.name).is_none() && runtime.deactivate(&config.name).is_some() {
            debug!(node = %runtime.node().name(), cache = %config.name, "Cache destroyed during activation");
        }
        Ok(())
    }

    /// Start `config` on every running node except `skip`
    async fn propagate(&self, config: &DistributedCacheConfig, skip: Option<NodeId>) {
        let runtimes: Vec<Arc<PlatformCacheActivator>> = self
            .runtimes
            .iter()
            .filter(|r| Some(*r.key()) != skip)
            .map(|r| r.value().clone())
            .collect();

        let results = join_all(
            runtimes
                .iter()
                .map(|runtime| self.activate_registered(runtime, config, ActivationTrigger::Dynamic)),
        )
        .await;

        for (runtime, result) in runtimes.iter().zip(results) {
            if let Err(e) = result {
                // A node stopping mid-propagation is expected
                warn!(node = %runtime.node().name(), cache = %config.name, error = %e, "Cache propagation skipped node");
            }
        }
    }

    /// Create a cache at runtime from node `creator`.
    ///
    /// The configuration reaches every running node, each of which decides
    /// on its own whether to host a platform cache.
    pub async fn create_cache(&self, creator: NodeId, config: DistributedCacheConfig) -> Result<()> {
        config.validate()?;
        let creator_name = self
            .membership
            .node(creator)
            .map(|n| n.name().to_string())
            .ok_or_else(|| Error::NodeNotFound(creator.to_string()))?;

        {
            let mut registry = self.registry.write();
            if registry.contains_key(&config.name) {
                return Err(Error::CacheAlreadyExists(config.name.clone()));
            }
            registry.insert(config.name.clone(), config.clone());
        }

        let filter = config
            .node_filter()
            .map(ToString::to_string)
            .unwrap_or_else(|| "none".to_string());
        info!(
            cache = %config.name,
            creator = %creator_name,
            mode = %config.mode,
            backups = config.effective_backups(),
            filter = %filter,
            "Creating cache"
        );
        self.propagate(&config, None).await;
        Ok(())
    }

    /// Destroy a cache cluster-wide, releasing every platform cache and
    /// subscription. Returns false if no such cache exists.
    pub async fn destroy_cache(&self, name: &str) -> Result<bool> {
        if self.registry.write().remove(name).is_none() {
            return Ok(false);
        }
        for runtime in self.runtimes.iter() {
            runtime.deactivate(name);
        }
        self.store.destroy(name).await?;

        info!(cache = %name, "Cache destroyed");
        self.publish(DomainEvent::cache_destroyed(name)).await;
        Ok(true)
    }

    /// Stop one node, releasing its platform caches
    pub async fn stop_node(&self, id: NodeId) -> Result<()> {
        let (_, runtime) = self
            .runtimes
            .remove(&id)
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))?;
        runtime.shutdown();
        self.membership.leave(id);

        info!(node = %runtime.node().name(), "Node left cluster");
        self.publish(DomainEvent::node_left(runtime.node().name())).await;
        Ok(())
    }

    /// Stop every node and forget all caches
    pub async fn stop_all(&self) {
        for member in self.membership.list_nodes() {
            if let Err(e) = self.stop_node(member.id()).await {
                warn!(node = %member.name(), error = %e, "Node already stopped");
            }
        }
        let caches: Vec<String> = self.registry.read().keys().cloned().collect();
        for cache in caches {
            if let Err(e) = self.store.destroy(&cache).await {
                warn!(cache = %cache, error = %e, "Failed to drop cache data");
            }
        }
        self.registry.write().clear();
    }

    /// Start every node of a cluster file, then create its dynamic caches
    pub async fn apply(self: &Arc<Self>, file: &ClusterFile) -> Result<Vec<Node>> {
        file.validate()?;
        let mut nodes = Vec::with_capacity(file.nodes.len());
        for config in &file.nodes {
            nodes.push(self.start_node(config.clone()).await?);
        }
        for entry in &file.dynamic_caches {
            let creator = self.node(&entry.created_by)?;
            creator.create_cache(entry.cache.clone()).await?;
        }
        Ok(nodes)
    }

    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.publisher.publish(event).await {
            warn!(error = %e, "Failed to publish cluster event");
        }
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("nodes", &self.membership.size())
            .field("caches", &self.registry.read().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::adapters::InMemoryEventCollector;
    use crate::filter::NodeFilter;

    async fn four_nodes(cluster: &Arc<Cluster>) -> Vec<Node> {
        let mut nodes = Vec::new();
        for i in 0..4 {
            let config = NodeConfig::new(format!("node_{}", i)).client(i == 3);
            nodes.push(cluster.start_node(config).await.unwrap());
        }
        nodes
    }

    #[tokio::test]
    async fn test_duplicate_node_name_rejected() {
        let cluster = Cluster::new();
        cluster.start_node(NodeConfig::new("node_0")).await.unwrap();
        assert_matches!(
            cluster.start_node(NodeConfig::new("node_0")).await,
            Err(Error::DuplicateNodeName(_))
        );
    }

    #[tokio::test]
    async fn test_create_cache_reaches_every_node() {
        let cluster = Cluster::new();
        let nodes = four_nodes(&cluster).await;

        let config = DistributedCacheConfig::new("cache")
            .with_node_filter(NodeFilter::match_names(["node_0", "node_1"]));
        cluster.create_cache(nodes[2].id(), config).await.unwrap();

        let flags: Vec<bool> = nodes
            .iter()
            .map(|n| n.cache("cache").unwrap().has_platform_cache())
            .collect();
        assert_eq!(flags, vec![true, true, false, false]);
    }

    #[tokio::test]
    async fn test_create_existing_cache_fails() {
        let cluster = Cluster::new();
        let node = cluster.start_node(NodeConfig::new("node_0")).await.unwrap();
        cluster
            .create_cache(node.id(), DistributedCacheConfig::new("cache"))
            .await
            .unwrap();
        assert_matches!(
            cluster
                .create_cache(node.id(), DistributedCacheConfig::new("cache"))
                .await,
            Err(Error::CacheAlreadyExists(_))
        );
    }

    #[tokio::test]
    async fn test_static_conflict_uses_registered_config() {
        let cluster = Cluster::new();
        let first = DistributedCacheConfig::new("cache")
            .with_node_filter(NodeFilter::match_names(["node_0"]));
        let second = DistributedCacheConfig::new("cache")
            .with_node_filter(NodeFilter::match_names(["node_1"]));

        let n0 = cluster
            .start_node(NodeConfig::new("node_0").with_cache(first.clone()))
            .await
            .unwrap();
        let n1 = cluster
            .start_node(NodeConfig::new("node_1").with_cache(second))
            .await
            .unwrap();

        assert_eq!(cluster.cache_config("cache"), Some(first));
        assert!(n0.cache("cache").unwrap().has_platform_cache());
        assert!(!n1.cache("cache").unwrap().has_platform_cache());
    }

    #[tokio::test]
    async fn test_static_cache_propagates_to_running_nodes() {
        let cluster = Cluster::new();
        let n0 = cluster.start_node(NodeConfig::new("node_0")).await.unwrap();
        cluster
            .start_node(NodeConfig::new("node_1").with_cache(DistributedCacheConfig::new("cache")))
            .await
            .unwrap();

        assert!(n0.cache("cache").unwrap().has_platform_cache());
    }

    #[tokio::test]
    async fn test_activation_of_destroyed_cache_is_undone() {
        let cluster = Cluster::new();
        let node = cluster.start_node(NodeConfig::new("node_0")).await.unwrap();
        let runtime = cluster.runtime(node.id()).unwrap();

        // Snapshot taken before a destroy, applied after it
        let stale = DistributedCacheConfig::new("cache");
        cluster
            .activate_registered(&runtime, &stale, ActivationTrigger::Join)
            .await
            .unwrap();

        assert!(runtime.cache("cache").is_none());
        assert_eq!(cluster.store().subscriber_count("cache"), 0);
        assert_matches!(node.cache("cache"), Err(Error::CacheNotFound(_)));
    }

    #[tokio::test]
    async fn test_bad_static_caches_do_not_stop_node() {
        let cluster = Cluster::new();
        let node = cluster
            .start_node(
                NodeConfig::new("node_0")
                    .with_cache(DistributedCacheConfig::new("cache"))
                    .with_cache(DistributedCacheConfig::new("cache").with_backups(3))
                    .with_cache(DistributedCacheConfig::new("")),
            )
            .await
            .unwrap();

        assert_eq!(cluster.nodes().len(), 1);
        assert_eq!(node.cache_names(), vec!["cache".to_string()]);
        assert_eq!(cluster.cache_config("cache").unwrap().backups, 0);
    }

    #[tokio::test]
    async fn test_stop_all_releases_everything() {
        let events = Arc::new(InMemoryEventCollector::new());
        let cluster = Cluster::builder().publisher(events.clone()).build();
        let nodes = four_nodes(&cluster).await;
        cluster
            .create_cache(nodes[0].id(), DistributedCacheConfig::new("cache"))
            .await
            .unwrap();
        assert_eq!(cluster.store().subscriber_count("cache"), 4);

        cluster.stop_all().await;

        assert!(cluster.nodes().is_empty());
        assert!(cluster.cache_configs().is_empty());
        assert_eq!(cluster.store().stats().subscriptions, 0);
        assert_eq!(events.events_of_type("NodeLeft").len(), 4);
        assert_matches!(cluster.node("node_0"), Err(Error::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_destroy_cache() {
        let cluster = Cluster::new();
        let nodes = four_nodes(&cluster).await;
        cluster
            .create_cache(nodes[0].id(), DistributedCacheConfig::new("cache"))
            .await
            .unwrap();

        assert!(cluster.destroy_cache("cache").await.unwrap());
        assert!(!cluster.destroy_cache("cache").await.unwrap());
        assert_eq!(cluster.store().subscriber_count("cache"), 0);
        assert_matches!(nodes[1].cache("cache"), Err(Error::CacheNotFound(_)));

        // The name is free again
        cluster
            .create_cache(nodes[1].id(), DistributedCacheConfig::new("cache"))
            .await
            .unwrap();
    }
}
