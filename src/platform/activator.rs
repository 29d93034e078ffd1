//! Platform Cache Activator
//!
//! One activator runs per node. It starts the node's side of every
//! distributed cache and decides, from the node's own attributes only,
//! whether that side gets a platform cache.
//!
//! Activation is idempotent: the first decision for a cache name sticks
//! until the cache is destroyed or the node stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::resolver::{InactiveReason, TopologyResolver, Verdict};
use super::synchronizer::{CloseReason, Synchronizer};
use crate::cluster::ClusterNode;
use crate::config::DistributedCacheConfig;
use crate::domain::{DomainEvent, EventPublisher};
use crate::error::{Error, Result};
use crate::store::DistributedStore;

/// What caused a cache to start on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationTrigger {
    /// Listed in the node's own startup configuration
    Static,
    /// Created at runtime and propagated to running members
    Dynamic,
    /// Already registered when the node joined
    Join,
}

impl std::fmt::Display for ActivationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationTrigger::Static => write!(f, "static"),
            ActivationTrigger::Dynamic => write!(f, "dynamic"),
            ActivationTrigger::Join => write!(f, "join"),
        }
    }
}

/// Per-node cache starter
pub struct PlatformCacheActivator {
    node: ClusterNode,
    store: Arc<dyn DistributedStore>,
    publisher: Arc<dyn EventPublisher>,
    caches: DashMap<String, Arc<Synchronizer>>,
    stopped: AtomicBool,
}

impl PlatformCacheActivator {
    pub fn new(
        node: ClusterNode,
        store: Arc<dyn DistributedStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            node,
            store,
            publisher,
            caches: DashMap::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn node(&self) -> &ClusterNode {
        &self.node
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Start `config` on this node, or return the already started cache.
    pub async fn activate(
        &self,
        config: &DistributedCacheConfig,
        trigger: ActivationTrigger,
    ) -> Result<Arc<Synchronizer>> {
        if self.is_stopped() {
            return Err(Error::NodeStopped(self.node.name().to_string()));
        }

        if let Some(existing) = self.caches.get(&config.name) {
            debug!(
                node = %self.node.name(),
                cache = %config.name,
                %trigger,
                "Cache already started, keeping earlier decision"
            );
            return Ok(existing.clone());
        }

        let mut created = false;
        let sync = self
            .caches
            .entry(config.name.clone())
            .or_insert_with(|| {
                created = true;
                let verdict = TopologyResolver::evaluate(config, &self.node);
                Arc::new(Synchronizer::start(
                    self.node.name(),
                    config.clone(),
                    verdict,
                    self.store.clone(),
                ))
            })
            .clone();

        if created {
            self.announce(&sync, trigger).await;
        }
        Ok(sync)
    }

    async fn announce(&self, sync: &Synchronizer, trigger: ActivationTrigger) {
        let node = self.node.name();
        let cache = sync.name();
        let mut events = Vec::with_capacity(2);

        match sync.verdict() {
            Verdict::Active => {
                info!(node = %node, cache = %cache, %trigger, "Platform cache activated");
                events.push(DomainEvent::platform_cache_activated(node, cache, trigger));
            }
            Verdict::Inactive(reason) => {
                info!(node = %node, cache = %cache, %trigger, %reason, "Cache started without platform cache");
                if let InactiveReason::InvalidFilter(e) | InactiveReason::FilterError(e) = reason {
                    events.push(DomainEvent::filter_evaluation_failed(node, cache, e.clone()));
                }
            }
        }
        events.push(DomainEvent::cache_started(
            node,
            cache,
            trigger,
            sync.has_platform_cache(),
        ));

        if let Err(e) = self.publisher.publish_all(events).await {
            warn!(node = %node, cache = %cache, error = %e, "Failed to publish cache events");
        }
    }

    /// Started cache by name
    pub fn cache(&self, name: &str) -> Option<Arc<Synchronizer>> {
        self.caches.get(name).map(|entry| entry.clone())
    }

    /// Whether `name` has a platform cache on this node, if started here
    pub fn has_platform_cache(&self, name: &str) -> Option<bool> {
        self.caches.get(name).map(|entry| entry.has_platform_cache())
    }

    /// Names of started caches, sorted
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// All started caches, sorted by name
    pub fn caches(&self) -> Vec<Arc<Synchronizer>> {
        let mut caches: Vec<Arc<Synchronizer>> =
            self.caches.iter().map(|e| e.value().clone()).collect();
        caches.sort_by(|a, b| a.name().cmp(b.name()));
        caches
    }

    /// Tear down this node's side of a destroyed cache
    pub fn deactivate(&self, name: &str) -> Option<Arc<Synchronizer>> {
        let (_, sync) = self.caches.remove(name)?;
        sync.close(CloseReason::CacheDestroyed);
        debug!(node = %self.node.name(), cache = %name, "Cache deactivated");
        Some(sync)
    }

    /// Stop the node: close every cache and refuse new activations.
    ///
    /// Returns false if already stopped.
    pub fn shutdown(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        let names = self.cache_names();
        for name in &names {
            if let Some((_, sync)) = self.caches.remove(name) {
                sync.close(CloseReason::NodeStopped);
            }
        }
        info!(node = %self.node.name(), caches = names.len(), "Platform cache activator stopped");
        true
    }
}

impl std::fmt::Debug for PlatformCacheActivator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCacheActivator")
            .field("node", &self.node.name())
            .field("caches", &self.cache_names())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
