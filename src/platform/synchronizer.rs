//! Read-Through / Invalidation Synchronizer
//!
//! Runs every cache operation of one (node, cache) pair.
//!
//! ```text
//!   Inactive: get ──▶ store (remote get)
//!   Active:   get ──▶ platform cache ──hit──▶ value
//!                          │ miss
//!                          ▼
//!                        store (remote get) ──▶ populate ──▶ value
//!
//!   put/remove ──▶ store ──notify──▶ every Active node's platform cache
//! ```
//!
//! The state is fixed when the synchronizer is created; a cache never
//! switches between Active and Inactive during its lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::local::PlatformCache;
use super::metrics::{CacheMetrics, MetricsSnapshot};
use super::resolver::Verdict;
use crate::config::DistributedCacheConfig;
use crate::error::{Error, Result};
use crate::store::{DistributedStore, SubscriptionId, UpdateEvent, UpdateKind, UpdateListener};

/// Platform cache state of a (node, cache) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformState {
    /// No platform cache; every read goes to the store
    Inactive,
    /// Platform cache installed
    Active,
}

/// Why a synchronizer stopped serving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    CacheDestroyed,
    NodeStopped,
}

/// Applies store notifications to a platform cache
struct InvalidationListener {
    node: String,
    local: Arc<PlatformCache>,
    metrics: Arc<CacheMetrics>,
}

impl UpdateListener for InvalidationListener {
    fn on_update(&self, event: &UpdateEvent) {
        let changed = match &event.kind {
            UpdateKind::Put(versioned) => self.local.apply_update(&event.key, versioned),
            UpdateKind::Removed(version) => self.local.apply_removal(&event.key, *version),
        };
        if changed {
            self.metrics.record_invalidation();
            trace!(
                node = %self.node,
                cache = %event.cache,
                version = event.version(),
                "Platform cache entry refreshed by store notification"
            );
        }
    }
}

/// Cache operations of one cache on one node
pub struct Synchronizer {
    node: String,
    config: DistributedCacheConfig,
    verdict: Verdict,
    store: Arc<dyn DistributedStore>,
    local: Option<Arc<PlatformCache>>,
    subscription: Mutex<Option<SubscriptionId>>,
    metrics: Arc<CacheMetrics>,
    closed: OnceCell<CloseReason>,
}

impl Synchronizer {
    /// Create the synchronizer, installing and subscribing a platform cache
    /// when the verdict is active.
    pub fn start(
        node: impl Into<String>,
        config: DistributedCacheConfig,
        verdict: Verdict,
        store: Arc<dyn DistributedStore>,
    ) -> Self {
        let node = node.into();
        let metrics = Arc::new(CacheMetrics::new());

        let (local, subscription) = if verdict.is_active() {
            let local = Arc::new(PlatformCache::new());
            let listener = Arc::new(InvalidationListener {
                node: node.clone(),
                local: local.clone(),
                metrics: metrics.clone(),
            });
            let id = store.subscribe(&config.name, listener);
            (Some(local), Some(id))
        } else {
            (None, None)
        };

        Self {
            node,
            config,
            verdict,
            store,
            local,
            subscription: Mutex::new(subscription),
            metrics,
            closed: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn config(&self) -> &DistributedCacheConfig {
        &self.config
    }

    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    pub fn state(&self) -> PlatformState {
        if self.local.is_some() {
            PlatformState::Active
        } else {
            PlatformState::Inactive
        }
    }

    pub fn has_platform_cache(&self) -> bool {
        self.state() == PlatformState::Active
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.closed.get().copied()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.closed.get() {
            None => Ok(()),
            Some(CloseReason::CacheDestroyed) => Err(Error::CacheNotFound(self.config.name.clone())),
            Some(CloseReason::NodeStopped) => Err(Error::NodeStopped(self.node.clone())),
        }
    }

    /// Read a key, serving from the platform cache when possible
    pub async fn get(&self, key: &Bytes) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        self.metrics.record_get();

        let Some(local) = &self.local else {
            let fetched = self.store.get(&self.config.name, key).await?;
            self.metrics.record_remote_get();
            return Ok(fetched.map(|v| v.value));
        };

        if let Some(value) = local.get(key) {
            self.metrics.record_platform_hit();
            return Ok(Some(value));
        }

        local.begin_load(key);
        let fetched = match self.store.get(&self.config.name, key).await {
            Ok(fetched) => fetched,
            Err(e) => {
                local.finish_load(key, None);
                debug!(node = %self.node, cache = %self.config.name, error = %e, "Read-through failed");
                return Err(e);
            }
        };
        self.metrics.record_remote_get();

        let value = fetched.as_ref().map(|v| v.value.clone());
        let stored = local.finish_load(key, fetched);
        trace!(node = %self.node, cache = %self.config.name, stored, "Read-through miss");
        Ok(value)
    }

    /// Read several keys; absent keys are omitted from the result
    pub async fn get_all(&self, keys: &[Bytes]) -> Result<HashMap<Bytes, Bytes>> {
        let mut result = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await? {
                result.insert(key.clone(), value);
            }
        }
        Ok(result)
    }

    /// Write a key.
    ///
    /// The store refreshes every active platform cache, this node's
    /// included, before the write is acknowledged.
    pub async fn put(&self, key: Bytes, value: Bytes) -> Result<()> {
        self.ensure_open()?;
        self.metrics.record_put();
        let version = self.store.put(&self.config.name, key, value).await?;
        trace!(node = %self.node, cache = %self.config.name, version, "Put acknowledged");
        Ok(())
    }

    /// Write several keys
    pub async fn put_all(&self, entries: HashMap<Bytes, Bytes>) -> Result<()> {
        for (key, value) in entries {
            self.put(key, value).await?;
        }
        Ok(())
    }

    /// Remove a key; returns true if it existed
    pub async fn remove(&self, key: &Bytes) -> Result<bool> {
        self.ensure_open()?;
        self.metrics.record_removal();
        let removed = self.store.remove(&self.config.name, key).await?;
        Ok(removed.is_some())
    }

    /// Look a key up in the platform cache only, never touching the store
    pub fn local_peek(&self, key: &Bytes) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        Ok(self.local.as_ref().and_then(|local| local.get(key)))
    }

    /// Live entries in the platform cache (0 when inactive)
    pub fn local_size(&self) -> usize {
        self.local.as_ref().map_or(0, |local| local.len())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.local_size() as u64)
    }

    /// Stop serving: unsubscribe from the store and release local memory.
    ///
    /// Only the first call has an effect.
    pub fn close(&self, reason: CloseReason) -> bool {
        if self.closed.set(reason).is_err() {
            return false;
        }
        if let Some(id) = self.subscription.lock().take() {
            self.store.unsubscribe(id);
        }
        if let Some(local) = &self.local {
            local.clear();
        }
        debug!(node = %self.node, cache = %self.config.name, ?reason, "Cache closed");
        true
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("node", &self.node)
            .field("cache", &self.config.name)
            .field("state", &self.state())
            .field("closed", &self.close_reason())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
