//! Node and Cache Handles
//!
//! [`Node`] is the caller's view of one running cluster node. Cache handles
//! obtained from it route every operation through that node's synchronizer,
//! so `has_platform_cache` and metrics always describe the node the handle
//! came from.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cluster::{Cluster, ClusterNode, NodeId};
use crate::config::DistributedCacheConfig;
use crate::error::{Error, Result};
use crate::platform::{MetricsSnapshot, PlatformCacheActivator, PlatformState, Synchronizer};

// =============================================================================
// Node
// =============================================================================

/// Handle to a running node
#[derive(Clone)]
pub struct Node {
    cluster: Arc<Cluster>,
    runtime: Arc<PlatformCacheActivator>,
}

impl Node {
    pub(crate) fn new(cluster: Arc<Cluster>, runtime: Arc<PlatformCacheActivator>) -> Self {
        Self { cluster, runtime }
    }

    pub fn id(&self) -> NodeId {
        self.runtime.node().id()
    }

    pub fn name(&self) -> &str {
        self.runtime.node().name()
    }

    pub fn is_client(&self) -> bool {
        self.runtime.node().is_client()
    }

    /// Identity and attributes of this node
    pub fn local_node(&self) -> &ClusterNode {
        self.runtime.node()
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    pub fn is_stopped(&self) -> bool {
        self.runtime.is_stopped()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::NodeStopped(self.name().to_string()));
        }
        Ok(())
    }

    /// Create a cache cluster-wide from this node
    pub async fn create_cache(&self, config: DistributedCacheConfig) -> Result<CacheHandle> {
        self.ensure_running()?;
        let name = config.name.clone();
        self.cluster.create_cache(self.id(), config).await?;
        self.cache(&name)
    }

    /// Return the named cache, creating it from `config` if it does not exist
    pub async fn get_or_create_cache(&self, config: DistributedCacheConfig) -> Result<CacheHandle> {
        if let Ok(handle) = self.cache(&config.name) {
            return Ok(handle);
        }
        match self.create_cache(config.clone()).await {
            Err(Error::CacheAlreadyExists(_)) => self.cache(&config.name),
            other => other,
        }
    }

    /// Cache started on this node
    pub fn cache(&self, name: &str) -> Result<CacheHandle> {
        self.ensure_running()?;
        self.runtime
            .cache(name)
            .map(CacheHandle::new)
            .ok_or_else(|| Error::CacheNotFound(name.to_string()))
    }

    /// Typed view of a cache started on this node
    pub fn typed_cache<K, V>(&self, name: &str) -> Result<TypedCache<K, V>>
    where
        K: Serialize,
        V: Serialize + DeserializeOwned,
    {
        self.cache(name).map(TypedCache::new)
    }

    /// Names of caches started on this node
    pub fn cache_names(&self) -> Vec<String> {
        self.runtime.cache_names()
    }

    /// Handles to every cache started on this node
    pub fn caches(&self) -> Vec<CacheHandle> {
        self.runtime.caches().into_iter().map(CacheHandle::new).collect()
    }

    /// Destroy a cache cluster-wide
    pub async fn destroy_cache(&self, name: &str) -> Result<bool> {
        self.ensure_running()?;
        self.cluster.destroy_cache(name).await
    }

    /// Stop this node, releasing all of its platform caches
    pub async fn stop(&self) -> Result<()> {
        self.cluster.stop_node(self.id()).await
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("id", &self.id())
            .field("client", &self.is_client())
            .finish()
    }
}

// =============================================================================
// Cache Handle
// =============================================================================

/// Byte-level handle to one cache on one node
#[derive(Clone, Debug)]
pub struct CacheHandle {
    sync: Arc<Synchronizer>,
}

impl CacheHandle {
    fn new(sync: Arc<Synchronizer>) -> Self {
        Self { sync }
    }

    pub fn name(&self) -> &str {
        self.sync.name()
    }

    /// Instance name of the node this handle belongs to
    pub fn node(&self) -> &str {
        self.sync.node()
    }

    pub fn config(&self) -> &DistributedCacheConfig {
        self.sync.config()
    }

    /// Whether this node hosts a platform cache for the cache.
    ///
    /// Fixed for the cache's lifetime.
    pub fn has_platform_cache(&self) -> bool {
        self.sync.has_platform_cache()
    }

    pub fn state(&self) -> PlatformState {
        self.sync.state()
    }

    pub async fn get(&self, key: impl Into<Bytes>) -> Result<Option<Bytes>> {
        self.sync.get(&key.into()).await
    }

    pub async fn get_all<I, K>(&self, keys: I) -> Result<HashMap<Bytes, Bytes>>
    where
        I: IntoIterator<Item = K>,
        K: Into<Bytes>,
    {
        let keys: Vec<Bytes> = keys.into_iter().map(Into::into).collect();
        self.sync.get_all(&keys).await
    }

    pub async fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        self.sync.put(key.into(), value.into()).await
    }

    pub async fn put_all<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Bytes>,
        V: Into<Bytes>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.sync.put_all(entries).await
    }

    /// Remove a key; returns true if it existed
    pub async fn remove(&self, key: impl Into<Bytes>) -> Result<bool> {
        self.sync.remove(&key.into()).await
    }

    /// Platform cache lookup that never reaches the store
    pub fn local_peek(&self, key: impl Into<Bytes>) -> Result<Option<Bytes>> {
        self.sync.local_peek(&key.into())
    }

    pub fn local_size(&self) -> usize {
        self.sync.local_size()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.sync.metrics()
    }

    /// Distributed store reads issued by this node for this cache
    pub fn remote_get_count(&self) -> u64 {
        self.sync.metrics().remote_gets
    }
}

// =============================================================================
// Typed Cache
// =============================================================================

/// JSON-encoded typed view over a [`CacheHandle`]
pub struct TypedCache<K, V> {
    inner: CacheHandle,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for TypedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K, V> TypedCache<K, V>
where
    K: Serialize,
    V: Serialize + DeserializeOwned,
{
    pub fn new(inner: CacheHandle) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn handle(&self) -> &CacheHandle {
        &self.inner
    }

    fn encode_key(key: &K) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(key)?))
    }

    fn decode(value: Option<Bytes>) -> Result<Option<V>> {
        value
            .map(|bytes| serde_json::from_slice(&bytes).map_err(Error::from))
            .transpose()
    }

    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        let value = self.inner.get(Self::encode_key(key)?).await?;
        Self::decode(value)
    }

    pub async fn put(&self, key: &K, value: &V) -> Result<()> {
        let value = Bytes::from(serde_json::to_vec(value)?);
        self.inner.put(Self::encode_key(key)?, value).await
    }

    pub async fn remove(&self, key: &K) -> Result<bool> {
        self.inner.remove(Self::encode_key(key)?).await
    }

    pub fn local_peek(&self, key: &K) -> Result<Option<V>> {
        let value = self.inner.local_peek(Self::encode_key(key)?)?;
        Self::decode(value)
    }
}

// =============================================================================
// Tests
// =============================================================================
