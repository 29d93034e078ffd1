//! In-Memory Distributed Store
//!
//! Single-process stand-in for the partitioned/replicated storage engine.
//! Uses DashMap for concurrent access; per-key versions are assigned while
//! the key's entry lock is held, so version order equals write order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::one::Ref;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::trace;

use super::{
    DistributedStore, SubscriptionId, UpdateEvent, UpdateKind, UpdateListener, Version, Versioned,
};
use crate::error::{Error, Result};

/// Stored slot; `value == None` is a removal tombstone
#[derive(Debug, Clone)]
struct StoredEntry {
    value: Option<Bytes>,
    version: Version,
}

struct Subscription {
    cache: String,
    listener: Arc<dyn UpdateListener>,
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Live keys across all caches
    pub object_count: u64,
    /// Read operations served
    pub reads: u64,
    /// Write operations accepted
    pub writes: u64,
    /// Removals of existing keys
    pub deletes: u64,
    /// Notifications delivered to listeners
    pub notifications: u64,
    /// Live subscriptions
    pub subscriptions: u64,
}

/// In-memory distributed store
pub struct InMemoryDistributedStore {
    /// cache -> key -> entry
    data: DashMap<String, DashMap<Bytes, StoredEntry>>,
    subscriptions: RwLock<BTreeMap<SubscriptionId, Subscription>>,
    next_version: AtomicU64,
    next_subscription: AtomicU64,
    available: AtomicBool,
    latency: Option<Duration>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    notifications: AtomicU64,
}

impl Default for InMemoryDistributedStore {
    fn default() -> Self {
        Self {
            data: DashMap::new(),
            subscriptions: RwLock::new(BTreeMap::new()),
            next_version: AtomicU64::new(0),
            next_subscription: AtomicU64::new(0),
            available: AtomicBool::new(true),
            latency: None,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            notifications: AtomicU64::new(0),
        }
    }
}

impl InMemoryDistributedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a network round trip on every operation
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Toggle reachability; while unavailable every operation fails
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn round_trip(&self, cache: &str) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if !self.is_available() {
            return Err(Error::RemoteUnavailable {
                cache: cache.to_string(),
                reason: "store unreachable".to_string(),
            });
        }
        Ok(())
    }

    fn bucket(&self, cache: &str) -> Ref<'_, String, DashMap<Bytes, StoredEntry>> {
        if let Some(bucket) = self.data.get(cache) {
            return bucket;
        }
        self.data.entry(cache.to_string()).or_default().downgrade()
    }

    fn assign_version(&self) -> Version {
        self.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn notify(&self, event: UpdateEvent) {
        let listeners: Vec<Arc<dyn UpdateListener>> = self
            .subscriptions
            .read()
            .values()
            .filter(|s| s.cache == event.cache)
            .map(|s| s.listener.clone())
            .collect();

        trace!(
            cache = %event.cache,
            version = event.version(),
            listeners = listeners.len(),
            "Delivering update notification"
        );

        for listener in listeners {
            listener.on_update(&event);
            self.notifications.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl DistributedStore for InMemoryDistributedStore {
    async fn get(&self, cache: &str, key: &Bytes) -> Result<Option<Versioned>> {
        self.round_trip(cache).await?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let Some(bucket) = self.data.get(cache) else {
            return Ok(None);
        };
        let result = bucket.get(key).and_then(|entry| {
            entry
                .value
                .clone()
                .map(|value| Versioned::new(value, entry.version))
        });
        Ok(result)
    }

    async fn put(&self, cache: &str, key: Bytes, value: Bytes) -> Result<Version> {
        self.round_trip(cache).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        let version = {
            let bucket = self.bucket(cache);
            let mut slot = bucket.entry(key.clone()).or_insert(StoredEntry {
                value: None,
                version: 0,
            });
            let version = self.assign_version();
            *slot = StoredEntry {
                value: Some(value.clone()),
                version,
            };
            version
        };

        self.notify(UpdateEvent {
            cache: cache.to_string(),
            key,
            kind: UpdateKind::Put(Versioned::new(value, version)),
        });
        Ok(version)
    }

    async fn remove(&self, cache: &str, key: &Bytes) -> Result<Option<Version>> {
        self.round_trip(cache).await?;

        let removed = {
            let Some(bucket) = self.data.get(cache) else {
                return Ok(None);
            };
            let Some(mut slot) = bucket.get_mut(key) else {
                return Ok(None);
            };
            if slot.value.is_none() {
                None
            } else {
                let version = self.assign_version();
                *slot = StoredEntry {
                    value: None,
                    version,
                };
                Some(version)
            }
        };

        if let Some(version) = removed {
            self.deletes.fetch_add(1, Ordering::Relaxed);
            self.notify(UpdateEvent {
                cache: cache.to_string(),
                key: key.clone(),
                kind: UpdateKind::Removed(version),
            });
        }
        Ok(removed)
    }

    async fn destroy(&self, cache: &str) -> Result<()> {
        self.data.remove(cache);
        Ok(())
    }

    fn subscribe(&self, cache: &str, listener: Arc<dyn UpdateListener>) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1;
        self.subscriptions.write().insert(
            id,
            Subscription {
                cache: cache.to_string(),
                listener,
            },
        );
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.write().remove(&id).is_some()
    }

    fn subscriber_count(&self, cache: &str) -> usize {
        self.subscriptions
            .read()
            .values()
            .filter(|s| s.cache == cache)
            .count()
    }

    fn stats(&self) -> StoreStats {
        let object_count = self
            .data
            .iter()
            .map(|bucket| bucket.iter().filter(|e| e.value.is_some()).count() as u64)
            .sum();

        StoreStats {
            object_count,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.read().len() as u64,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<UpdateEvent>>,
    }

    impl UpdateListener for Recorder {
        fn on_update(&self, event: &UpdateEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn test_put_get() {
        let store = InMemoryDistributedStore::new();

        let version = store.put("cache", key("k"), key("v")).await.unwrap();
        let got = store.get("cache", &key("k")).await.unwrap().unwrap();

        assert_eq!(got.value, key("v"));
        assert_eq!(got.version, version);
    }

    #[tokio::test]
    async fn test_versions_increase() {
        let store = InMemoryDistributedStore::new();

        let v1 = store.put("cache", key("k"), key("a")).await.unwrap();
        let v2 = store.put("cache", key("k"), key("b")).await.unwrap();
        let v3 = store.remove("cache", &key("k")).await.unwrap().unwrap();

        assert!(v1 < v2 && v2 < v3);
    }

    #[tokio::test]
    async fn test_remove_missing_key() {
        let store = InMemoryDistributedStore::new();
        assert_eq!(store.remove("cache", &key("nope")).await.unwrap(), None);

        store.put("cache", key("k"), key("v")).await.unwrap();
        assert!(store.remove("cache", &key("k")).await.unwrap().is_some());
        // Second removal of a tombstone is a no-op
        assert_eq!(store.remove("cache", &key("k")).await.unwrap(), None);
        assert!(store.get("cache", &key("k")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_caches_are_isolated() {
        let store = InMemoryDistributedStore::new();
        store.put("a", key("k"), key("1")).await.unwrap();

        assert!(store.get("b", &key("k")).await.unwrap().is_none());

        store.destroy("a").await.unwrap();
        assert!(store.get("a", &key("k")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listeners_notified_per_cache() {
        let store = InMemoryDistributedStore::new();
        let on_a = Arc::new(Recorder::default());
        let on_b = Arc::new(Recorder::default());

        store.subscribe("a", on_a.clone());
        store.subscribe("b", on_b.clone());

        let version = store.put("a", key("k"), key("v")).await.unwrap();
        store.remove("a", &key("k")).await.unwrap();

        let events = on_a.events.lock().clone();
        assert_eq!(events.len(), 2);
        assert_matches!(&events[0].kind, UpdateKind::Put(v) if v.version == version);
        assert_matches!(&events[1].kind, UpdateKind::Removed(_));
        assert!(on_b.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let store = InMemoryDistributedStore::new();
        let recorder = Arc::new(Recorder::default());

        let id = store.subscribe("a", recorder.clone());
        assert_eq!(store.subscriber_count("a"), 1);
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        assert_eq!(store.subscriber_count("a"), 0);

        store.put("a", key("k"), key("v")).await.unwrap();
        assert!(recorder.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = InMemoryDistributedStore::new();
        store.set_available(false);

        let result = store.get("cache", &key("k")).await;
        assert_matches!(result, Err(Error::RemoteUnavailable { .. }));
        assert_matches!(
            store.put("cache", key("k"), key("v")).await,
            Err(Error::RemoteUnavailable { .. })
        );

        store.set_available(true);
        assert!(store.get("cache", &key("k")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats() {
        let store = InMemoryDistributedStore::new();
        store.subscribe("cache", Arc::new(Recorder::default()));

        store.put("cache", key("k1"), key("v1")).await.unwrap();
        store.put("cache", key("k2"), key("v2")).await.unwrap();
        store.get("cache", &key("k1")).await.unwrap();
        store.remove("cache", &key("k2")).await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.object_count, 1);
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.notifications, 3);
        assert_eq!(stats.subscriptions, 1);
    }
}
