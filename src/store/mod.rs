//! Distributed Store Port
//!
//! The authoritative partitioned/replicated store that platform caches sit
//! in front of. The store is the sole source of truth and arbitrates
//! concurrent writers; every accepted write gets a version that increases
//! monotonically per key.
//!
//! # Update notifications
//!
//! Invalidation is push-based: a subscribed [`UpdateListener`] is invoked for
//! every write to its cache before the write is acknowledged to the writer.
//!
//! ```text
//!  writer ──put──▶ DistributedStore ──on_update──▶ listener (node A)
//!                         │          └─on_update──▶ listener (node B)
//!                         └──────── ack (version) ─▶ writer
//! ```

mod memory;

pub use memory::{InMemoryDistributedStore, StoreStats};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Store-assigned write version
pub type Version = u64;

/// Subscription handle returned by [`DistributedStore::subscribe`]
pub type SubscriptionId = u64;

/// A value together with the version of the write that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: Bytes,
    pub version: Version,
}

impl Versioned {
    pub fn new(value: Bytes, version: Version) -> Self {
        Self { value, version }
    }
}

/// Change applied to a key of a cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    /// Key now holds this value
    Put(Versioned),
    /// Key was removed at this version
    Removed(Version),
}

/// Notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub cache: String,
    pub key: Bytes,
    pub kind: UpdateKind,
}

impl UpdateEvent {
    pub fn version(&self) -> Version {
        match &self.kind {
            UpdateKind::Put(v) => v.version,
            UpdateKind::Removed(version) => *version,
        }
    }
}

/// Receiver of store update notifications.
///
/// Called synchronously on the writer's task; implementations must not block.
pub trait UpdateListener: Send + Sync {
    fn on_update(&self, event: &UpdateEvent);
}

/// Port for the distributed (backing) store.
#[async_trait]
pub trait DistributedStore: Send + Sync {
    /// Read a key
    async fn get(&self, cache: &str, key: &Bytes) -> Result<Option<Versioned>>;

    /// Write a key, returning the version assigned to the write
    async fn put(&self, cache: &str, key: Bytes, value: Bytes) -> Result<Version>;

    /// Remove a key, returning the removal version if the key existed
    async fn remove(&self, cache: &str, key: &Bytes) -> Result<Option<Version>>;

    /// Drop all data of a cache
    async fn destroy(&self, cache: &str) -> Result<()>;

    /// Register a listener for writes to `cache`
    fn subscribe(&self, cache: &str, listener: Arc<dyn UpdateListener>) -> SubscriptionId;

    /// Deregister a listener; returns false if the id was unknown
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Number of live subscriptions for `cache`
    fn subscriber_count(&self, cache: &str) -> usize;

    /// Store statistics
    fn stats(&self) -> StoreStats;
}
