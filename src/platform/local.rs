//! Local Platform Cache Storage
//!
//! Sharded in-process map holding the entries a node has pulled from the
//! distributed store.
//!
//! # Design
//!
//! - Each shard has its own RwLock, so a read-through miss on one key never
//!   blocks other keys
//! - Power-of-2 shard count enables fast modulo via bitwise AND
//! - Every entry carries the store version it was produced by and only ever
//!   moves forward in version
//! - A read-through registers itself on the key before fetching; store
//!   notifications arriving meanwhile advance the entry, and the late fetch
//!   result is discarded if it is older
//! - Notifications for keys the node does not hold and is not loading are
//!   ignored: the platform cache fills on reads, not on writes
//!
//! # Entry states
//!
//! ```text
//!            begin_load                 finish_load(v)
//!  (absent) ───────────▶ loading ───────────────────────▶ live(v)
//!      ▲                    │  apply_removal                │
//!      │                    ▼                               │ apply_removal
//!      └──── last loader ── tombstone(v) ◀──────────────────┘ (while loading)
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;

use crate::store::{Version, Versioned};

/// Number of shards per platform cache
pub const PLATFORM_SHARD_COUNT: usize = 64;

#[derive(Debug, Clone)]
struct LocalEntry {
    /// `None` while loading or after a removal seen during a load
    value: Option<Bytes>,
    version: Version,
    /// Read-throughs in flight for this key
    loaders: u32,
}

impl LocalEntry {
    fn is_placeholder(&self) -> bool {
        self.value.is_none() && self.loaders == 0
    }
}

#[derive(Debug, Default)]
struct Shard {
    map: RwLock<HashMap<Bytes, LocalEntry>>,
}

/// Fast non-cryptographic hash (FxHash algorithm)
#[inline]
fn fx_hash(bytes: &[u8]) -> u64 {
    const SEED: u64 = 0x517cc1b727220a95;
    let mut hash = SEED;
    for &byte in bytes {
        hash = hash.rotate_left(5) ^ (byte as u64);
        hash = hash.wrapping_mul(SEED);
    }
    hash
}

/// Platform cache of one distributed cache on one node
#[derive(Debug)]
pub struct PlatformCache {
    shards: Box<[Shard]>,
    /// Entries holding a value
    live: AtomicU64,
}

impl Default for PlatformCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformCache {
    pub fn new() -> Self {
        let shards: Vec<Shard> = (0..PLATFORM_SHARD_COUNT).map(|_| Shard::default()).collect();
        Self {
            shards: shards.into_boxed_slice(),
            live: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let idx = (fx_hash(key) as usize) & (PLATFORM_SHARD_COUNT - 1);
        &self.shards[idx]
    }

    /// Look up a live value
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        let guard = self.shard(key).map.read();
        guard.get(key).and_then(|e| e.value.clone())
    }

    /// Version currently recorded for `key`, if any
    pub fn version(&self, key: &Bytes) -> Option<Version> {
        let guard = self.shard(key).map.read();
        guard.get(key).map(|e| e.version)
    }

    /// Register a read-through for `key`
    pub fn begin_load(&self, key: &Bytes) {
        let mut guard = self.shard(key).map.write();
        guard
            .entry(key.clone())
            .or_insert(LocalEntry {
                value: None,
                version: 0,
                loaders: 0,
            })
            .loaders += 1;
    }

    /// Complete a read-through started with [`begin_load`](Self::begin_load).
    ///
    /// Stores `fetched` unless a newer version arrived meanwhile. Returns
    /// true if the fetched value was stored.
    pub fn finish_load(&self, key: &Bytes, fetched: Option<Versioned>) -> bool {
        let mut guard = self.shard(key).map.write();
        let Some(entry) = guard.get_mut(key) else {
            return false;
        };
        entry.loaders = entry.loaders.saturating_sub(1);

        let mut stored = false;
        if let Some(fetched) = fetched {
            if fetched.version > entry.version {
                if entry.value.is_none() {
                    self.live.fetch_add(1, Ordering::Relaxed);
                }
                entry.value = Some(fetched.value);
                entry.version = fetched.version;
                stored = true;
            }
        }

        if entry.is_placeholder() {
            guard.remove(key);
        }
        stored
    }

    /// Apply a write notification.
    ///
    /// Only keys that are held or being loaded are touched.
    pub fn apply_update(&self, key: &Bytes, versioned: &Versioned) -> bool {
        let mut guard = self.shard(key).map.write();
        let Some(entry) = guard.get_mut(key) else {
            return false;
        };
        if entry.version >= versioned.version {
            return false;
        }
        if entry.value.is_none() {
            self.live.fetch_add(1, Ordering::Relaxed);
        }
        entry.value = Some(versioned.value.clone());
        entry.version = versioned.version;
        true
    }

    /// Apply a removal notification.
    ///
    /// With a load in flight a tombstone is kept so the stale fetch is
    /// rejected; otherwise the entry is dropped.
    pub fn apply_removal(&self, key: &Bytes, version: Version) -> bool {
        let mut guard = self.shard(key).map.write();
        let Entry::Occupied(mut slot) = guard.entry(key.clone()) else {
            return false;
        };
        if slot.get().version >= version {
            return false;
        }
        if slot.get().value.is_some() {
            self.live.fetch_sub(1, Ordering::Relaxed);
        }
        if slot.get().loaders == 0 {
            slot.remove();
        } else {
            let entry = slot.get_mut();
            entry.value = None;
            entry.version = version;
        }
        true
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of all live entries
    pub fn keys(&self) -> Vec<Bytes> {
        self.shards
            .iter()
            .flat_map(|shard| {
                shard
                    .map
                    .read()
                    .iter()
                    .filter(|(_, e)| e.value.is_some())
                    .map(|(k, _)| k.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Drop every entry
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.map.write().clear();
        }
        self.live.store(0, Ordering::Relaxed);
    }
}

// =============================================================================
// Tests
// =============================================================================
