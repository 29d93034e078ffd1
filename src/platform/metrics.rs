//! Platform Cache Metrics
//!
//! Per (node, cache) operation counters. Counters only move forward; they
//! reset when the cache or the node restarts.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operation counters of one cache on one node
#[derive(Debug, Default)]
pub struct CacheMetrics {
    cache_gets: AtomicU64,
    cache_puts: AtomicU64,
    cache_removals: AtomicU64,
    remote_gets: AtomicU64,
    platform_hits: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A read was issued by a caller
    pub fn record_get(&self) {
        self.cache_gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_put(&self) {
        self.cache_puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_removal(&self) {
        self.cache_removals.fetch_add(1, Ordering::Relaxed);
    }

    /// A read was answered by the distributed store
    pub fn record_remote_get(&self) {
        self.remote_gets.fetch_add(1, Ordering::Relaxed);
    }

    /// A read was answered by the platform cache
    pub fn record_platform_hit(&self) {
        self.platform_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A store notification changed a local entry
    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_gets(&self) -> u64 {
        self.cache_gets.load(Ordering::Relaxed)
    }

    pub fn remote_gets(&self) -> u64 {
        self.remote_gets.load(Ordering::Relaxed)
    }

    pub fn platform_hits(&self) -> u64 {
        self.platform_hits.load(Ordering::Relaxed)
    }

    /// Fraction of reads served locally
    pub fn platform_hit_ratio(&self) -> f64 {
        let hits = self.platform_hits() as f64;
        let total = self.cache_gets() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Snapshot of all counters; `platform_entries` is supplied by the caller
    pub fn snapshot(&self, platform_entries: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_gets: self.cache_gets(),
            cache_puts: self.cache_puts.load(Ordering::Relaxed),
            cache_removals: self.cache_removals.load(Ordering::Relaxed),
            remote_gets: self.remote_gets(),
            platform_hits: self.platform_hits(),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            platform_entries,
            platform_hit_ratio: self.platform_hit_ratio(),
        }
    }
}

/// Point-in-time view of [`CacheMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub cache_gets: u64,
    pub cache_puts: u64,
    pub cache_removals: u64,
    pub remote_gets: u64,
    pub platform_hits: u64,
    pub invalidations: u64,
    pub platform_entries: u64,
    pub platform_hit_ratio: f64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.snapshot(0), MetricsSnapshot::default());
    }

    #[test]
    fn test_hit_tracking() {
        let metrics = CacheMetrics::new();

        for _ in 0..3 {
            metrics.record_get();
        }
        metrics.record_remote_get();
        metrics.record_platform_hit();
        metrics.record_platform_hit();

        assert_eq!(metrics.cache_gets(), 3);
        assert_eq!(metrics.remote_gets(), 1);
        assert!((metrics.platform_hit_ratio() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_snapshot() {
        let metrics = CacheMetrics::new();
        metrics.record_put();
        metrics.record_removal();
        metrics.record_invalidation();

        let snapshot = metrics.snapshot(7);
        assert_eq!(snapshot.cache_puts, 1);
        assert_eq!(snapshot.cache_removals, 1);
        assert_eq!(snapshot.invalidations, 1);
        assert_eq!(snapshot.platform_entries, 7);
    }
}
