//! Prometheus Exporter
//!
//! Publishes per (node, cache) metrics snapshots as Prometheus gauges in a
//! private registry. Each `observe` call overwrites the previous values and
//! drops the series of caches that are no longer running.

use std::collections::HashSet;

use parking_lot::Mutex;
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use tracing::debug;

use crate::cluster::Cluster;
use crate::error::{Error, Result};
use crate::node::CacheHandle;

const LABELS: &[&str] = &["node", "cache", "has_platform_cache"];

type SeriesKey = [String; 3];

/// Prometheus view of cache metrics
pub struct PrometheusExporter {
    registry: Registry,
    cache_gets: IntGaugeVec,
    cache_puts: IntGaugeVec,
    cache_removals: IntGaugeVec,
    remote_gets: IntGaugeVec,
    platform_hits: IntGaugeVec,
    invalidations: IntGaugeVec,
    platform_entries: IntGaugeVec,
    /// Label values of every series currently exported
    series: Mutex<HashSet<SeriesKey>>,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGaugeVec> {
    let vec = IntGaugeVec::new(Opts::new(name, help).namespace("platcache"), LABELS)
        .map_err(|e| Error::Internal(format!("Invalid metric {}: {}", name, e)))?;
    registry
        .register(Box::new(vec.clone()))
        .map_err(|e| Error::Internal(format!("Failed to register metric {}: {}", name, e)))?;
    Ok(vec)
}

impl PrometheusExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            cache_gets: gauge(&registry, "cache_gets", "Reads issued by callers")?,
            cache_puts: gauge(&registry, "cache_puts", "Writes issued by callers")?,
            cache_removals: gauge(&registry, "cache_removals", "Removals issued by callers")?,
            remote_gets: gauge(&registry, "remote_gets", "Reads served by the distributed store")?,
            platform_hits: gauge(&registry, "platform_hits", "Reads served by the platform cache")?,
            invalidations: gauge(
                &registry,
                "invalidations",
                "Platform cache entries changed by store notifications",
            )?,
            platform_entries: gauge(&registry, "platform_entries", "Live platform cache entries")?,
            series: Mutex::new(HashSet::new()),
            registry,
        })
    }

    fn vecs(&self) -> [&IntGaugeVec; 7] {
        [
            &self.cache_gets,
            &self.cache_puts,
            &self.cache_removals,
            &self.remote_gets,
            &self.platform_hits,
            &self.invalidations,
            &self.platform_entries,
        ]
    }

    /// Record the current metrics of one cache handle
    pub fn observe_cache(&self, handle: &CacheHandle) {
        self.record(handle);
    }

    fn record(&self, handle: &CacheHandle) -> SeriesKey {
        let platform = if handle.has_platform_cache() {
            "true"
        } else {
            "false"
        };
        let labels = [handle.node(), handle.name(), platform];
        let snapshot = handle.metrics();

        let set = |vec: &IntGaugeVec, value: u64| {
            vec.with_label_values(&labels)
                .set(i64::try_from(value).unwrap_or(i64::MAX));
        };
        set(&self.cache_gets, snapshot.cache_gets);
        set(&self.cache_puts, snapshot.cache_puts);
        set(&self.cache_removals, snapshot.cache_removals);
        set(&self.remote_gets, snapshot.remote_gets);
        set(&self.platform_hits, snapshot.platform_hits);
        set(&self.invalidations, snapshot.invalidations);
        set(&self.platform_entries, snapshot.platform_entries);

        let key = labels.map(str::to_string);
        self.series.lock().insert(key.clone());
        key
    }

    /// Record every cache on every running node, removing the series of
    /// stopped nodes and destroyed caches.
    pub fn observe(&self, cluster: &std::sync::Arc<Cluster>) {
        let mut live = HashSet::new();
        for member in cluster.nodes() {
            let Ok(node) = cluster.node(member.name()) else {
                continue;
            };
            for handle in node.caches() {
                live.insert(self.record(&handle));
            }
        }

        let mut series = self.series.lock();
        let stale: Vec<SeriesKey> = series.difference(&live).cloned().collect();
        for key in &stale {
            let labels = [key[0].as_str(), key[1].as_str(), key[2].as_str()];
            for vec in self.vecs() {
                if let Err(e) = vec.remove_label_values(&labels) {
                    debug!(node = %key[0], cache = %key[1], error = %e, "Metric series already gone");
                }
            }
            series.remove(key);
        }
        debug!(caches = live.len(), removed = stale.len(), "Prometheus metrics refreshed");
    }

    /// Text exposition of the registry
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("Metrics are not valid UTF-8: {}", e)))
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

impl std::fmt::Debug for PrometheusExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusExporter").finish_non_exhaustive()
    }
}
