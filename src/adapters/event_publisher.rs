//! Event Publisher Adapter
//!
//! Implements the `EventPublisher` port with various backends:
//!
//! - `LoggingEventPublisher` writes each event as a structured `tracing` record
//! - `InMemoryEventCollector` keeps an indexed event log for inspection
//! - `CompositeEventPublisher` fans events out to several publishers

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::events::DomainEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

// =============================================================================
// Logging
// =============================================================================

/// Logging-based event publisher.
///
/// Node and cache names become `tracing` fields so events can be filtered
/// the same way as the rest of the cache logs. Filter failures always log
/// at warn level.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventPublisher {
    /// Whether to log events at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a publisher that logs at info level.
    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    /// Create a publisher that logs at debug level.
    pub fn debug_level() -> Self {
        Self { info_level: false }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let event_type = event.event_type();
        let node = event.node().unwrap_or("-");
        let cache = event.cache().unwrap_or("-");

        if let DomainEvent::FilterEvaluationFailed { reason, .. } = &event {
            warn!(event_type, node = %node, cache = %cache, reason = %reason, "Domain event");
        } else if self.info_level {
            info!(event_type, node = %node, cache = %cache, at = %event.timestamp(), "Domain event");
        } else {
            debug!(event_type, node = %node, cache = %cache, at = %event.timestamp(), "Domain event");
        }
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

// =============================================================================
// In-Memory Collector
// =============================================================================

#[derive(Debug, Default)]
struct EventLog {
    events: Vec<DomainEvent>,
    by_cache: HashMap<String, Vec<usize>>,
    by_node: HashMap<String, Vec<usize>>,
}

impl EventLog {
    fn push(&mut self, event: DomainEvent) {
        let idx = self.events.len();
        if let Some(cache) = event.cache() {
            self.by_cache.entry(cache.to_string()).or_default().push(idx);
        }
        if let Some(node) = event.node() {
            self.by_node.entry(node.to_string()).or_default().push(idx);
        }
        self.events.push(event);
    }

    fn select(&self, index: Option<&Vec<usize>>) -> Vec<DomainEvent> {
        index
            .map(|idxs| idxs.iter().map(|&i| self.events[i].clone()).collect())
            .unwrap_or_default()
    }
}

/// In-memory event collector.
///
/// Keeps every event in arrival order, indexed by cache and by node. Used by
/// tests and the demo binary's summary.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    log: RwLock<EventLog>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events, in arrival order
    pub fn events(&self) -> Vec<DomainEvent> {
        self.log.read().events.clone()
    }

    pub fn len(&self) -> usize {
        self.log.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.read().events.is_empty()
    }

    pub fn clear(&self) {
        *self.log.write() = EventLog::default();
    }

    /// Events of one type, e.g. `"CacheStarted"`
    pub fn events_of_type(&self, event_type: &str) -> Vec<DomainEvent> {
        self.log
            .read()
            .events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Events concerning one cache
    pub fn events_for_cache(&self, cache: &str) -> Vec<DomainEvent> {
        let log = self.log.read();
        log.select(log.by_cache.get(cache))
    }

    /// Events concerning one node
    pub fn events_for_node(&self, node: &str) -> Vec<DomainEvent> {
        let log = self.log.read();
        log.select(log.by_node.get(node))
    }

    /// Nodes that activated a platform cache for `cache` since it was last
    /// destroyed.
    pub fn platform_nodes(&self, cache: &str) -> BTreeSet<String> {
        let log = self.log.read();
        let mut nodes = BTreeSet::new();
        for &idx in log.by_cache.get(cache).into_iter().flatten() {
            match &log.events[idx] {
                DomainEvent::PlatformCacheActivated { node, .. } => {
                    nodes.insert(node.clone());
                }
                DomainEvent::CacheDestroyed { .. } => nodes.clear(),
                _ => {}
            }
        }
        nodes
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.log.write().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        let mut log = self.log.write();
        for event in events {
            log.push(event);
        }
        Ok(())
    }
}

// =============================================================================
// Composite
// =============================================================================

/// Composite event publisher that publishes to multiple backends.
///
/// Every publisher receives every event; the first error is returned after
/// all of them have been tried.
#[derive(Default)]
pub struct CompositeEventPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl CompositeEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a publisher to the composite.
    pub fn with_publisher<P: EventPublisher + 'static>(self, publisher: P) -> Self {
        self.with_shared(Arc::new(publisher))
    }

    /// Add a shared publisher, keeping a handle to it outside the composite.
    pub fn with_shared(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

impl std::fmt::Debug for CompositeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeEventPublisher")
            .field("publisher_count", &self.publishers.len())
            .finish()
    }
}

#[async_trait]
impl EventPublisher for CompositeEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let mut first_error = None;
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(event.clone()).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        let mut first_error = None;
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish_all(events.clone()).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::error::Error;
    use crate::platform::ActivationTrigger;

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _event: DomainEvent) -> Result<()> {
            Err(Error::Internal("publisher down".to_string()))
        }

        async fn publish_all(&self, _events: Vec<DomainEvent>) -> Result<()> {
            Err(Error::Internal("publisher down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_logging_publisher() {
        let publisher = LoggingEventPublisher::info_level();
        publisher
            .publish(DomainEvent::node_joined("node_0", false))
            .await
            .unwrap();
        publisher
            .publish(DomainEvent::filter_evaluation_failed("node_0", "orders", "empty name set"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_collector_indexes() {
        let collector = InMemoryEventCollector::new();
        assert!(collector.is_empty());

        collector
            .publish_all(vec![
                DomainEvent::node_joined("node_0", false),
                DomainEvent::node_joined("node_1", true),
                DomainEvent::cache_started("node_0", "orders", ActivationTrigger::Dynamic, true),
                DomainEvent::cache_destroyed("orders"),
            ])
            .await
            .unwrap();

        assert_eq!(collector.len(), 4);
        assert_eq!(collector.events_of_type("NodeJoined").len(), 2);
        assert_eq!(collector.events_for_cache("orders").len(), 2);
        assert_eq!(collector.events_for_node("node_0").len(), 2);
        assert_eq!(collector.events_for_node("node_1").len(), 1);
        assert!(collector.events_for_cache("missing").is_empty());

        collector.clear();
        assert!(collector.is_empty());
        assert!(collector.events_for_node("node_0").is_empty());
    }

    #[tokio::test]
    async fn test_platform_nodes_reset_on_destroy() {
        let collector = InMemoryEventCollector::new();
        for node in ["node_0", "node_2"] {
            collector
                .publish(DomainEvent::platform_cache_activated(
                    node,
                    "orders",
                    ActivationTrigger::Dynamic,
                ))
                .await
                .unwrap();
        }
        assert_eq!(
            collector.platform_nodes("orders").into_iter().collect::<Vec<_>>(),
            vec!["node_0", "node_2"]
        );

        collector
            .publish(DomainEvent::cache_destroyed("orders"))
            .await
            .unwrap();
        assert!(collector.platform_nodes("orders").is_empty());
    }

    #[test]
    fn test_collector_outside_runtime() {
        let collector = InMemoryEventCollector::new();
        tokio_test::block_on(collector.publish(DomainEvent::cache_destroyed("orders"))).unwrap();
        assert_eq!(collector.events_of_type("CacheDestroyed").len(), 1);
    }

    #[tokio::test]
    async fn test_composite_delivers_past_failures() {
        let collector = Arc::new(InMemoryEventCollector::new());
        let composite = CompositeEventPublisher::new()
            .with_publisher(FailingPublisher)
            .with_publisher(LoggingEventPublisher::debug_level())
            .with_shared(collector.clone());
        assert_eq!(composite.len(), 3);

        let result = composite.publish(DomainEvent::node_left("node_0")).await;
        assert_matches!(result, Err(Error::Internal(_)));
        assert_eq!(collector.len(), 1);
    }
}
