//! Domain Events
//!
//! Immutable records of membership and cache lifecycle changes.
//!
//! # Example
//!
//! ```ignore
//! let event = DomainEvent::platform_cache_activated("node_0", "orders", ActivationTrigger::Dynamic);
//! event_publisher.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::ActivationTrigger;

/// Domain event representing a significant occurrence in the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // =========================================================================
    // Membership Events
    // =========================================================================
    /// A node joined the cluster.
    NodeJoined {
        node: String,
        client: bool,
        timestamp: DateTime<Utc>,
    },

    /// A node left the cluster.
    NodeLeft {
        node: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Cache Events
    // =========================================================================
    /// A distributed cache started on a node.
    CacheStarted {
        node: String,
        cache: String,
        trigger: String,
        has_platform_cache: bool,
        timestamp: DateTime<Utc>,
    },

    /// A platform cache was installed for a cache on a node.
    PlatformCacheActivated {
        node: String,
        cache: String,
        trigger: String,
        timestamp: DateTime<Utc>,
    },

    /// A node filter could not be evaluated; the node stayed inactive.
    FilterEvaluationFailed {
        node: String,
        cache: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A distributed cache was destroyed cluster-wide.
    CacheDestroyed {
        cache: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the event timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::NodeJoined { timestamp, .. } => *timestamp,
            DomainEvent::NodeLeft { timestamp, .. } => *timestamp,
            DomainEvent::CacheStarted { timestamp, .. } => *timestamp,
            DomainEvent::PlatformCacheActivated { timestamp, .. } => *timestamp,
            DomainEvent::FilterEvaluationFailed { timestamp, .. } => *timestamp,
            DomainEvent::CacheDestroyed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::NodeJoined { .. } => "NodeJoined",
            DomainEvent::NodeLeft { .. } => "NodeLeft",
            DomainEvent::CacheStarted { .. } => "CacheStarted",
            DomainEvent::PlatformCacheActivated { .. } => "PlatformCacheActivated",
            DomainEvent::FilterEvaluationFailed { .. } => "FilterEvaluationFailed",
            DomainEvent::CacheDestroyed { .. } => "CacheDestroyed",
        }
    }

    /// Get the node name if applicable.
    pub fn node(&self) -> Option<&str> {
        match self {
            DomainEvent::NodeJoined { node, .. } => Some(node),
            DomainEvent::NodeLeft { node, .. } => Some(node),
            DomainEvent::CacheStarted { node, .. } => Some(node),
            DomainEvent::PlatformCacheActivated { node, .. } => Some(node),
            DomainEvent::FilterEvaluationFailed { node, .. } => Some(node),
            DomainEvent::CacheDestroyed { .. } => None,
        }
    }

    /// Get the cache name if applicable.
    pub fn cache(&self) -> Option<&str> {
        match self {
            DomainEvent::CacheStarted { cache, .. } => Some(cache),
            DomainEvent::PlatformCacheActivated { cache, .. } => Some(cache),
            DomainEvent::FilterEvaluationFailed { cache, .. } => Some(cache),
            DomainEvent::CacheDestroyed { cache, .. } => Some(cache),
            _ => None,
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl DomainEvent {
    pub fn node_joined(node: impl Into<String>, client: bool) -> Self {
        DomainEvent::NodeJoined {
            node: node.into(),
            client,
            timestamp: Utc::now(),
        }
    }

    pub fn node_left(node: impl Into<String>) -> Self {
        DomainEvent::NodeLeft {
            node: node.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn cache_started(
        node: impl Into<String>,
        cache: impl Into<String>,
        trigger: ActivationTrigger,
        has_platform_cache: bool,
    ) -> Self {
        DomainEvent::CacheStarted {
            node: node.into(),
            cache: cache.into(),
            trigger: trigger.to_string(),
            has_platform_cache,
            timestamp: Utc::now(),
        }
    }

    pub fn platform_cache_activated(
        node: impl Into<String>,
        cache: impl Into<String>,
        trigger: ActivationTrigger,
    ) -> Self {
        DomainEvent::PlatformCacheActivated {
            node: node.into(),
            cache: cache.into(),
            trigger: trigger.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn filter_evaluation_failed(
        node: impl Into<String>,
        cache: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        DomainEvent::FilterEvaluationFailed {
            node: node.into(),
            cache: cache.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn cache_destroyed(cache: impl Into<String>) -> Self {
        DomainEvent::CacheDestroyed {
            cache: cache.into(),
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = DomainEvent::platform_cache_activated("node_0", "orders", ActivationTrigger::Dynamic);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("PlatformCacheActivated"));
        assert!(json.contains("orders"));
        assert!(json.contains("dynamic"));

        let deserialized: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.event_type(), "PlatformCacheActivated");
    }

    #[test]
    fn test_node_and_cache_extraction() {
        let event = DomainEvent::cache_started("node_2", "orders", ActivationTrigger::Static, false);
        assert_eq!(event.node(), Some("node_2"));
        assert_eq!(event.cache(), Some("orders"));

        let destroyed = DomainEvent::cache_destroyed("orders");
        assert_eq!(destroyed.node(), None);
        assert_eq!(destroyed.cache(), Some("orders"));

        let joined = DomainEvent::node_joined("node_3", true);
        assert_eq!(joined.cache(), None);
    }

    #[test]
    fn test_timestamp() {
        let before = Utc::now();
        let event = DomainEvent::node_left("node_1");
        let after = Utc::now();

        assert!(event.timestamp() >= before);
        assert!(event.timestamp() <= after);
    }
}
