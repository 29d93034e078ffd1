//! Domain Ports
//!
//! Trait abstractions for side effects the platform layer emits.

use async_trait::async_trait;

use super::events::DomainEvent;
use crate::error::Result;

/// Port for publishing domain events.
///
/// Publishing is best effort: callers log a failed publish and carry on.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()>;
}
