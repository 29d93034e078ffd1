//! Domain Layer
//!
//! - **Events** (`events.rs`) - membership and cache lifecycle events
//! - **Ports** (`ports.rs`) - the `EventPublisher` abstraction
//!
//! # Usage
//!
//! ```ignore
//! use platcache::domain::{DomainEvent, EventPublisher};
//!
//! async fn announce<P: EventPublisher>(publisher: &P) -> Result<()> {
//!     publisher.publish(DomainEvent::cache_destroyed("orders")).await
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::DomainEvent;
pub use ports::EventPublisher;
