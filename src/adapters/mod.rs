//! Infrastructure Adapters
//!
//! Implementations of the domain ports and outward-facing exporters.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       Domain Layer                          │
//! │          EventPublisher (port)   MetricsSnapshot            │
//! └────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │                   Adapters (This Module)                    │
//! │  LoggingEventPublisher │ InMemoryEventCollector            │
//! │  CompositeEventPublisher │ PrometheusExporter              │
//! └────────────────────────────────────────────────────────────┘
//! ```

mod event_publisher;
mod prometheus;

pub use event_publisher::{CompositeEventPublisher, InMemoryEventCollector, LoggingEventPublisher};
pub use prometheus::PrometheusExporter;
