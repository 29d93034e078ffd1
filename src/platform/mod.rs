//! Platform Cache Layer
//!
//! Node-local caches in front of the distributed store.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  TopologyResolver  ──verdict──▶  PlatformCacheActivator  │
//! │                                        │ per cache        │
//! │                                        ▼                  │
//! │                                  Synchronizer             │
//! │                          ┌─────────────┼────────────┐     │
//! │                          ▼             ▼            ▼     │
//! │                   PlatformCache   CacheMetrics   store    │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod activator;
pub mod local;
pub mod metrics;
pub mod resolver;
pub mod synchronizer;

pub use activator::{ActivationTrigger, PlatformCacheActivator};
pub use local::{PlatformCache, PLATFORM_SHARD_COUNT};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use resolver::{InactiveReason, TopologyResolver, Verdict};
pub use synchronizer::{CloseReason, PlatformState, Synchronizer};
