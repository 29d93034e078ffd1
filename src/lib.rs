//! platcache - Node-Filtered Platform Cache
//!
//! A platform cache is a node-local, read-through cache in front of a
//! partitioned or replicated distributed cache. A node filter carried in the
//! cache configuration decides which nodes host one; the rest read the
//! distributed store directly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Cluster                               │
//! │   NodeConfig ─▶ ClusterNode (attributes) ─▶ PlatformCacheActivator│
//! │                                                  │                │
//! │   DistributedCacheConfig + NodeFilter ──▶ TopologyResolver        │
//! │                                                  │ verdict        │
//! │                                                  ▼                │
//! │                     Synchronizer (Inactive | Active)              │
//! │                       │                 ▲                         │
//! │                  get/put/remove    update notifications           │
//! │                       ▼                 │                         │
//! │                      DistributedStore ──┘                         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use platcache::{Cluster, DistributedCacheConfig, NodeConfig, NodeFilter};
//!
//! let cluster = Cluster::new();
//! let n0 = cluster.start_node(NodeConfig::new("node_0")).await?;
//! let n1 = cluster.start_node(NodeConfig::new("node_1")).await?;
//!
//! let cache = n1
//!     .create_cache(
//!         DistributedCacheConfig::new("orders")
//!             .with_node_filter(NodeFilter::match_names(["node_0"])),
//!     )
//!     .await?;
//! assert!(!cache.has_platform_cache());
//! assert!(n0.cache("orders")?.has_platform_cache());
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Event publishers and the Prometheus exporter
//! - [`cluster`] - Node identity, membership and the cluster harness
//! - [`config`] - Cache and node configuration, YAML/JSON loading
//! - [`domain`] - Domain events and the publisher port
//! - [`error`] - Error types
//! - [`filter`] - Node filters
//! - [`node`] - Node, cache handles and typed caches
//! - [`platform`] - Resolver, activator, synchronizer, local storage, metrics
//! - [`store`] - Distributed store port and in-memory implementation

pub mod adapters;
pub mod cluster;
pub mod config;
pub mod domain;
pub mod error;
pub mod filter;
pub mod node;
pub mod platform;
pub mod store;

// Re-export commonly used types
pub use cluster::{AttributeValue, Cluster, ClusterNode, NodeId, NodeRole};
pub use config::{CacheMode, ClusterFile, DistributedCacheConfig, NodeConfig, PlatformCacheConfig};
pub use error::{Error, Result};
pub use filter::NodeFilter;
pub use node::{CacheHandle, Node, TypedCache};
pub use platform::MetricsSnapshot;
pub use store::{DistributedStore, InMemoryDistributedStore};
