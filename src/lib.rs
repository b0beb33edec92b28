//! # Registry Replication
//!
//! Cross-region synchronization and peer replication for a service registry.
//!
//! ## Architecture
//!
//! The node maintains a locally-cached mirror of each remote-region registry
//! (the pull path) and pushes locally-originated registry events to cluster
//! peers (the push path):
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                         registry-replication                             │
//! │                                                                          │
//! │  ┌────────────────────┐   ┌─────────────────────┐   ┌────────────────┐   │
//! │  │ TimedSupervisorTask│──►│ RemoteRegistryCache │──►│ Read accessors │   │
//! │  │ (interval+backoff) │   │ (full/delta fetch)  │   │ (lock-free)    │   │
//! │  └────────────────────┘   └─────────────────────┘   └────────────────┘   │
//! │                                     │                                    │
//! │                                     ▼                                    │
//! │  ┌────────────────────┐   ┌─────────────────────┐                        │
//! │  │ ReplicationClient  │   │ Reconciliation      │                        │
//! │  │ (push to peers)    │   │ (hash check+resync) │                        │
//! │  └────────────────────┘   └─────────────────────┘                        │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two-Path Synchronization
//!
//! 1. **Delta Path**: incremental fetches merged copy-on-write into the
//!    published snapshot, verified against the server's reconcile hash
//! 2. **Full Path**: complete snapshot fetches, used on cold start, when
//!    deltas are disabled, and as the corrective resync after divergence
//!
//! Publishes on both paths are gated by generation counters so an overlapping
//! slow fetch can never clobber a newer snapshot with stale data.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use registry_replication::{RemoteRegistryCache, RemoteRegionConfig, TimedSupervisorTask};
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RemoteRegionConfig::default();
//!     let interval = config.fetch.fetch_interval_duration();
//!     let backoff_bound = config.fetch.backoff_bound;
//!     let worker_slots = config.fetch.worker_slots;
//!
//!     let cache = Arc::new(RemoteRegistryCache::new(&config).expect("Failed to build cache"));
//!
//!     let fetcher = Arc::clone(&cache);
//!     let task = TimedSupervisorTask::new(
//!         "remote-region-fetch",
//!         interval,
//!         backoff_bound,
//!         worker_slots,
//!         move || {
//!             let cache = Arc::clone(&fetcher);
//!             async move { cache.fetch_registry().await }
//!         },
//!     );
//!
//!     let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!     let handle = task.spawn(shutdown_rx);
//!
//!     // ... serve cache.applications() until shutdown ...
//!     shutdown_tx.send(true).ok();
//!     handle.await.ok();
//! }
//! ```

pub mod apps;
pub mod cache;
pub mod config;
pub mod error;
pub mod instance;
pub mod metrics;
pub mod replication;
pub mod supervisor;
pub mod transport;

// Re-exports for convenience
pub use apps::{Application, Applications};
pub use cache::RemoteRegistryCache;
pub use config::{FetchConfig, PeerNodeConfig, RemoteRegionConfig, TransportConfig};
pub use error::{RegistryError, Result};
pub use instance::{ActionType, AsgStatus, InstanceInfo, InstanceStatus, LeaseInfo};
pub use replication::{
    Action, ReplicationClient, ReplicationInstance, ReplicationInstanceResponse, ReplicationList,
    ReplicationListResponse,
};
pub use supervisor::TimedSupervisorTask;
pub use transport::{PeerResponse, RegistryTransport};
