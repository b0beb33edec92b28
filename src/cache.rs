//! Remote registry cache: the synchronization state machine.
//!
//! [`RemoteRegistryCache`] maintains a locally-cached view of all service
//! instances known to a remote-region registry and keeps it consistent
//! through periodic refresh cycles (driven by
//! [`TimedSupervisorTask`](crate::supervisor::TimedSupervisorTask)).
//!
//! # Refresh cycle
//!
//! ```text
//!               ┌──────────────────────────────────────────────┐
//!               │ fetch_registry()                             │
//!               │                                              │
//!  delta off or │   FULL: GET apps/ ──► CAS full generation    │
//!  empty cache ─┼──►       win: publish ─ lose: discard        │
//!               │                                              │
//!     otherwise │   DELTA: GET apps/delta                      │
//!              ─┼──►  no usable payload: cycle fails,          │
//!               │                        no state change       │
//!               │     CAS delta generation                     │
//!               │       lose: drop delta, done                 │
//!               │       win: publish delta snapshot,           │
//!               │            publish merged primary (COW)      │
//!               │            hash mismatch? ──► corrective     │
//!               │                               full resync    │
//!               └──────────────────────────────────────────────┘
//! ```
//!
//! # Concurrency
//!
//! There are no locks. The published snapshots are `ArcSwap` pointers
//! replaced as whole units; the two generation counters are the only other
//! mutable shared state, advanced with compare-and-set so a slow, overlapping
//! cycle can never overwrite a newer snapshot with stale data. Reader
//! accessors never block on an in-progress fetch.
//!
//! Delta merges are copy-on-write: the merged result is built as a fresh
//! [`Applications`] value and published with a single atomic swap, so readers
//! always observe either the pre-merge or post-merge snapshot, never a
//! half-merged one. The merge itself runs under `ArcSwap::rcu`, re-merging
//! against any snapshot published concurrently instead of overwriting it.
//!
//! # Degradation
//!
//! The `ready_for_serving` flag transitions from `false` to `true` on the
//! first successful fetch of either kind and never reverts: once the node
//! has data, stale-but-available beats unavailable. All fetch failures are
//! contained in the failing cycle and reported as a boolean.

use crate::apps::Applications;
use crate::config::RemoteRegionConfig;
use crate::error::{RegistryError, Result};
use crate::instance::InstanceInfo;
use crate::metrics;
use crate::replication::ReplicationClient;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Locally-cached view of a remote-region registry.
pub struct RemoteRegistryCache {
    region_name: String,
    client: ReplicationClient,
    disable_delta: bool,

    /// Primary published snapshot. Replaced wholesale, never mutated.
    apps: ArcSwap<Applications>,
    /// Last delta payload actually applied (diagnostic view).
    apps_delta: ArcSwap<Applications>,

    // Monotonically increasing commit counters. Stale cycles lose the
    // compare-and-set and discard their result instead of publishing.
    full_generation: AtomicU64,
    delta_generation: AtomicU64,

    /// Latches true on first successful fetch; never reverts.
    ready_for_serving: AtomicBool,
}

impl RemoteRegistryCache {
    /// Create a cache for one remote region. Performs no network I/O;
    /// call [`fetch_registry`](Self::fetch_registry) to populate it.
    pub fn new(config: &RemoteRegionConfig) -> Result<Self> {
        let client = ReplicationClient::remote_region(config)?;
        info!(
            region = %config.region_name,
            base_url = %config.base_url,
            disable_delta = config.fetch.disable_delta,
            "Created remote registry cache"
        );
        Ok(Self {
            region_name: config.region_name.clone(),
            client,
            disable_delta: config.fetch.disable_delta,
            apps: ArcSwap::from_pointee(Applications::new()),
            apps_delta: ArcSwap::from_pointee(Applications::new()),
            full_generation: AtomicU64::new(0),
            delta_generation: AtomicU64::new(0),
            ready_for_serving: AtomicBool::new(false),
        })
    }

    /// Region this cache mirrors.
    pub fn region_name(&self) -> &str {
        &self.region_name
    }

    /// Whether at least one fetch has ever succeeded.
    ///
    /// The only externally visible health signal; it never transitions back
    /// to `false` once set.
    pub fn is_ready_for_serving(&self) -> bool {
        self.ready_for_serving.load(Ordering::Acquire)
    }

    // =========================================================================
    // Refresh cycle
    // =========================================================================

    /// Run one refresh cycle: delta fetch when possible, full fetch when the
    /// cache is empty or deltas are disabled.
    ///
    /// Never panics and never propagates an error: any transport, decode, or
    /// unexpected fault aborts this cycle only and is reported as `false`.
    pub async fn fetch_registry(&self) -> bool {
        let start = Instant::now();
        let use_full = self.disable_delta || self.applications().app_count() == 0;
        let mode = if use_full { "full" } else { "delta" };

        let result = if use_full {
            debug!(
                region = %self.region_name,
                disable_delta = self.disable_delta,
                "Refresh cycle using full fetch"
            );
            self.store_full_registry().await
        } else {
            self.fetch_and_apply_delta().await
        };

        metrics::record_fetch_duration(&self.region_name, start.elapsed());

        match result {
            Ok(()) => {
                self.ready_for_serving.store(true, Ordering::Release);
                let total = self.applications().total_instance_count();
                metrics::record_fetch_cycle(&self.region_name, mode, true);
                metrics::set_cached_instances(&self.region_name, total);
                debug!(
                    region = %self.region_name,
                    mode,
                    total_instances = total,
                    "Refresh cycle complete"
                );
                true
            }
            Err(e) => {
                metrics::record_fetch_cycle(&self.region_name, mode, false);
                error!(
                    region = %self.region_name,
                    mode,
                    error = %e,
                    "Unable to fetch registry information from remote region"
                );
                false
            }
        }
    }

    /// Fetch the full registry and publish it, gated by the full-snapshot
    /// generation counter.
    ///
    /// If the compare-and-set fails, a concurrent cycle already committed a
    /// newer (or equal) snapshot; this result is discarded and the cycle
    /// still counts as successful.
    pub async fn store_full_registry(&self) -> Result<()> {
        let generation = self.full_generation.load(Ordering::Acquire);
        let apps = self.fetch_full_snapshot().await?;

        if self
            .full_generation
            .compare_exchange(generation, generation + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let total = apps.total_instance_count();
            self.apps.store(Arc::new(apps));
            info!(
                region = %self.region_name,
                generation = generation + 1,
                total_instances = total,
                "Stored full registry snapshot"
            );
        } else {
            metrics::record_generation_race_lost(&self.region_name, "full");
            warn!(
                region = %self.region_name,
                "Not updating full registry as another cycle is ahead"
            );
        }
        Ok(())
    }

    /// Delta-path refresh: fetch, CAS-gate, publish, merge, reconcile.
    async fn fetch_and_apply_delta(&self) -> Result<()> {
        let generation = self.delta_generation.load(Ordering::Acquire);
        let response = self.client.get_delta().await?;

        // No usable delta payload aborts the cycle with no state change; the
        // next cycle decides its own mode.
        if response.status != 200 {
            return Err(RegistryError::status("getDelta", response.status));
        }
        let Some(delta) = response.entity else {
            return Err(RegistryError::decode("getDelta", "no usable delta payload"));
        };

        if self
            .delta_generation
            .compare_exchange(generation, generation + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // A newer cycle already applied its delta; ours is stale. Drop it
            // entirely rather than merging out-of-order state.
            metrics::record_generation_race_lost(&self.region_name, "delta");
            warn!(
                region = %self.region_name,
                "Not applying delta as another cycle is ahead"
            );
            return Ok(());
        }

        self.apps_delta.store(Arc::new(delta.clone()));
        // Merge with rcu so a full publish landing between the read and the
        // store triggers a re-merge against it instead of being overwritten.
        let mut local_hash = String::new();
        self.apps.rcu(|current| {
            let merged = current.with_delta_applied(&delta);
            local_hash = merged.reconcile_hash_code();
            merged
        });
        debug!(
            region = %self.region_name,
            generation = generation + 1,
            delta_instances = delta.total_instance_count(),
            "Applied delta to registry snapshot"
        );

        match delta.apps_hash_code() {
            Some(server_hash) if server_hash != local_hash => {
                self.reconcile_and_log_difference(&local_hash, server_hash).await
            }
            _ => Ok(()),
        }
    }

    /// Corrective full resync after a reconcile-hash divergence.
    ///
    /// Replaces both published snapshots with a freshly fetched full
    /// registry, bypassing the generation counters: this is not a routine
    /// commit and must win over any in-flight one. The per-instance diff is
    /// logged for operators before the swap.
    async fn reconcile_and_log_difference(
        &self,
        local_hash: &str,
        server_hash: &str,
    ) -> Result<()> {
        metrics::record_reconciliation(&self.region_name);
        warn!(
            region = %self.region_name,
            client_hash = local_hash,
            server_hash,
            "Reconcile hash codes do not match, getting the full registry"
        );

        let server_apps = self.fetch_full_snapshot().await?;

        let diff = self.applications().reconcile_diff(&server_apps);
        for (app_name, discrepancies) in &diff {
            warn!(
                region = %self.region_name,
                app = %app_name,
                ?discrepancies,
                "Registry divergence detail"
            );
        }

        let resynced_hash = server_apps.reconcile_hash_code();
        let server_apps = Arc::new(server_apps);
        self.apps.store(Arc::clone(&server_apps));
        self.apps_delta.store(server_apps);
        warn!(
            region = %self.region_name,
            client_hash = %resynced_hash,
            server_hash,
            "Reconcile hash codes after complete sync up"
        );
        Ok(())
    }

    /// GET the full snapshot, treating anything but 200-with-body as a
    /// cycle failure.
    async fn fetch_full_snapshot(&self) -> Result<Applications> {
        let response = self.client.get_applications().await?;
        if response.status != 200 {
            return Err(RegistryError::status("getApplications", response.status));
        }
        response
            .entity
            .ok_or_else(|| RegistryError::decode("getApplications", "response body is empty"))
    }

    // =========================================================================
    // Read accessors (lock-free; never blocked by an in-progress fetch)
    // =========================================================================

    /// The currently published snapshot.
    pub fn applications(&self) -> Arc<Applications> {
        self.apps.load_full()
    }

    /// One application from the current snapshot.
    pub fn application(&self, name: &str) -> Option<crate::apps::Application> {
        self.apps.load().get_application(name).cloned()
    }

    /// All instances with the given id across applications.
    pub fn instances_by_id(&self, id: &str) -> Vec<InstanceInfo> {
        self.apps
            .load()
            .instances_by_id(id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The last delta payload actually applied (or the full resync result
    /// after a divergence).
    pub fn application_deltas(&self) -> Arc<Applications> {
        self.apps_delta.load_full()
    }

    /// Current (full, delta) commit generations. Diagnostic only.
    pub fn generations(&self) -> (u64, u64) {
        (
            self.full_generation.load(Ordering::Acquire),
            self.delta_generation.load(Ordering::Acquire),
        )
    }
}
