//! Reclaim of leases that no longer represent a live reservation.
//!
//! Two independent checks feed one decision: TTL expiry catches runs whose
//! process vanished without cleanup, the liveness cross-check catches runs
//! whose expensive resource is gone before the TTL elapses.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use slotgate_core::AppResult;
use slotgate_domain::{HolderResourceState, Lease, SlotPool, StaleReason, assess_lease};
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;
use crate::slot_policy::ReclaimOptions;
use crate::slot_ports::{LeaseStore, LivenessProbe};

/// One lease removed by a reclaim pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimedLease {
    /// The deleted lease as it was observed.
    pub lease: Lease,
    /// Why it was reclaimable.
    pub reason: StaleReason,
}

/// Outcome of one reclaim pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Number of leases inspected.
    pub scanned: usize,
    /// Leases deleted in this pass.
    pub reclaimed: Vec<ReclaimedLease>,
    /// Reclaimable leases whose deletion failed, with the error text.
    pub failed: Vec<(String, String)>,
}

impl ReclaimReport {
    /// Returns true when the pass freed at least one slot.
    #[must_use]
    pub fn freed_any(&self) -> bool {
        !self.reclaimed.is_empty()
    }
}

/// Scans the lease pool and force-deletes expired or orphaned leases.
#[derive(Clone)]
pub struct StaleReclaimer {
    lease_store: Arc<dyn LeaseStore>,
    liveness_probe: Arc<dyn LivenessProbe>,
    pool: SlotPool,
    options: ReclaimOptions,
    retry: RetryPolicy,
}

impl StaleReclaimer {
    /// Creates a reclaimer.
    #[must_use]
    pub fn new(
        lease_store: Arc<dyn LeaseStore>,
        liveness_probe: Arc<dyn LivenessProbe>,
        pool: SlotPool,
        options: ReclaimOptions,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            lease_store,
            liveness_probe,
            pool,
            options,
            retry,
        }
    }

    /// Runs one reclaim pass against the current time.
    pub async fn reclaim(&self) -> AppResult<ReclaimReport> {
        self.reclaim_at(Utc::now()).await
    }

    /// Runs one reclaim pass treating `now` as the current time.
    ///
    /// Listing failures are returned once retries are exhausted. Deletion
    /// failures are logged and reported; the next pass retries them.
    pub async fn reclaim_at(&self, now: DateTime<Utc>) -> AppResult<ReclaimReport> {
        let prefix = self.pool.name_prefix();
        let leases = self
            .retry
            .run("list leases", || self.lease_store.list_by_prefix(prefix.as_str()))
            .await?;

        let orphan_grace = chrono::Duration::from_std(self.options.orphan_grace)
            .unwrap_or(chrono::Duration::MAX);
        let mut report = ReclaimReport {
            scanned: leases.len(),
            ..ReclaimReport::default()
        };

        for lease in leases {
            let holder_state = if lease.is_expired(now) || lease.age(now) < orphan_grace {
                None
            } else {
                Some(self.probe_holder(&lease).await)
            };

            let Some(reason) = assess_lease(&lease, now, orphan_grace, holder_state) else {
                debug!(slot = %lease.name, holder = %lease.holder_identity, "lease is live");
                continue;
            };

            match self
                .retry
                .run("delete stale lease", || self.lease_store.delete_if_unchanged(&lease))
                .await
            {
                Ok(true) => {
                    info!(
                        slot = %lease.name,
                        holder = %lease.holder_identity,
                        acquired_at = %lease.acquire_time,
                        expires_at = %lease.expires_at(),
                        reason = reason.as_str(),
                        "reclaimed stale lease"
                    );
                    report.reclaimed.push(ReclaimedLease { lease, reason });
                }
                Ok(false) => {
                    debug!(
                        slot = %lease.name,
                        "stale lease already removed or replaced before reclaim"
                    );
                }
                Err(error) => {
                    warn!(
                        slot = %lease.name,
                        holder = %lease.holder_identity,
                        reason = reason.as_str(),
                        error = %error,
                        "failed to delete stale lease, will retry on a later pass"
                    );
                    report.failed.push((lease.name.clone(), error.to_string()));
                }
            }
        }

        Ok(report)
    }

    async fn probe_holder(&self, lease: &Lease) -> HolderResourceState {
        match self
            .liveness_probe
            .holder_resource_state(lease.holder_identity.as_str())
            .await
        {
            Ok(state) => state,
            Err(error) => {
                warn!(
                    slot = %lease.name,
                    holder = %lease.holder_identity,
                    error = %error,
                    "liveness probe failed, keeping lease"
                );
                HolderResourceState::Unknown
            }
        }
    }
}
