//! End-to-end admission of one run: reclaim, acquire, capacity check.

use std::future::Future;

use slotgate_core::AppResult;
use slotgate_domain::{Lease, ResourceQuantity};
use tracing::{info, warn};

use crate::capacity_checker::{CapacityAdmission, CapacityChecker};
use crate::slot_acquirer::SlotAcquirer;
use crate::slot_policy::AcquireOptions;
use crate::slot_releaser::{SlotGuard, SlotReleaser};
use crate::stale_reclaimer::StaleReclaimer;

/// Outcome of a guarded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardedRunOutcome<T> {
    /// The workload finished and produced a value.
    Completed(T),
    /// The cancellation signal fired first.
    Cancelled,
}

/// Orchestrates the components a run passes through before provisioning.
#[derive(Clone)]
pub struct SlotCoordinator {
    reclaimer: StaleReclaimer,
    acquirer: SlotAcquirer,
    capacity_checker: CapacityChecker,
    releaser: SlotReleaser,
    acquire_options: AcquireOptions,
    required: ResourceQuantity,
}

impl SlotCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(
        reclaimer: StaleReclaimer,
        acquirer: SlotAcquirer,
        capacity_checker: CapacityChecker,
        releaser: SlotReleaser,
        acquire_options: AcquireOptions,
        required: ResourceQuantity,
    ) -> Self {
        Self {
            reclaimer,
            acquirer,
            capacity_checker,
            releaser,
            acquire_options,
            required,
        }
    }

    /// Reclaims stale leases, acquires a slot and checks capacity.
    ///
    /// The returned guard owns the slot. A capacity rejection releases the
    /// slot before the error is returned.
    pub async fn admit(&self, holder_identity: &str) -> AppResult<SlotGuard> {
        match self.reclaimer.reclaim().await {
            Ok(report) => {
                if report.freed_any() || !report.failed.is_empty() {
                    info!(
                        scanned = report.scanned,
                        reclaimed = report.reclaimed.len(),
                        failed = report.failed.len(),
                        "pre-acquisition stale cleanup finished"
                    );
                }
            }
            Err(error) => {
                warn!(error = %error, "pre-acquisition stale cleanup failed");
            }
        }

        let lease = self
            .acquirer
            .acquire(holder_identity, &self.acquire_options)
            .await?;
        let guard = SlotGuard::new(lease, self.releaser.clone());

        match self.capacity_checker.admit(&self.required).await {
            Ok(admission) => {
                if let CapacityAdmission::AdmittedUnchecked { reason } = &admission {
                    warn!(
                        slot = %guard.slot_name(),
                        reason = %reason,
                        "admitted without capacity check"
                    );
                }
                Ok(guard)
            }
            Err(error) => {
                if let Err(release_error) = guard.release().await {
                    warn!(
                        error = %release_error,
                        "failed to release slot after capacity rejection"
                    );
                }
                Err(error)
            }
        }
    }

    /// Runs `workload` while holding a slot, releasing it on every exit path.
    ///
    /// `cancel` is raced against admission and the workload. The slot is
    /// released after completion, failure inside the workload's own result,
    /// or cancellation.
    pub async fn run_guarded<T, W, Fut, C>(
        &self,
        holder_identity: &str,
        workload: W,
        cancel: C,
    ) -> AppResult<GuardedRunOutcome<T>>
    where
        W: FnOnce(Lease) -> Fut,
        Fut: Future<Output = T>,
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        let guard = tokio::select! {
            admitted = self.admit(holder_identity) => admitted?,
            () = &mut cancel => {
                info!(holder = %holder_identity, "cancelled before a slot was admitted");
                return Ok(GuardedRunOutcome::Cancelled);
            }
        };

        let outcome = tokio::select! {
            value = workload(guard.lease().clone()) => GuardedRunOutcome::Completed(value),
            () = &mut cancel => {
                warn!(slot = %guard.slot_name(), "run cancelled, releasing slot");
                GuardedRunOutcome::Cancelled
            }
        };

        if let Err(error) = guard.release().await {
            warn!(
                error = %error,
                "slot release failed, lease remains until TTL expiry"
            );
        }

        Ok(outcome)
    }
}
