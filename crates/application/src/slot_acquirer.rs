//! Claiming one free slot out of the fixed pool.
//!
//! Suspension happens only at the poll-interval sleep between full scans;
//! there is no watch or subscription on the coordination store.

use std::sync::Arc;

use chrono::Utc;
use slotgate_core::{AppError, AppResult};
use slotgate_domain::{Lease, LeaseDraft, SlotPool};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;
use crate::slot_policy::AcquireOptions;
use crate::slot_ports::LeaseStore;
use crate::slot_status::PoolStatus;
use crate::stale_reclaimer::StaleReclaimer;

/// Scans the pool in ascending index order and creates the first free lease.
#[derive(Clone)]
pub struct SlotAcquirer {
    lease_store: Arc<dyn LeaseStore>,
    reclaimer: StaleReclaimer,
    pool: SlotPool,
    retry: RetryPolicy,
}

impl SlotAcquirer {
    /// Creates an acquirer.
    #[must_use]
    pub fn new(
        lease_store: Arc<dyn LeaseStore>,
        reclaimer: StaleReclaimer,
        pool: SlotPool,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            lease_store,
            reclaimer,
            pool,
            retry,
        }
    }

    /// Returns the pool this acquirer scans.
    #[must_use]
    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    /// Claims one slot for `holder_identity`, waiting up to `options.timeout`.
    ///
    /// The lowest free index wins. When every slot is held, one reclaim pass
    /// runs before sleeping `options.poll_interval` and scanning again.
    pub async fn acquire(
        &self,
        holder_identity: &str,
        options: &AcquireOptions,
    ) -> AppResult<Lease> {
        let started = Instant::now();
        let mut scans = 0_u32;

        loop {
            scans = scans.saturating_add(1);

            if let Some(lease) = self
                .scan_once(holder_identity, options.lease_duration_seconds)
                .await?
            {
                info!(
                    slot = %lease.name,
                    holder = %lease.holder_identity,
                    scans,
                    waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "acquired slot"
                );
                return Ok(lease);
            }

            let freed_any = match self.reclaimer.reclaim().await {
                Ok(report) => {
                    if report.freed_any() {
                        info!(
                            reclaimed = report.reclaimed.len(),
                            "stale leases reclaimed, rescanning pool"
                        );
                    }
                    report.freed_any()
                }
                Err(error) => {
                    warn!(error = %error, "stale lease cleanup failed during acquisition");
                    false
                }
            };

            if freed_any {
                continue;
            }

            let elapsed = started.elapsed();
            if elapsed >= options.timeout {
                let holders = self.describe_holders().await;
                return Err(AppError::AcquisitionTimeout(format!(
                    "no free slot among {} after {}s for holder '{holder_identity}': {holders}",
                    self.pool.max_slots(),
                    elapsed.as_secs()
                )));
            }

            let holders = self.describe_holders().await;
            info!(
                holder = %holder_identity,
                max_slots = self.pool.max_slots(),
                holders = %holders,
                "all slots held, waiting"
            );

            let remaining = options.timeout.saturating_sub(elapsed);
            tokio::time::sleep(options.poll_interval.min(remaining)).await;
        }
    }

    async fn scan_once(
        &self,
        holder_identity: &str,
        lease_duration_seconds: u32,
    ) -> AppResult<Option<Lease>> {
        for (index, slot_name) in self.pool.slot_names() {
            let draft = LeaseDraft::new(slot_name, holder_identity, lease_duration_seconds)?;
            let mut attempts = 0_u32;

            let outcome = self
                .retry
                .run("create lease", || {
                    attempts = attempts.saturating_add(1);
                    self.lease_store.try_create(&draft)
                })
                .await;

            match outcome {
                Ok(Some(lease)) => return Ok(Some(lease)),
                Ok(None) if attempts > 1 => {
                    if let Some(lease) = self.adopt_unacknowledged(&draft).await {
                        return Ok(Some(lease));
                    }
                    debug!(slot = %draft.slot_name(), index, "slot already held");
                }
                Ok(None) => {
                    debug!(slot = %draft.slot_name(), index, "slot already held");
                }
                Err(error) if error.is_transient() => {
                    if let Some(lease) = self.adopt_unacknowledged(&draft).await {
                        return Ok(Some(lease));
                    }
                    warn!(
                        slot = %draft.slot_name(),
                        error = %error,
                        "skipping slot after exhausting transient retries"
                    );
                }
                Err(error) => return Err(error),
            }
        }

        Ok(None)
    }

    /// Returns the lease an earlier create attempt stored for this holder even
    /// though its acknowledgement was lost to a transient failure.
    async fn adopt_unacknowledged(&self, draft: &LeaseDraft) -> Option<Lease> {
        match self
            .retry
            .run("read lease", || self.lease_store.get(draft.slot_name()))
            .await
        {
            Ok(Some(lease)) if lease.holder_identity == draft.holder_identity() => {
                info!(
                    slot = %lease.name,
                    holder = %lease.holder_identity,
                    "adopting lease created by an unacknowledged attempt"
                );
                Some(lease)
            }
            Ok(_) => None,
            Err(error) => {
                warn!(
                    slot = %draft.slot_name(),
                    error = %error,
                    "could not confirm ownership after transient create failure"
                );
                None
            }
        }
    }

    async fn describe_holders(&self) -> String {
        let prefix = self.pool.name_prefix();
        match self.lease_store.list_by_prefix(prefix.as_str()).await {
            Ok(leases) => {
                PoolStatus::from_leases(&self.pool, leases, Utc::now()).describe_holders()
            }
            Err(error) => format!("holders unavailable ({error})"),
        }
    }
}
