//! Guaranteed release of held slots.
//!
//! Leases are only leaked by a hard process kill that skips every cleanup
//! path; TTL reclaim bounds how long such a lease survives.

use std::sync::Arc;

use slotgate_core::AppResult;
use slotgate_domain::{Lease, SlotPool};
use tracing::{info, warn};

use crate::retry::RetryPolicy;
use crate::slot_ports::LeaseStore;

/// Idempotent deletion of slot leases.
#[derive(Clone)]
pub struct SlotReleaser {
    lease_store: Arc<dyn LeaseStore>,
    pool: SlotPool,
    retry: RetryPolicy,
}

impl SlotReleaser {
    /// Creates a releaser.
    #[must_use]
    pub fn new(lease_store: Arc<dyn LeaseStore>, pool: SlotPool, retry: RetryPolicy) -> Self {
        Self {
            lease_store,
            pool,
            retry,
        }
    }

    /// Deletes the lease for `slot_name` unconditionally.
    ///
    /// Releasing a slot that is already free succeeds.
    pub async fn release(&self, slot_name: &str) -> AppResult<()> {
        let deleted = self
            .retry
            .run("delete lease", || self.lease_store.delete(slot_name))
            .await?;

        if deleted {
            info!(slot = %slot_name, "released slot");
        } else {
            info!(slot = %slot_name, "slot was already free");
        }

        Ok(())
    }

    /// Deletes the lease for the slot at `index` unconditionally.
    pub async fn release_index(&self, index: u32) -> AppResult<()> {
        let slot_name = self.pool.slot_name(index)?;
        self.release(slot_name.as_str()).await
    }

    /// Deletes `lease` only while it is still the record this holder created.
    ///
    /// A lease that was reclaimed and handed to another run is left alone.
    pub async fn release_lease(&self, lease: &Lease) -> AppResult<()> {
        let deleted = self
            .retry
            .run("delete held lease", || self.lease_store.delete_if_unchanged(lease))
            .await?;

        if deleted {
            info!(slot = %lease.name, holder = %lease.holder_identity, "released slot");
        } else {
            warn!(
                slot = %lease.name,
                holder = %lease.holder_identity,
                "lease was already reclaimed or replaced before release"
            );
        }

        Ok(())
    }
}

/// Scoped ownership of one acquired slot.
///
/// Call [`SlotGuard::release`] on every exit path. A guard dropped without
/// release inside a tokio runtime spawns a best-effort release task; outside
/// a runtime the lease is left for TTL reclaim.
#[must_use = "a dropped slot guard releases its slot in the background"]
pub struct SlotGuard {
    lease: Lease,
    releaser: SlotReleaser,
    released: bool,
}

impl SlotGuard {
    /// Wraps an acquired lease.
    pub fn new(lease: Lease, releaser: SlotReleaser) -> Self {
        Self {
            lease,
            releaser,
            released: false,
        }
    }

    /// Returns the held lease.
    #[must_use]
    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Returns the held slot name.
    #[must_use]
    pub fn slot_name(&self) -> &str {
        self.lease.name.as_str()
    }

    /// Releases the slot and consumes the guard.
    pub async fn release(mut self) -> AppResult<()> {
        self.released = true;
        self.releaser.release_lease(&self.lease).await
    }

    /// Consumes the guard without releasing, handing ownership to the caller.
    #[must_use]
    pub fn into_lease(mut self) -> Lease {
        self.released = true;
        self.lease.clone()
    }
}

impl std::fmt::Debug for SlotGuard {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SlotGuard")
            .field("slot", &self.lease.name)
            .field("holder", &self.lease.holder_identity)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let releaser = self.releaser.clone();
                let lease = self.lease.clone();
                warn!(
                    slot = %lease.name,
                    "slot guard dropped without release, releasing in background"
                );
                handle.spawn(async move {
                    if let Err(error) = releaser.release_lease(&lease).await {
                        warn!(
                            slot = %lease.name,
                            error = %error,
                            "background slot release failed, lease remains until TTL expiry"
                        );
                    }
                });
            }
            Err(_) => {
                warn!(
                    slot = %self.lease.name,
                    "slot guard dropped outside a runtime, lease remains until TTL expiry"
                );
            }
        }
    }
}
