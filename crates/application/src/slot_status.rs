use std::sync::Arc;

use chrono::{DateTime, Utc};
use slotgate_core::AppResult;
use slotgate_domain::{Lease, SlotPool};

use crate::retry::RetryPolicy;
use crate::slot_ports::LeaseStore;

/// State of one slot in the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    /// Slot index inside the pool.
    pub index: u32,
    /// Slot name.
    pub slot_name: String,
    /// Lease holding the slot, if any.
    pub lease: Option<Lease>,
}

impl SlotStatus {
    /// Returns true when no lease holds the slot.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.lease.is_none()
    }
}

/// Point-in-time view of the whole pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    /// When the leases were listed.
    pub observed_at: DateTime<Utc>,
    /// One entry per pool index, ascending.
    pub slots: Vec<SlotStatus>,
    /// Leases under the prefix whose index lies outside the pool.
    pub stray_leases: Vec<Lease>,
}

impl PoolStatus {
    /// Builds the view from the leases listed under the pool prefix.
    #[must_use]
    pub fn from_leases(pool: &SlotPool, leases: Vec<Lease>, observed_at: DateTime<Utc>) -> Self {
        let mut slots: Vec<SlotStatus> = pool
            .slot_names()
            .map(|(index, slot_name)| SlotStatus {
                index,
                slot_name,
                lease: None,
            })
            .collect();
        let mut stray_leases = Vec::new();

        for lease in leases {
            match pool.index_of(lease.name.as_str()) {
                Some(index) if pool.contains(index) => {
                    if let Some(slot) = usize::try_from(index)
                        .ok()
                        .and_then(|position| slots.get_mut(position))
                    {
                        slot.lease = Some(lease);
                    }
                }
                _ => stray_leases.push(lease),
            }
        }

        Self {
            observed_at,
            slots,
            stray_leases,
        }
    }

    /// Returns the number of held slots inside the pool.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }

    /// Returns the number of free slots.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.slots.len() - self.held_count()
    }

    /// Describes every holder for operator diagnostics.
    #[must_use]
    pub fn describe_holders(&self) -> String {
        let held: Vec<String> = self
            .slots
            .iter()
            .filter_map(|slot| slot.lease.as_ref())
            .chain(self.stray_leases.iter())
            .map(|lease| {
                format!(
                    "{} held by '{}' since {} (expires {})",
                    lease.name,
                    lease.holder_identity,
                    lease.acquire_time.to_rfc3339(),
                    lease.expires_at().to_rfc3339()
                )
            })
            .collect();

        if held.is_empty() {
            "no slots are held".to_owned()
        } else {
            held.join("; ")
        }
    }
}

/// Read-only reporting over the slot pool.
#[derive(Clone)]
pub struct SlotStatusService {
    lease_store: Arc<dyn LeaseStore>,
    pool: SlotPool,
    retry: RetryPolicy,
}

impl SlotStatusService {
    /// Creates a status service.
    #[must_use]
    pub fn new(lease_store: Arc<dyn LeaseStore>, pool: SlotPool, retry: RetryPolicy) -> Self {
        Self {
            lease_store,
            pool,
            retry,
        }
    }

    /// Lists the pool and returns its current status.
    pub async fn snapshot(&self) -> AppResult<PoolStatus> {
        let prefix = self.pool.name_prefix();
        let leases = self
            .retry
            .run("list leases", || self.lease_store.list_by_prefix(prefix.as_str()))
            .await?;

        Ok(PoolStatus::from_leases(&self.pool, leases, Utc::now()))
    }
}
