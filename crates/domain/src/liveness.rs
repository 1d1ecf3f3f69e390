use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Lease;

/// Observed state of the expensive resource provisioned by a lease holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderResourceState {
    /// Resource exists and is in a non-terminal state.
    Active,
    /// Resource exists but is being torn down or has failed.
    Terminated,
    /// No resource tagged with the holder identity exists.
    Missing,
    /// Liveness could not be determined.
    Unknown,
}

/// Reason a lease no longer represents a live reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// Lease is past `acquire_time + lease_duration_seconds`.
    Expired,
    /// Lease is within its TTL but its holder's resource is gone.
    Orphaned,
}

impl StaleReason {
    /// Returns stable reason value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Orphaned => "orphaned",
        }
    }
}

/// Decides whether one lease is reclaimable.
///
/// Expiry is checked first and needs no liveness data. The liveness result is
/// only consulted for leases older than `orphan_grace`; `holder_state` is
/// `None` when no probe was made. `Unknown` never marks a lease orphaned.
#[must_use]
pub fn assess_lease(
    lease: &Lease,
    now: DateTime<Utc>,
    orphan_grace: Duration,
    holder_state: Option<HolderResourceState>,
) -> Option<StaleReason> {
    if lease.is_expired(now) {
        return Some(StaleReason::Expired);
    }

    if lease.age(now) < orphan_grace {
        return None;
    }

    match holder_state {
        Some(HolderResourceState::Missing | HolderResourceState::Terminated) => {
            Some(StaleReason::Orphaned)
        }
        Some(HolderResourceState::Active | HolderResourceState::Unknown) | None => None,
    }
}
