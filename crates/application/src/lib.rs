//! Application services and ports.

#![forbid(unsafe_code)]

mod capacity_checker;
mod retry;
mod slot_acquirer;
mod slot_coordinator;
mod slot_policy;
mod slot_ports;
mod slot_releaser;
mod slot_status;
mod stale_reclaimer;

#[cfg(test)]
mod test_support;

pub use capacity_checker::{CapacityAdmission, CapacityChecker, CapacityPolicy, CapacityReport};
pub use retry::RetryPolicy;
pub use slot_acquirer::SlotAcquirer;
pub use slot_coordinator::{GuardedRunOutcome, SlotCoordinator};
pub use slot_policy::{AcquireOptions, ReclaimOptions};
pub use slot_ports::{CapacityProvider, LeaseStore, LivenessProbe};
pub use slot_releaser::{SlotGuard, SlotReleaser};
pub use slot_status::{PoolStatus, SlotStatus, SlotStatusService};
pub use stale_reclaimer::{ReclaimReport, ReclaimedLease, StaleReclaimer};
