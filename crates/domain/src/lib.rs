//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod capacity;
mod lease;
mod liveness;
mod resources;
mod slot;

pub use capacity::{CapacityDecision, CapacitySnapshot};
pub use lease::{Lease, LeaseDraft};
pub use liveness::{HolderResourceState, StaleReason, assess_lease};
pub use resources::{ResourceQuantity, parse_cpu_millis, parse_memory_bytes};
pub use slot::SlotPool;
