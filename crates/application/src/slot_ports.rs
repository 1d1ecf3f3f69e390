mod capacity;
mod lease_store;
mod liveness;

pub use capacity::CapacityProvider;
pub use lease_store::LeaseStore;
pub use liveness::LivenessProbe;
