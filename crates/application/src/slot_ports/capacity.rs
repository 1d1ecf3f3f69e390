use async_trait::async_trait;
use slotgate_core::AppResult;
use slotgate_domain::CapacitySnapshot;

/// Capacity port reporting aggregate headroom of the shared control plane.
#[async_trait]
pub trait CapacityProvider: Send + Sync {
    /// Reads allocatable, requested and projected autoscaling capacity.
    async fn capacity_snapshot(&self) -> AppResult<CapacitySnapshot>;
}
