use async_trait::async_trait;
use slotgate_core::AppResult;
use slotgate_domain::HolderResourceState;

/// Liveness port reporting whether a holder's expensive resource still exists.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Looks up the resource tagged with `holder_identity`.
    async fn holder_resource_state(&self, holder_identity: &str)
    -> AppResult<HolderResourceState>;
}
