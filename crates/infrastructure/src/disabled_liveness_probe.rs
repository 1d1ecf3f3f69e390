use async_trait::async_trait;
use slotgate_application::LivenessProbe;
use slotgate_core::AppResult;
use slotgate_domain::HolderResourceState;

/// Liveness probe for deployments without a resource to cross-check.
///
/// Every holder is `Unknown`, so leases are reclaimed on TTL expiry only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLivenessProbe;

#[async_trait]
impl LivenessProbe for DisabledLivenessProbe {
    async fn holder_resource_state(
        &self,
        _holder_identity: &str,
    ) -> AppResult<HolderResourceState> {
        Ok(HolderResourceState::Unknown)
    }
}
