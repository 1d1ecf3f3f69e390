use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use slotgate_application::LeaseStore;
use slotgate_core::AppResult;
use slotgate_domain::{Lease, LeaseDraft};
use tokio::sync::RwLock;

/// Process-local lease store for single-host runs and local development.
///
/// Expired records are kept until deleted, like the Kubernetes backend.
#[derive(Default)]
pub struct InMemoryLeaseStore {
    namespace: String,
    leases: RwLock<BTreeMap<String, Lease>>,
}

impl InMemoryLeaseStore {
    /// Creates an empty store scoped to `namespace`.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            leases: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn try_create(&self, draft: &LeaseDraft) -> AppResult<Option<Lease>> {
        let mut leases = self.leases.write().await;
        if leases.contains_key(draft.slot_name()) {
            return Ok(None);
        }

        let lease = draft.clone().into_lease(self.namespace.as_str(), Utc::now());
        leases.insert(lease.name.clone(), lease.clone());
        Ok(Some(lease))
    }

    async fn get(&self, slot_name: &str) -> AppResult<Option<Lease>> {
        Ok(self.leases.read().await.get(slot_name).cloned())
    }

    async fn delete(&self, slot_name: &str) -> AppResult<bool> {
        Ok(self.leases.write().await.remove(slot_name).is_some())
    }

    async fn delete_if_unchanged(&self, lease: &Lease) -> AppResult<bool> {
        let mut leases = self.leases.write().await;
        if leases.get(lease.name.as_str()) != Some(lease) {
            return Ok(false);
        }

        leases.remove(lease.name.as_str());
        Ok(true)
    }

    async fn list_by_prefix(&self, prefix: &str) -> AppResult<Vec<Lease>> {
        Ok(self
            .leases
            .read()
            .await
            .range(prefix.to_owned()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(_, lease)| lease.clone())
            .collect())
    }
}
