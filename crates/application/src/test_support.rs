use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use slotgate_core::{AppError, AppResult};
use slotgate_domain::{
    CapacitySnapshot, HolderResourceState, Lease, LeaseDraft, ResourceQuantity, SlotPool,
};
use tokio::sync::Mutex;

use crate::{CapacityProvider, LeaseStore, LivenessProbe};

pub const NAMESPACE: &str = "ci";

pub fn pool(max_slots: u32) -> SlotPool {
    SlotPool::new("slot", max_slots).unwrap_or_else(|_| unreachable!())
}

pub fn lease_aged(slot_name: &str, holder: &str, ttl: u32, age: Duration) -> Lease {
    LeaseDraft::new(slot_name, holder, ttl)
        .unwrap_or_else(|_| unreachable!())
        .into_lease(NAMESPACE, Utc::now() - age)
}

#[derive(Default)]
pub struct FakeLeaseStore {
    pub leases: Mutex<BTreeMap<String, Lease>>,
    pub transient_failures_remaining: Mutex<u32>,
    pub failing_deletes: Mutex<Vec<String>>,
    pub create_calls: Mutex<u32>,
    pub unacknowledged_creates: Mutex<u32>,
}

impl FakeLeaseStore {
    pub async fn insert(&self, lease: Lease) {
        self.leases.lock().await.insert(lease.name.clone(), lease);
    }

    pub async fn names(&self) -> Vec<String> {
        self.leases.lock().await.keys().cloned().collect()
    }

    async fn maybe_fail(&self) -> AppResult<()> {
        let mut remaining = self.transient_failures_remaining.lock().await;
        if *remaining > 0 {
            *remaining -= 1;
            return Err(AppError::Unavailable("coordination api timeout".to_owned()));
        }

        Ok(())
    }

    async fn delete_blocked(&self, slot_name: &str) -> AppResult<()> {
        if self
            .failing_deletes
            .lock()
            .await
            .iter()
            .any(|name| name == slot_name)
        {
            return Err(AppError::Internal(format!("delete of '{slot_name}' refused")));
        }

        Ok(())
    }
}

#[async_trait]
impl LeaseStore for FakeLeaseStore {
    async fn try_create(&self, draft: &LeaseDraft) -> AppResult<Option<Lease>> {
        *self.create_calls.lock().await += 1;
        self.maybe_fail().await?;

        let mut leases = self.leases.lock().await;
        if leases.contains_key(draft.slot_name()) {
            return Ok(None);
        }

        let lease = draft.clone().into_lease(NAMESPACE, Utc::now());
        leases.insert(lease.name.clone(), lease.clone());

        let mut unacknowledged = self.unacknowledged_creates.lock().await;
        if *unacknowledged > 0 {
            *unacknowledged -= 1;
            return Err(AppError::Unavailable("response lost after commit".to_owned()));
        }

        Ok(Some(lease))
    }

    async fn get(&self, slot_name: &str) -> AppResult<Option<Lease>> {
        self.maybe_fail().await?;
        Ok(self.leases.lock().await.get(slot_name).cloned())
    }

    async fn delete(&self, slot_name: &str) -> AppResult<bool> {
        self.maybe_fail().await?;
        self.delete_blocked(slot_name).await?;
        Ok(self.leases.lock().await.remove(slot_name).is_some())
    }

    async fn delete_if_unchanged(&self, lease: &Lease) -> AppResult<bool> {
        self.maybe_fail().await?;
        self.delete_blocked(lease.name.as_str()).await?;

        let mut leases = self.leases.lock().await;
        if leases.get(lease.name.as_str()) == Some(lease) {
            leases.remove(lease.name.as_str());
            return Ok(true);
        }

        Ok(false)
    }

    async fn list_by_prefix(&self, prefix: &str) -> AppResult<Vec<Lease>> {
        self.maybe_fail().await?;
        Ok(self
            .leases
            .lock()
            .await
            .values()
            .filter(|lease| lease.name.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeLivenessProbe {
    pub states: Mutex<HashMap<String, HolderResourceState>>,
    pub failing: Mutex<bool>,
    pub probed: Mutex<Vec<String>>,
}

impl FakeLivenessProbe {
    pub async fn set(&self, holder: &str, state: HolderResourceState) {
        self.states.lock().await.insert(holder.to_owned(), state);
    }
}

#[async_trait]
impl LivenessProbe for FakeLivenessProbe {
    async fn holder_resource_state(
        &self,
        holder_identity: &str,
    ) -> AppResult<HolderResourceState> {
        self.probed.lock().await.push(holder_identity.to_owned());

        if *self.failing.lock().await {
            return Err(AppError::Unavailable("cluster api unreachable".to_owned()));
        }

        Ok(self
            .states
            .lock()
            .await
            .get(holder_identity)
            .copied()
            .unwrap_or(HolderResourceState::Active))
    }
}

pub struct FakeCapacityProvider {
    pub result: Mutex<AppResult<CapacitySnapshot>>,
}

impl FakeCapacityProvider {
    pub fn with_free(free: ResourceQuantity) -> Self {
        Self {
            result: Mutex::new(Ok(CapacitySnapshot {
                allocatable: free,
                requested: ResourceQuantity::default(),
                autoscale_headroom: ResourceQuantity::default(),
            })),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Mutex::new(Err(AppError::Unavailable(
                "metrics endpoint timed out".to_owned(),
            ))),
        }
    }

    pub fn refusing() -> Self {
        Self {
            result: Mutex::new(Err(AppError::Internal(
                "nodes is forbidden for this service account".to_owned(),
            ))),
        }
    }
}

#[async_trait]
impl CapacityProvider for FakeCapacityProvider {
    async fn capacity_snapshot(&self) -> AppResult<CapacitySnapshot> {
        match &*self.result.lock().await {
            Ok(snapshot) => Ok(*snapshot),
            Err(AppError::Unavailable(message)) => Err(AppError::Unavailable(message.clone())),
            Err(error) => Err(AppError::Internal(error.to_string())),
        }
    }
}
