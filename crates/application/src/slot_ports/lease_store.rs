use async_trait::async_trait;
use slotgate_core::AppResult;
use slotgate_domain::{Lease, LeaseDraft};

/// Coordination store port holding one lease record per held slot.
///
/// Transient transport failures surface as `AppError::Unavailable`, distinct
/// from the semantic outcomes encoded in the return values.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Atomically creates the lease when no record with its name exists.
    ///
    /// Returns `None` when the slot is already held.
    async fn try_create(&self, draft: &LeaseDraft) -> AppResult<Option<Lease>>;

    /// Reads one lease by slot name.
    async fn get(&self, slot_name: &str) -> AppResult<Option<Lease>>;

    /// Deletes one lease by slot name and returns false when it was absent.
    async fn delete(&self, slot_name: &str) -> AppResult<bool>;

    /// Deletes the lease only while it is still the exact record given.
    ///
    /// Returns false when the record is absent or was replaced by another
    /// holder in the meantime.
    async fn delete_if_unchanged(&self, lease: &Lease) -> AppResult<bool>;

    /// Lists every lease whose name starts with `prefix`.
    async fn list_by_prefix(&self, prefix: &str) -> AppResult<Vec<Lease>>;
}
