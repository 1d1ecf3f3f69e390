//! Redis-backed slot lease store.
//!
//! `SET key value NX EX ttl` creates a slot record atomically with its TTL,
//! so Redis drops expired leases on its own.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use slotgate_application::LeaseStore;
use slotgate_core::{AppError, AppResult};
use slotgate_domain::{Lease, LeaseDraft};
use tracing::warn;

const DELETE_IF_UNCHANGED_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of slot lease storage.
#[derive(Clone)]
pub struct RedisLeaseStore {
    client: redis::Client,
    key_prefix: String,
    namespace: String,
}

impl RedisLeaseStore {
    /// Creates one store adapter.
    #[must_use]
    pub fn new(
        client: redis::Client,
        key_prefix: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            namespace: namespace.into(),
        }
    }

    fn key_for(&self, slot_name: &str) -> String {
        format!("{}:{}:{slot_name}", self.key_prefix, self.namespace)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }
}

fn encode(lease: &Lease) -> AppResult<String> {
    serde_json::to_string(lease)
        .map_err(|error| AppError::Internal(format!("failed to encode lease: {error}")))
}

fn decode(key: &str, payload: &str) -> Option<Lease> {
    match serde_json::from_str(payload) {
        Ok(lease) => Some(lease),
        Err(error) => {
            warn!(key = %key, error = %error, "ignoring undecodable lease record");
            None
        }
    }
}

fn redis_error(operation: &str, error: &redis::RedisError) -> AppError {
    AppError::Unavailable(format!("failed to {operation}: {error}"))
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn try_create(&self, draft: &LeaseDraft) -> AppResult<Option<Lease>> {
        let lease = draft.clone().into_lease(self.namespace.as_str(), Utc::now());
        let payload = encode(&lease)?;
        let mut connection = self.connection().await?;

        let created: Option<String> = redis::cmd("SET")
            .arg(self.key_for(lease.name.as_str()))
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(u64::from(lease.lease_duration_seconds))
            .query_async(&mut connection)
            .await
            .map_err(|error| redis_error("create lease", &error))?;

        Ok(created.map(|_| lease))
    }

    async fn get(&self, slot_name: &str) -> AppResult<Option<Lease>> {
        let key = self.key_for(slot_name);
        let mut connection = self.connection().await?;

        let payload: Option<String> = connection
            .get(key.as_str())
            .await
            .map_err(|error| redis_error("read lease", &error))?;

        Ok(payload.and_then(|payload| decode(key.as_str(), payload.as_str())))
    }

    async fn delete(&self, slot_name: &str) -> AppResult<bool> {
        let mut connection = self.connection().await?;

        let removed: i64 = connection
            .del(self.key_for(slot_name))
            .await
            .map_err(|error| redis_error("delete lease", &error))?;

        Ok(removed > 0)
    }

    async fn delete_if_unchanged(&self, lease: &Lease) -> AppResult<bool> {
        let payload = encode(lease)?;
        let mut connection = self.connection().await?;

        let removed = Script::new(DELETE_IF_UNCHANGED_SCRIPT)
            .key(self.key_for(lease.name.as_str()))
            .arg(payload)
            .invoke_async::<i64>(&mut connection)
            .await
            .map_err(|error| redis_error("delete lease", &error))?;

        Ok(removed > 0)
    }

    async fn list_by_prefix(&self, prefix: &str) -> AppResult<Vec<Lease>> {
        let mut connection = self.connection().await?;

        let keys: Vec<String> = connection
            .keys(format!("{}*", self.key_for(prefix)))
            .await
            .map_err(|error| redis_error("list leases", &error))?;

        let mut leases = Vec::with_capacity(keys.len());
        for key in keys {
            let payload: Option<String> = connection
                .get(key.as_str())
                .await
                .map_err(|error| redis_error("read lease", &error))?;

            if let Some(lease) = payload.and_then(|payload| decode(key.as_str(), payload.as_str()))
            {
                leases.push(lease);
            }
        }

        leases.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(leases)
    }
}

#[cfg(test)]
mod tests {
    use super::RedisLeaseStore;

    fn store() -> RedisLeaseStore {
        let client =
            redis::Client::open("redis://127.0.0.1:6379").unwrap_or_else(|_| unreachable!());
        RedisLeaseStore::new(client, "slotgate", "ci")
    }

    #[test]
    fn keys_are_scoped_by_prefix_and_namespace() {
        let store = store();
        assert_eq!(store.key_for("slot-0"), "slotgate:ci:slot-0");
        assert_eq!(store.key_for("slot-"), "slotgate:ci:slot-");
    }

    #[test]
    fn undecodable_payload_is_skipped() {
        assert!(super::decode("slotgate:ci:slot-0", "not json").is_none());
    }
}
