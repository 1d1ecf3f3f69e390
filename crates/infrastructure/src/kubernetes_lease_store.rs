//! `coordination.k8s.io/v1` Lease objects as slot records.
//!
//! The API server rejects a second create of the same name with 409, which
//! is the atomic create-if-absent primitive slot acquisition relies on.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use slotgate_application::LeaseStore;
use slotgate_core::AppResult;
use slotgate_domain::{Lease, LeaseDraft};
use tracing::{debug, warn};

use crate::kubernetes_api_client::{KubernetesApiClient, decode_json, error_from_response};

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY_VALUE: &str = "slotgate";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaseObject {
    #[serde(default = "lease_api_version")]
    api_version: String,
    #[serde(default = "lease_kind")]
    kind: String,
    metadata: ObjectMeta,
    #[serde(default)]
    spec: LeaseSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    creation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    holder_identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lease_duration_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    acquire_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    renew_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeaseList {
    #[serde(default)]
    items: Vec<LeaseObject>,
}

fn lease_api_version() -> String {
    "coordination.k8s.io/v1".to_owned()
}

fn lease_kind() -> String {
    "Lease".to_owned()
}

/// Formats a timestamp as a Kubernetes `MicroTime`.
fn micro_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

impl LeaseObject {
    fn from_draft(draft: &LeaseDraft, namespace: &str, now: DateTime<Utc>) -> Self {
        let timestamp = micro_time(now);

        Self {
            api_version: lease_api_version(),
            kind: lease_kind(),
            metadata: ObjectMeta {
                name: draft.slot_name().to_owned(),
                namespace: Some(namespace.to_owned()),
                labels: BTreeMap::from([(
                    MANAGED_BY_LABEL.to_owned(),
                    MANAGED_BY_VALUE.to_owned(),
                )]),
                ..ObjectMeta::default()
            },
            spec: LeaseSpec {
                holder_identity: Some(draft.holder_identity().to_owned()),
                lease_duration_seconds: Some(i64::from(draft.lease_duration_seconds())),
                acquire_time: Some(timestamp.clone()),
                renew_time: Some(timestamp),
            },
        }
    }

    /// Converts the wire object into a domain lease.
    ///
    /// Records written by other tooling may omit fields. A lease without a
    /// parseable acquire time or duration is reported as already expired so
    /// the reclaimer can free its slot.
    fn into_lease(self, namespace: &str) -> Lease {
        let acquire_time = parse_time(self.spec.acquire_time.as_deref())
            .or_else(|| parse_time(self.spec.renew_time.as_deref()))
            .or(self.metadata.creation_timestamp)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let renew_time = parse_time(self.spec.renew_time.as_deref()).unwrap_or(acquire_time);
        let lease_duration_seconds = self
            .spec
            .lease_duration_seconds
            .and_then(|seconds| u32::try_from(seconds).ok())
            .unwrap_or(0);

        Lease {
            name: self.metadata.name,
            namespace: self.metadata.namespace.unwrap_or_else(|| namespace.to_owned()),
            holder_identity: self.spec.holder_identity.unwrap_or_default(),
            acquire_time,
            renew_time,
            lease_duration_seconds,
        }
    }
}

/// Lease store backed by Kubernetes Lease objects in one namespace.
#[derive(Clone)]
pub struct KubernetesLeaseStore {
    client: KubernetesApiClient,
    namespace: String,
}

impl KubernetesLeaseStore {
    /// Creates a store scoped to `namespace`.
    #[must_use]
    pub fn new(client: KubernetesApiClient, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn collection_path(&self) -> String {
        format!(
            "/apis/coordination.k8s.io/v1/namespaces/{}/leases",
            self.namespace
        )
    }

    fn item_path(&self, slot_name: &str) -> String {
        format!("{}/{slot_name}", self.collection_path())
    }

    async fn get_object(&self, slot_name: &str) -> AppResult<Option<LeaseObject>> {
        let operation = "get lease";
        let response = self
            .client
            .send(
                self.client.request(Method::GET, self.item_path(slot_name).as_str()),
                operation,
            )
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(decode_json(response, operation).await?)),
            _ => Err(error_from_response(response, operation).await),
        }
    }

    async fn delete_object(
        &self,
        slot_name: &str,
        resource_version: Option<&str>,
    ) -> AppResult<bool> {
        let operation = "delete lease";
        let mut builder = self
            .client
            .request(Method::DELETE, self.item_path(slot_name).as_str());

        if let Some(resource_version) = resource_version {
            builder = builder.json(&serde_json::json!({
                "apiVersion": "v1",
                "kind": "DeleteOptions",
                "preconditions": { "resourceVersion": resource_version },
            }));
        }

        let response = self.client.send(builder, operation).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::CONFLICT if resource_version.is_some() => {
                debug!(slot = %slot_name, "lease changed before conditional delete");
                Ok(false)
            }
            status if status.is_success() => Ok(true),
            _ => Err(error_from_response(response, operation).await),
        }
    }
}

#[async_trait]
impl LeaseStore for KubernetesLeaseStore {
    async fn try_create(&self, draft: &LeaseDraft) -> AppResult<Option<Lease>> {
        let operation = "create lease";
        let body = LeaseObject::from_draft(draft, self.namespace.as_str(), Utc::now());
        let response = self
            .client
            .send(
                self.client
                    .request(Method::POST, self.collection_path().as_str())
                    .json(&body),
                operation,
            )
            .await?;

        match response.status() {
            StatusCode::CONFLICT => Ok(None),
            status if status.is_success() => {
                let created: LeaseObject = decode_json(response, operation).await?;
                Ok(Some(created.into_lease(self.namespace.as_str())))
            }
            _ => Err(error_from_response(response, operation).await),
        }
    }

    async fn get(&self, slot_name: &str) -> AppResult<Option<Lease>> {
        Ok(self
            .get_object(slot_name)
            .await?
            .map(|object| object.into_lease(self.namespace.as_str())))
    }

    async fn delete(&self, slot_name: &str) -> AppResult<bool> {
        self.delete_object(slot_name, None).await
    }

    async fn delete_if_unchanged(&self, lease: &Lease) -> AppResult<bool> {
        let Some(current) = self.get_object(lease.name.as_str()).await? else {
            return Ok(false);
        };

        let resource_version = current.metadata.resource_version.clone();
        let current = current.into_lease(self.namespace.as_str());
        if current.holder_identity != lease.holder_identity
            || current.acquire_time != lease.acquire_time
        {
            return Ok(false);
        }

        if resource_version.is_none() {
            warn!(slot = %lease.name, "lease has no resourceVersion, deleting unconditionally");
        }

        self.delete_object(lease.name.as_str(), resource_version.as_deref())
            .await
    }

    async fn list_by_prefix(&self, prefix: &str) -> AppResult<Vec<Lease>> {
        let list: LeaseList = self
            .client
            .get_json(self.collection_path().as_str(), &[], "list leases")
            .await?;

        Ok(list
            .items
            .into_iter()
            .filter(|object| object.metadata.name.starts_with(prefix))
            .map(|object| object.into_lease(self.namespace.as_str()))
            .collect())
    }
}
