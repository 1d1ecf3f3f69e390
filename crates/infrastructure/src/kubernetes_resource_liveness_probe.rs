//! Cross-checks lease holders against the expensive resource they provision.
//!
//! The resource is located by a label carrying the holder identity. No match
//! means the resource is gone; a deletion timestamp or a terminal phase means
//! it is being torn down.

use async_trait::async_trait;
use serde::Deserialize;
use slotgate_application::LivenessProbe;
use slotgate_core::{AppError, AppResult};
use slotgate_domain::HolderResourceState;
use tracing::debug;

use crate::kubernetes_api_client::KubernetesApiClient;

const TERMINAL_PHASES: &[&str] = &["Deleting", "Deleted", "Failed"];

/// API coordinates of a namespaced resource collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCollection {
    group: Option<String>,
    version: String,
    plural: String,
}

impl ResourceCollection {
    /// Parses `group/version/plural`, or `version/plural` for the core group.
    pub fn parse(value: &str) -> AppResult<Self> {
        let parts: Vec<&str> = value.trim().split('/').collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(AppError::Validation(format!(
                "resource '{value}' must be group/version/plural or version/plural"
            )));
        }

        match parts.as_slice() {
            [version, plural] => Ok(Self {
                group: None,
                version: (*version).to_owned(),
                plural: (*plural).to_owned(),
            }),
            [group, version, plural] => Ok(Self {
                group: Some((*group).to_owned()),
                version: (*version).to_owned(),
                plural: (*plural).to_owned(),
            }),
            _ => Err(AppError::Validation(format!(
                "resource '{value}' must be group/version/plural or version/plural"
            ))),
        }
    }

    fn namespaced_path(&self, namespace: &str) -> String {
        match &self.group {
            Some(group) => format!(
                "/apis/{group}/{}/namespaces/{namespace}/{}",
                self.version, self.plural
            ),
            None => format!(
                "/api/{}/namespaces/{namespace}/{}",
                self.version, self.plural
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    items: Vec<ResourceItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceItem {
    #[serde(default)]
    metadata: ResourceMeta,
    #[serde(default)]
    status: Option<ResourceStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceMeta {
    #[serde(default)]
    deletion_timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceStatus {
    #[serde(default)]
    phase: Option<String>,
}

impl ResourceItem {
    fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
            || self
                .status
                .as_ref()
                .and_then(|status| status.phase.as_deref())
                .is_some_and(|phase| TERMINAL_PHASES.contains(&phase))
    }
}

/// Liveness probe listing a labelled Kubernetes resource per holder.
#[derive(Clone)]
pub struct KubernetesResourceLivenessProbe {
    client: KubernetesApiClient,
    collection: ResourceCollection,
    namespace: String,
    holder_label: String,
}

impl KubernetesResourceLivenessProbe {
    /// Creates a probe for one resource collection.
    #[must_use]
    pub fn new(
        client: KubernetesApiClient,
        collection: ResourceCollection,
        namespace: impl Into<String>,
        holder_label: impl Into<String>,
    ) -> Self {
        Self {
            client,
            collection,
            namespace: namespace.into(),
            holder_label: holder_label.into(),
        }
    }
}

fn is_label_value(value: &str) -> bool {
    value.len() <= 63
        && value
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || "-_.".contains(character))
        && value.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && value.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
}

#[async_trait]
impl LivenessProbe for KubernetesResourceLivenessProbe {
    async fn holder_resource_state(
        &self,
        holder_identity: &str,
    ) -> AppResult<HolderResourceState> {
        if !is_label_value(holder_identity) {
            debug!(
                holder = %holder_identity,
                "holder identity is not a label value, liveness unknown"
            );
            return Ok(HolderResourceState::Unknown);
        }

        let selector = format!("{}={holder_identity}", self.holder_label);
        let list: ResourceList = self
            .client
            .get_json(
                self.collection
                    .namespaced_path(self.namespace.as_str())
                    .as_str(),
                &[("labelSelector", selector.as_str())],
                "list holder resources",
            )
            .await?;

        if list.items.is_empty() {
            return Ok(HolderResourceState::Missing);
        }

        if list.items.iter().all(ResourceItem::is_terminating) {
            return Ok(HolderResourceState::Terminated);
        }

        Ok(HolderResourceState::Active)
    }
}

#[cfg(test)]
mod tests;
