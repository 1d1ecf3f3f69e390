//! Aggregate cluster headroom computed from nodes and pod requests.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::Deserialize;
use slotgate_application::CapacityProvider;
use slotgate_core::AppResult;
use slotgate_domain::{CapacitySnapshot, ResourceQuantity, parse_cpu_millis, parse_memory_bytes};
use tracing::debug;

use crate::kubernetes_api_client::KubernetesApiClient;

const ACTIVE_POD_SELECTOR: &str = "status.phase!=Succeeded,status.phase!=Failed";

#[derive(Debug, Deserialize)]
struct NodeList {
    #[serde(default)]
    items: Vec<Node>,
}

#[derive(Debug, Deserialize)]
struct Node {
    metadata: NamedMeta,
    #[serde(default)]
    spec: NodeSpec,
    #[serde(default)]
    status: NodeStatus,
}

#[derive(Debug, Deserialize)]
struct NamedMeta {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct NodeSpec {
    #[serde(default)]
    unschedulable: bool,
}

#[derive(Debug, Default, Deserialize)]
struct NodeStatus {
    #[serde(default)]
    allocatable: BTreeMap<String, String>,
    #[serde(default)]
    conditions: Vec<NodeCondition>,
}

#[derive(Debug, Deserialize)]
struct NodeCondition {
    #[serde(rename = "type")]
    condition_type: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    spec: PodSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodSpec {
    #[serde(default)]
    node_name: Option<String>,
    #[serde(default)]
    containers: Vec<Container>,
}

#[derive(Debug, Deserialize)]
struct Container {
    #[serde(default)]
    resources: ContainerResources,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerResources {
    #[serde(default)]
    requests: BTreeMap<String, String>,
}

impl Node {
    fn is_schedulable(&self) -> bool {
        !self.spec.unschedulable
            && self
                .status
                .conditions
                .iter()
                .any(|condition| condition.condition_type == "Ready" && condition.status == "True")
    }
}

fn quantity_of(resources: &BTreeMap<String, String>) -> AppResult<ResourceQuantity> {
    let cpu_millis = resources
        .get("cpu")
        .map(|value| parse_cpu_millis(value))
        .transpose()?
        .unwrap_or(0);
    let memory_bytes = resources
        .get("memory")
        .map(|value| parse_memory_bytes(value))
        .transpose()?
        .unwrap_or(0);

    Ok(ResourceQuantity::new(cpu_millis, memory_bytes))
}

/// Capacity provider reading nodes and pods from the Kubernetes API.
///
/// Headroom is the allocatable capacity of Ready schedulable nodes minus the
/// requests of active pods scheduled onto them. When the autoscaler may add
/// nodes, each projected node contributes the largest node's allocatable.
#[derive(Clone)]
pub struct KubernetesCapacityProvider {
    client: KubernetesApiClient,
    autoscaler_max_nodes: u32,
}

impl KubernetesCapacityProvider {
    /// Creates a provider.
    #[must_use]
    pub fn new(client: KubernetesApiClient, autoscaler_max_nodes: u32) -> Self {
        Self {
            client,
            autoscaler_max_nodes,
        }
    }
}

#[async_trait]
impl CapacityProvider for KubernetesCapacityProvider {
    async fn capacity_snapshot(&self) -> AppResult<CapacitySnapshot> {
        let nodes: NodeList = self
            .client
            .get_json("/api/v1/nodes", &[], "list nodes")
            .await?;
        let pods: PodList = self
            .client
            .get_json(
                "/api/v1/pods",
                &[("fieldSelector", ACTIVE_POD_SELECTOR)],
                "list pods",
            )
            .await?;

        let mut allocatable = ResourceQuantity::default();
        let mut largest_node = ResourceQuantity::default();
        let mut schedulable_nodes = HashSet::new();

        for node in nodes.items.iter().filter(|node| node.is_schedulable()) {
            let node_allocatable = quantity_of(&node.status.allocatable)?;
            allocatable = allocatable.saturating_add(node_allocatable);
            largest_node = largest_node.max(node_allocatable);
            schedulable_nodes.insert(node.metadata.name.as_str());
        }

        let mut requested = ResourceQuantity::default();
        for pod in &pods.items {
            let on_schedulable_node = pod
                .spec
                .node_name
                .as_deref()
                .is_some_and(|name| schedulable_nodes.contains(name));
            if !on_schedulable_node {
                continue;
            }

            for container in &pod.spec.containers {
                requested = requested.saturating_add(quantity_of(&container.resources.requests)?);
            }
        }

        let autoscale_headroom =
            largest_node.saturating_mul(i64::from(self.autoscaler_max_nodes));

        debug!(
            nodes = schedulable_nodes.len(),
            allocatable = %allocatable,
            requested = %requested,
            autoscale_headroom = %autoscale_headroom,
            "computed cluster capacity"
        );

        Ok(CapacitySnapshot {
            allocatable,
            requested,
            autoscale_headroom,
        })
    }
}
