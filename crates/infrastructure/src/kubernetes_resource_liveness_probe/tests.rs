use serde_json::json;
use slotgate_application::LivenessProbe;
use slotgate_core::AppError;
use slotgate_domain::HolderResourceState;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::kubernetes_api_client::KubernetesApiClient;

use super::{KubernetesResourceLivenessProbe, ResourceCollection};

const CLUSTERS_PATH: &str = "/apis/cluster.x-k8s.io/v1beta1/namespaces/ci/clusters";

fn probe(server: &MockServer) -> KubernetesResourceLivenessProbe {
    let client = KubernetesApiClient::with_http_client(reqwest::Client::new(), server.uri(), None);
    let collection = ResourceCollection::parse("cluster.x-k8s.io/v1beta1/clusters")
        .unwrap_or_else(|_| unreachable!());
    KubernetesResourceLivenessProbe::new(client, collection, "ci", "slotgate.io/holder")
}

async fn mount_items(server: &MockServer, holder: &str, items: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(CLUSTERS_PATH))
        .and(query_param(
            "labelSelector",
            format!("slotgate.io/holder={holder}"),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": items })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn running_resource_is_active() {
    let server = MockServer::start().await;
    mount_items(
        &server,
        "run-1",
        json!([{ "metadata": { "name": "e2e-run-1" }, "status": { "phase": "Provisioned" } }]),
    )
    .await;

    let state = probe(&server).holder_resource_state("run-1").await;
    assert!(matches!(state, Ok(HolderResourceState::Active)));
}

#[tokio::test]
async fn absent_resource_is_missing() {
    let server = MockServer::start().await;
    mount_items(&server, "run-2", json!([])).await;

    let state = probe(&server).holder_resource_state("run-2").await;
    assert!(matches!(state, Ok(HolderResourceState::Missing)));
}

#[tokio::test]
async fn resource_being_deleted_is_terminated() {
    let server = MockServer::start().await;
    mount_items(
        &server,
        "run-3",
        json!([{
            "metadata": { "name": "e2e-run-3", "deletionTimestamp": "2026-03-01T10:00:00Z" },
            "status": { "phase": "Provisioned" }
        }]),
    )
    .await;

    let state = probe(&server).holder_resource_state("run-3").await;
    assert!(matches!(state, Ok(HolderResourceState::Terminated)));
}

#[tokio::test]
async fn api_failure_is_reported_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CLUSTERS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let state = probe(&server).holder_resource_state("run-4").await;
    assert!(matches!(state, Err(AppError::Unavailable(_))));
}

#[tokio::test]
async fn holder_that_is_not_a_label_value_is_unknown() {
    let server = MockServer::start().await;

    let state = probe(&server).holder_resource_state("run 5/attempt").await;
    assert!(matches!(state, Ok(HolderResourceState::Unknown)));
}

#[test]
fn collection_paths_cover_core_and_named_groups() {
    let core = ResourceCollection::parse("v1/pods").unwrap_or_else(|_| unreachable!());
    assert_eq!(core.namespaced_path("ci"), "/api/v1/namespaces/ci/pods");

    let named = ResourceCollection::parse("cluster.x-k8s.io/v1beta1/clusters")
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(named.namespaced_path("ci"), CLUSTERS_PATH);

    assert!(ResourceCollection::parse("clusters").is_err());
    assert!(ResourceCollection::parse("a//b").is_err());
}
