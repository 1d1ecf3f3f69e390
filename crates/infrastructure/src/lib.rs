//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod disabled_liveness_probe;
mod in_memory_lease_store;
mod kubernetes_api_client;
mod kubernetes_capacity_provider;
mod kubernetes_lease_store;
mod kubernetes_resource_liveness_probe;
mod redis_lease_store;

pub use disabled_liveness_probe::DisabledLivenessProbe;
pub use in_memory_lease_store::InMemoryLeaseStore;
pub use kubernetes_api_client::{KubernetesApiClient, KubernetesApiConfig};
pub use kubernetes_capacity_provider::KubernetesCapacityProvider;
pub use kubernetes_lease_store::KubernetesLeaseStore;
pub use kubernetes_resource_liveness_probe::{KubernetesResourceLivenessProbe, ResourceCollection};
pub use redis_lease_store::RedisLeaseStore;
