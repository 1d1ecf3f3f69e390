use std::fs;
use std::sync::Arc;
use std::time::Duration;

use slotgate_application::{
    AcquireOptions, CapacityChecker, CapacityPolicy, LeaseStore, LivenessProbe, ReclaimOptions,
    RetryPolicy, SlotAcquirer, SlotCoordinator, SlotReleaser, SlotStatusService, StaleReclaimer,
};
use slotgate_core::{AppError, AppResult};
use slotgate_domain::SlotPool;
use slotgate_infrastructure::{
    DisabledLivenessProbe, InMemoryLeaseStore, KubernetesApiClient, KubernetesApiConfig,
    KubernetesCapacityProvider, KubernetesLeaseStore, KubernetesResourceLivenessProbe,
    RedisLeaseStore, ResourceCollection,
};
use tracing::debug;

use crate::slotctl_config::{LeaseBackend, LivenessProbeKind, SlotctlConfig};

const KUBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Services that need only the lease store.
///
/// `release` and `status` run from these alone, so the cleanup path never
/// depends on liveness or capacity settings.
#[derive(Clone)]
pub struct SlotctlServices {
    pub releaser: SlotReleaser,
    pub status: SlotStatusService,
    lease_store: Arc<dyn LeaseStore>,
    pool: SlotPool,
    retry: RetryPolicy,
}

/// Services for the commands that reclaim and acquire.
#[derive(Clone)]
pub struct AcquisitionServices {
    pub reclaimer: StaleReclaimer,
    pub acquirer: SlotAcquirer,
    pub releaser: SlotReleaser,
    pub acquire_options: AcquireOptions,
}

impl SlotctlServices {
    pub fn build(config: &SlotctlConfig) -> AppResult<Self> {
        let pool = SlotPool::new(config.lease_prefix.as_str(), config.max_slots)?;
        let retry = RetryPolicy::new(config.store_retry_attempts, config.store_retry_backoff);
        let lease_store = build_lease_store(config)?;

        Ok(Self {
            releaser: SlotReleaser::new(lease_store.clone(), pool.clone(), retry),
            status: SlotStatusService::new(lease_store.clone(), pool.clone(), retry),
            lease_store,
            pool,
            retry,
        })
    }

    /// Wires the stale reclaimer, which needs the liveness probe.
    pub fn reclaimer(&self, config: &SlotctlConfig) -> AppResult<StaleReclaimer> {
        Ok(StaleReclaimer::new(
            self.lease_store.clone(),
            build_liveness_probe(config)?,
            self.pool.clone(),
            ReclaimOptions {
                orphan_grace: config.orphan_grace,
            },
            self.retry,
        ))
    }

    /// Wires reclaim and acquisition.
    pub fn acquisition(&self, config: &SlotctlConfig) -> AppResult<AcquisitionServices> {
        let reclaimer = self.reclaimer(config)?;
        let acquirer = SlotAcquirer::new(
            self.lease_store.clone(),
            reclaimer.clone(),
            self.pool.clone(),
            self.retry,
        );
        let acquire_options = AcquireOptions::new(
            config.lease_duration_seconds,
            config.slot_timeout,
            config.poll_interval,
        )?;

        Ok(AcquisitionServices {
            reclaimer,
            acquirer,
            releaser: self.releaser.clone(),
            acquire_options,
        })
    }
}

impl AcquisitionServices {
    /// Wires the full admission flow including the capacity check.
    pub fn coordinator(&self, config: &SlotctlConfig) -> AppResult<SlotCoordinator> {
        Ok(SlotCoordinator::new(
            self.reclaimer.clone(),
            self.acquirer.clone(),
            build_capacity_checker(config, config.capacity_strict)?,
            self.releaser.clone(),
            self.acquire_options,
            config.capacity_required,
        ))
    }
}

pub fn build_capacity_checker(
    config: &SlotctlConfig,
    strict: bool,
) -> AppResult<CapacityChecker> {
    let provider =
        KubernetesCapacityProvider::new(kube_client(config)?, config.autoscaler_max_nodes);

    Ok(CapacityChecker::new(
        Arc::new(provider),
        CapacityPolicy {
            strict,
            fail_open: config.capacity_fail_open,
        },
    ))
}

fn build_lease_store(config: &SlotctlConfig) -> AppResult<Arc<dyn LeaseStore>> {
    match config.lease_backend {
        LeaseBackend::Kubernetes => Ok(Arc::new(KubernetesLeaseStore::new(
            kube_client(config)?,
            config.namespace.as_str(),
        ))),
        LeaseBackend::Redis => {
            let client = redis::Client::open(config.redis_url.as_str()).map_err(|error| {
                AppError::Validation(format!("invalid REDIS_URL: {error}"))
            })?;
            Ok(Arc::new(RedisLeaseStore::new(
                client,
                config.redis_key_prefix.as_str(),
                config.namespace.as_str(),
            )))
        }
        LeaseBackend::Memory => Ok(Arc::new(InMemoryLeaseStore::new(config.namespace.as_str()))),
    }
}

fn build_liveness_probe(config: &SlotctlConfig) -> AppResult<Arc<dyn LivenessProbe>> {
    match config.liveness_probe {
        LivenessProbeKind::Kubernetes => Ok(Arc::new(KubernetesResourceLivenessProbe::new(
            kube_client(config)?,
            ResourceCollection::parse(config.liveness_resource.as_str()).map_err(|error| {
                AppError::Validation(format!("invalid LIVENESS_RESOURCE: {error}"))
            })?,
            config.liveness_namespace.as_str(),
            config.liveness_holder_label.as_str(),
        ))),
        LivenessProbeKind::Disabled => Ok(Arc::new(DisabledLivenessProbe)),
    }
}

fn kube_client(config: &SlotctlConfig) -> AppResult<KubernetesApiClient> {
    let server = config.kube.server.clone().ok_or_else(|| {
        AppError::Validation(
            "KUBE_API_SERVER is required outside a cluster (KUBERNETES_SERVICE_HOST is unset)"
                .to_owned(),
        )
    })?;

    let token = match config.kube.token.clone() {
        Some(token) => Some(token),
        None if config.kube.token_file.exists() => {
            let token = fs::read_to_string(&config.kube.token_file).map_err(|error| {
                AppError::Validation(format!(
                    "failed to read KUBE_TOKEN_FILE '{}': {error}",
                    config.kube.token_file.display()
                ))
            })?;
            Some(token.trim().to_owned())
        }
        None => None,
    };

    let ca_pem = if config.kube.ca_file.exists() {
        Some(fs::read(&config.kube.ca_file).map_err(|error| {
            AppError::Validation(format!(
                "failed to read KUBE_CA_FILE '{}': {error}",
                config.kube.ca_file.display()
            ))
        })?)
    } else {
        None
    };

    debug!(
        server = %server,
        has_token = token.is_some(),
        has_ca = ca_pem.is_some(),
        "configured kubernetes api client"
    );

    KubernetesApiClient::new(KubernetesApiConfig {
        server,
        token,
        ca_pem,
        insecure_skip_tls_verify: config.kube.insecure_skip_tls_verify,
        request_timeout: KUBE_REQUEST_TIMEOUT,
    })
}
