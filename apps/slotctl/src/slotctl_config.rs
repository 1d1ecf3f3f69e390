use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use slotgate_core::{AppError, AppResult};
use slotgate_domain::ResourceQuantity;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Backend holding the slot leases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseBackend {
    Kubernetes,
    Redis,
    Memory,
}

/// Source of holder liveness for orphan detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessProbeKind {
    Kubernetes,
    Disabled,
}

/// Kubernetes API connection settings before any file is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeConnection {
    pub server: Option<String>,
    pub token: Option<String>,
    pub token_file: PathBuf,
    pub ca_file: PathBuf,
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotctlConfig {
    pub max_slots: u32,
    pub slot_timeout: Duration,
    pub poll_interval: Duration,
    pub lease_duration_seconds: u32,
    pub namespace: String,
    pub lease_prefix: String,
    pub lease_backend: LeaseBackend,
    pub redis_url: String,
    pub redis_key_prefix: String,
    pub kube: KubeConnection,
    pub liveness_probe: LivenessProbeKind,
    pub liveness_resource: String,
    pub liveness_namespace: String,
    pub liveness_holder_label: String,
    pub orphan_grace: Duration,
    pub capacity_strict: bool,
    pub capacity_fail_open: bool,
    pub capacity_required: ResourceQuantity,
    pub autoscaler_max_nodes: u32,
    pub quota_guard_ceiling: Option<u32>,
    pub store_retry_attempts: u32,
    pub store_retry_backoff: Duration,
    pub holder_identity: String,
}

impl SlotctlConfig {
    /// Loads configuration from the process environment.
    pub fn load() -> AppResult<Self> {
        let variables: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| variables.get(name).cloned())
    }

    /// Loads configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let source = EnvSource { lookup: &lookup };

        let max_slots = source.parse_u32("MAX_SLOTS", 2)?;
        if max_slots == 0 {
            return Err(AppError::Validation(
                "MAX_SLOTS must be greater than zero".to_owned(),
            ));
        }

        let quota_guard_ceiling = source
            .optional("QUOTA_GUARD_CEILING")
            .map(|value| parse_number::<u32>("QUOTA_GUARD_CEILING", value.as_str()))
            .transpose()?;
        if let Some(ceiling) = quota_guard_ceiling
            && max_slots > ceiling
        {
            return Err(AppError::Validation(format!(
                "MAX_SLOTS ({max_slots}) exceeds QUOTA_GUARD_CEILING ({ceiling}); raise the quota first"
            )));
        }

        let slot_timeout_minutes = source.parse_u64("SLOT_TIMEOUT", 60)?;
        let poll_interval_seconds = source.parse_u64("SLOT_POLL_INTERVAL_SECONDS", 30)?;
        if poll_interval_seconds == 0 {
            return Err(AppError::Validation(
                "SLOT_POLL_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let lease_duration_seconds = source.parse_u32("LEASE_DURATION_SECONDS", 7200)?;
        if lease_duration_seconds == 0 {
            return Err(AppError::Validation(
                "LEASE_DURATION_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let namespace = source.string("NAMESPACE", "default");
        let lease_backend = match source.string("LEASE_BACKEND", "kubernetes").as_str() {
            "kubernetes" => LeaseBackend::Kubernetes,
            "redis" => LeaseBackend::Redis,
            "memory" => LeaseBackend::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "LEASE_BACKEND must be 'kubernetes', 'redis' or 'memory', got '{other}'"
                )));
            }
        };
        let liveness_probe = match source.string("LIVENESS_PROBE", "kubernetes").as_str() {
            "kubernetes" => LivenessProbeKind::Kubernetes,
            "none" => LivenessProbeKind::Disabled,
            other => {
                return Err(AppError::Validation(format!(
                    "LIVENESS_PROBE must be 'kubernetes' or 'none', got '{other}'"
                )));
            }
        };

        let capacity_required = ResourceQuantity::parse(
            source.string("CAPACITY_REQUIRED_CPU", "4").as_str(),
            source.string("CAPACITY_REQUIRED_MEMORY", "16Gi").as_str(),
        )
        .map_err(|error| {
            AppError::Validation(format!(
                "invalid CAPACITY_REQUIRED_CPU or CAPACITY_REQUIRED_MEMORY: {error}"
            ))
        })?;

        let kube = KubeConnection {
            server: source.optional("KUBE_API_SERVER").or_else(|| {
                let host = source.optional("KUBERNETES_SERVICE_HOST")?;
                let port = source
                    .optional("KUBERNETES_SERVICE_PORT")
                    .unwrap_or_else(|| "443".to_owned());
                Some(format!("https://{host}:{port}"))
            }),
            token: source.optional("KUBE_TOKEN"),
            token_file: source
                .optional("KUBE_TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(SERVICE_ACCOUNT_DIR).join("token")),
            ca_file: source
                .optional("KUBE_CA_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(SERVICE_ACCOUNT_DIR).join("ca.crt")),
            insecure_skip_tls_verify: source.parse_bool("KUBE_INSECURE_SKIP_TLS_VERIFY", false)?,
        };

        let holder_identity = source.optional("HOLDER_IDENTITY").unwrap_or_else(|| {
            match source.optional("GITHUB_RUN_ID") {
                Some(run_id) => {
                    let attempt = source
                        .optional("GITHUB_RUN_ATTEMPT")
                        .unwrap_or_else(|| "1".to_owned());
                    format!("{run_id}-{attempt}")
                }
                None => format!("run-{}", uuid::Uuid::new_v4()),
            }
        });

        Ok(Self {
            max_slots,
            slot_timeout: Duration::from_secs(slot_timeout_minutes.saturating_mul(60)),
            poll_interval: Duration::from_secs(poll_interval_seconds),
            lease_duration_seconds,
            liveness_namespace: source.string("LIVENESS_NAMESPACE", namespace.as_str()),
            namespace,
            lease_prefix: source.string("LEASE_PREFIX", "slot"),
            lease_backend,
            redis_url: source.string("REDIS_URL", "redis://127.0.0.1:6379"),
            redis_key_prefix: source.string("REDIS_KEY_PREFIX", "slotgate"),
            kube,
            liveness_probe,
            liveness_resource: source
                .string("LIVENESS_RESOURCE", "cluster.x-k8s.io/v1beta1/clusters"),
            liveness_holder_label: source.string("LIVENESS_HOLDER_LABEL", "slotgate.io/holder"),
            orphan_grace: Duration::from_secs(source.parse_u64("ORPHAN_GRACE_SECONDS", 1800)?),
            capacity_strict: source.parse_bool("CAPACITY_STRICT", false)?,
            capacity_fail_open: source.parse_bool("CAPACITY_FAIL_OPEN", true)?,
            capacity_required,
            autoscaler_max_nodes: source.parse_u32("CAPACITY_AUTOSCALER_MAX_NODES", 0)?,
            quota_guard_ceiling,
            store_retry_attempts: source.parse_u32("STORE_RETRY_ATTEMPTS", 3)?,
            store_retry_backoff: Duration::from_millis(
                source.parse_u64("STORE_RETRY_BACKOFF_MS", 500)?,
            ),
            holder_identity,
        })
    }
}

struct EnvSource<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl EnvSource<'_> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_owned())
    }

    fn parse_u32(&self, name: &str, default: u32) -> AppResult<u32> {
        match self.optional(name) {
            Some(value) => parse_number(name, value.as_str()),
            None => Ok(default),
        }
    }

    fn parse_u64(&self, name: &str, default: u64) -> AppResult<u64> {
        match self.optional(name) {
            Some(value) => parse_number(name, value.as_str()),
            None => Ok(default),
        }
    }

    fn parse_bool(&self, name: &str, default: bool) -> AppResult<bool> {
        match self.optional(name) {
            Some(value) if value.eq_ignore_ascii_case("true") || value == "1" => Ok(true),
            Some(value) if value.eq_ignore_ascii_case("false") || value == "0" => Ok(false),
            Some(value) => Err(AppError::Validation(format!(
                "invalid {name} value '{value}': expected true or false"
            ))),
            None => Ok(default),
        }
    }
}

fn parse_number<T>(name: &str, value: &str) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use slotgate_core::AppError;
    use slotgate_domain::ResourceQuantity;

    use super::{LeaseBackend, LivenessProbeKind, SlotctlConfig};

    fn load(pairs: &[(&str, &str)]) -> Result<SlotctlConfig, AppError> {
        let variables: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        SlotctlConfig::from_lookup(|name| variables.get(name).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = load(&[]).unwrap_or_else(|_| unreachable!());

        assert_eq!(config.max_slots, 2);
        assert_eq!(config.slot_timeout, Duration::from_secs(3600));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.lease_duration_seconds, 7200);
        assert_eq!(config.namespace, "default");
        assert_eq!(config.liveness_namespace, "default");
        assert_eq!(config.lease_prefix, "slot");
        assert_eq!(config.lease_backend, LeaseBackend::Kubernetes);
        assert_eq!(config.liveness_probe, LivenessProbeKind::Kubernetes);
        assert!(!config.capacity_strict);
        assert!(config.capacity_fail_open);
        assert_eq!(
            config.capacity_required,
            ResourceQuantity::new(4000, 16 * 1024 * 1024 * 1024)
        );
        assert_eq!(config.kube.server, None);
        assert!(config.holder_identity.starts_with("run-"));
    }

    #[test]
    fn github_run_identity_is_the_default_holder() {
        let config = load(&[("GITHUB_RUN_ID", "9001"), ("GITHUB_RUN_ATTEMPT", "2")])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.holder_identity, "9001-2");

        let config = load(&[("GITHUB_RUN_ID", "9001"), ("HOLDER_IDENTITY", "nightly")])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.holder_identity, "nightly");
    }

    #[test]
    fn in_cluster_server_comes_from_service_environment() {
        let config = load(&[
            ("KUBERNETES_SERVICE_HOST", "10.96.0.1"),
            ("KUBERNETES_SERVICE_PORT", "6443"),
            ("NAMESPACE", "ci"),
        ])
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(config.kube.server.as_deref(), Some("https://10.96.0.1:6443"));
        assert_eq!(config.liveness_namespace, "ci");
    }

    #[test]
    fn max_slots_above_quota_ceiling_is_rejected() {
        let result = load(&[("MAX_SLOTS", "4"), ("QUOTA_GUARD_CEILING", "3")]);
        assert!(matches!(
            result,
            Err(AppError::Validation(message)) if message.contains("QUOTA_GUARD_CEILING")
        ));

        assert!(load(&[("MAX_SLOTS", "3"), ("QUOTA_GUARD_CEILING", "3")]).is_ok());
    }

    #[test]
    fn invalid_values_name_the_variable() {
        for (name, value) in [
            ("MAX_SLOTS", "0"),
            ("MAX_SLOTS", "two"),
            ("SLOT_POLL_INTERVAL_SECONDS", "0"),
            ("LEASE_BACKEND", "etcd"),
            ("CAPACITY_STRICT", "maybe"),
        ] {
            let result = load(&[(name, value)]);
            assert!(
                matches!(&result, Err(AppError::Validation(message)) if message.contains(name)),
                "{name}={value} should be rejected"
            );
        }
    }
}
