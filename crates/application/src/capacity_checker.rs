//! Capacity-aware admission control.
//!
//! The check is advisory: the administrator's quota ceiling on expensive
//! resources is the hard limit. Two switches decide what happens when the
//! check cannot confirm headroom:
//!
//! - `fail_open` (default on): a capacity query that fails transiently logs a
//!   warning and admits the run. When off, the query error is returned.
//!   Non-transient failures such as a refused credential are always returned.
//! - `strict` (default off): a genuine shortfall returns
//!   `AppError::CapacityInsufficient`. When off, the shortfall is logged and
//!   the run is admitted.

use std::sync::Arc;

use slotgate_core::{AppError, AppResult};
use slotgate_domain::{CapacityDecision, CapacitySnapshot, ResourceQuantity};
use tracing::{info, warn};

use crate::slot_ports::CapacityProvider;

/// Admission switches for the capacity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityPolicy {
    /// Block on a genuine shortfall instead of warning.
    pub strict: bool,
    /// Admit when the capacity query fails transiently.
    pub fail_open: bool,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            strict: false,
            fail_open: true,
        }
    }
}

/// Result of one successful capacity query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityReport {
    /// Go/no-go for one more cluster.
    pub decision: CapacityDecision,
    /// Raw capacity figures.
    pub snapshot: CapacitySnapshot,
    /// Footprint of one additional cluster.
    pub required: ResourceQuantity,
}

impl CapacityReport {
    /// Returns free capacity including autoscaling headroom.
    #[must_use]
    pub fn available(&self) -> ResourceQuantity {
        self.snapshot.available()
    }
}

/// Admission outcome after applying [`CapacityPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapacityAdmission {
    /// Headroom covers the footprint.
    Admitted(CapacityReport),
    /// Headroom is short but the policy is lenient.
    AdmittedWithShortfall(CapacityReport),
    /// The capacity query failed and the policy fails open.
    AdmittedUnchecked {
        /// Error text of the failed query.
        reason: String,
    },
}

/// Compares aggregate headroom against the footprint of one more cluster.
#[derive(Clone)]
pub struct CapacityChecker {
    provider: Arc<dyn CapacityProvider>,
    policy: CapacityPolicy,
}

impl CapacityChecker {
    /// Creates a capacity checker.
    #[must_use]
    pub fn new(provider: Arc<dyn CapacityProvider>, policy: CapacityPolicy) -> Self {
        Self { provider, policy }
    }

    /// Returns the configured policy.
    #[must_use]
    pub fn policy(&self) -> CapacityPolicy {
        self.policy
    }

    /// Queries capacity and renders a raw decision without applying policy.
    pub async fn check_capacity(&self, required: &ResourceQuantity) -> AppResult<CapacityReport> {
        let snapshot = self.provider.capacity_snapshot().await?;

        Ok(CapacityReport {
            decision: snapshot.decide(required),
            snapshot,
            required: *required,
        })
    }

    /// Applies the admission policy to one capacity query.
    pub async fn admit(&self, required: &ResourceQuantity) -> AppResult<CapacityAdmission> {
        let report = match self.check_capacity(required).await {
            Ok(report) => report,
            Err(error) if self.policy.fail_open && error.is_transient() => {
                warn!(
                    required = %required,
                    error = %error,
                    "capacity check failed, proceeding without it"
                );
                return Ok(CapacityAdmission::AdmittedUnchecked {
                    reason: error.to_string(),
                });
            }
            Err(error) => return Err(error),
        };

        match report.decision {
            CapacityDecision::Proceed => {
                info!(
                    required = %required,
                    available = %report.available(),
                    "capacity check passed"
                );
                Ok(CapacityAdmission::Admitted(report))
            }
            CapacityDecision::Insufficient if self.policy.strict => {
                Err(AppError::CapacityInsufficient(format!(
                    "required {required} but only {} available",
                    report.available()
                )))
            }
            CapacityDecision::Insufficient => {
                warn!(
                    required = %required,
                    available = %report.available(),
                    "capacity is short, proceeding because strict admission is off"
                );
                Ok(CapacityAdmission::AdmittedWithShortfall(report))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use slotgate_core::AppError;
    use slotgate_domain::{CapacityDecision, ResourceQuantity};

    use crate::test_support::FakeCapacityProvider;

    use super::{CapacityAdmission, CapacityChecker, CapacityPolicy};

    const GIB: i64 = 1024 * 1024 * 1024;

    fn required() -> ResourceQuantity {
        ResourceQuantity::new(4000, 16 * GIB)
    }

    #[tokio::test]
    async fn enough_headroom_is_admitted() {
        let provider = Arc::new(FakeCapacityProvider::with_free(ResourceQuantity::new(
            8000,
            32 * GIB,
        )));
        let checker = CapacityChecker::new(provider, CapacityPolicy::default());

        let admission = checker.admit(&required()).await;
        assert!(matches!(admission, Ok(CapacityAdmission::Admitted(_))));
    }

    #[tokio::test]
    async fn query_failure_fails_open_by_default() {
        let checker = CapacityChecker::new(
            Arc::new(FakeCapacityProvider::failing()),
            CapacityPolicy::default(),
        );

        let admission = checker.admit(&required()).await;
        assert!(matches!(
            admission,
            Ok(CapacityAdmission::AdmittedUnchecked { .. })
        ));
    }

    #[tokio::test]
    async fn query_failure_surfaces_when_fail_open_is_off() {
        let checker = CapacityChecker::new(
            Arc::new(FakeCapacityProvider::failing()),
            CapacityPolicy {
                strict: false,
                fail_open: false,
            },
        );

        let admission = checker.admit(&required()).await;
        assert!(matches!(admission, Err(AppError::Unavailable(_))));
    }

    #[tokio::test]
    async fn non_transient_query_failure_is_never_failed_open() {
        let checker = CapacityChecker::new(
            Arc::new(FakeCapacityProvider::refusing()),
            CapacityPolicy::default(),
        );

        let admission = checker.admit(&required()).await;
        assert!(matches!(admission, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn shortfall_warns_in_lenient_mode() {
        let provider = Arc::new(FakeCapacityProvider::with_free(ResourceQuantity::new(
            2000,
            32 * GIB,
        )));
        let checker = CapacityChecker::new(provider, CapacityPolicy::default());

        let admission = checker.admit(&required()).await;
        match admission {
            Ok(CapacityAdmission::AdmittedWithShortfall(report)) => {
                assert_eq!(report.decision, CapacityDecision::Insufficient);
            }
            other => panic!("expected lenient shortfall admission, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shortfall_blocks_in_strict_mode() {
        let provider = Arc::new(FakeCapacityProvider::with_free(ResourceQuantity::new(
            8000,
            8 * GIB,
        )));
        let checker = CapacityChecker::new(
            provider,
            CapacityPolicy {
                strict: true,
                fail_open: true,
            },
        );

        let admission = checker.admit(&required()).await;
        assert!(matches!(admission, Err(AppError::CapacityInsufficient(_))));
    }
}
