use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use slotgate_core::{AppError, AppResult, NonEmptyString};

/// Coordination record proving that one run holds one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    /// Slot name the lease is keyed by.
    pub name: String,
    /// Namespace scoping the coordination record.
    pub namespace: String,
    /// Opaque identifier of the owning run.
    pub holder_identity: String,
    /// Time the lease was created.
    pub acquire_time: DateTime<Utc>,
    /// Time of the last liveness refresh.
    pub renew_time: DateTime<Utc>,
    /// Time to live measured from `acquire_time`.
    pub lease_duration_seconds: u32,
}

impl Lease {
    /// Returns the instant after which the lease is unconditionally stale.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.acquire_time + Duration::seconds(i64::from(self.lease_duration_seconds))
    }

    /// Returns true once `now` is past the expiry instant.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Returns the time left before expiry, clamped at zero.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let remaining = self.expires_at() - now;
        if remaining < Duration::zero() {
            Duration::zero()
        } else {
            remaining
        }
    }

    /// Returns how long ago the lease was acquired.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.acquire_time
    }
}

/// Validated input for creating one lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseDraft {
    slot_name: NonEmptyString,
    holder_identity: NonEmptyString,
    lease_duration_seconds: u32,
}

impl LeaseDraft {
    /// Creates a lease draft.
    pub fn new(
        slot_name: impl Into<String>,
        holder_identity: impl Into<String>,
        lease_duration_seconds: u32,
    ) -> AppResult<Self> {
        let slot_name = NonEmptyString::new(slot_name)
            .map_err(|_| AppError::Validation("lease slot name must not be empty".to_owned()))?;
        let holder_identity = NonEmptyString::new(holder_identity).map_err(|_| {
            AppError::Validation("lease holder identity must not be empty".to_owned())
        })?;

        if lease_duration_seconds == 0 {
            return Err(AppError::Validation(
                "lease_duration_seconds must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            slot_name,
            holder_identity,
            lease_duration_seconds,
        })
    }

    /// Returns the slot name.
    #[must_use]
    pub fn slot_name(&self) -> &str {
        self.slot_name.as_str()
    }

    /// Returns the holder identity.
    #[must_use]
    pub fn holder_identity(&self) -> &str {
        self.holder_identity.as_str()
    }

    /// Returns the lease TTL in seconds.
    #[must_use]
    pub fn lease_duration_seconds(&self) -> u32 {
        self.lease_duration_seconds
    }

    /// Materializes the lease record as acquired at `now` within `namespace`.
    #[must_use]
    pub fn into_lease(self, namespace: impl Into<String>, now: DateTime<Utc>) -> Lease {
        Lease {
            name: self.slot_name.into(),
            namespace: namespace.into(),
            holder_identity: self.holder_identity.into(),
            acquire_time: now,
            renew_time: now,
            lease_duration_seconds: self.lease_duration_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    use super::LeaseDraft;

    #[test]
    fn draft_rejects_zero_ttl() {
        assert!(LeaseDraft::new("slot-0", "run-1", 0).is_err());
    }

    #[test]
    fn draft_rejects_blank_holder() {
        assert!(LeaseDraft::new("slot-0", " ", 60).is_err());
    }

    #[test]
    fn lease_acquired_three_hours_ago_with_two_hour_ttl_is_expired() {
        let now = Utc::now();
        let draft = LeaseDraft::new("slot-0", "run-1", 7200).unwrap_or_else(|_| unreachable!());
        let lease = draft.into_lease("ci", now - Duration::hours(3));

        assert!(lease.is_expired(now));
        assert_eq!(lease.remaining(now), Duration::zero());
    }

    #[test]
    fn lease_is_not_expired_at_exact_expiry() {
        let acquired = Utc
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(|| unreachable!());
        let draft = LeaseDraft::new("slot-0", "run-1", 60).unwrap_or_else(|_| unreachable!());
        let lease = draft.into_lease("ci", acquired);

        assert!(!lease.is_expired(lease.expires_at()));
        assert!(lease.is_expired(lease.expires_at() + Duration::seconds(1)));
    }

    proptest! {
        #[test]
        fn expiry_matches_ttl_arithmetic(ttl in 1_u32..100_000, elapsed in 0_i64..200_000) {
            let now = Utc::now();
            let draft = LeaseDraft::new("slot-0", "run-1", ttl).unwrap_or_else(|_| unreachable!());
            let lease = draft.into_lease("ci", now - Duration::seconds(elapsed));

            prop_assert_eq!(lease.is_expired(now), elapsed > i64::from(ttl));
        }
    }
}
