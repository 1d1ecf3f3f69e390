use std::time::Duration;

use slotgate_core::{AppError, AppResult};

/// Parameters for one slot acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOptions {
    /// TTL written into the created lease.
    pub lease_duration_seconds: u32,
    /// Cumulative time to wait for a free slot.
    pub timeout: Duration,
    /// Sleep between full scans of the pool.
    pub poll_interval: Duration,
}

impl AcquireOptions {
    /// Creates validated acquisition options.
    pub fn new(
        lease_duration_seconds: u32,
        timeout: Duration,
        poll_interval: Duration,
    ) -> AppResult<Self> {
        if lease_duration_seconds == 0 {
            return Err(AppError::Validation(
                "lease_duration_seconds must be greater than zero".to_owned(),
            ));
        }

        if poll_interval.is_zero() {
            return Err(AppError::Validation(
                "poll_interval must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            lease_duration_seconds,
            timeout,
            poll_interval,
        })
    }
}

/// Parameters for stale lease reclaim passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimOptions {
    /// Minimum lease age before the liveness cross-check applies.
    pub orphan_grace: Duration,
}

impl Default for ReclaimOptions {
    fn default() -> Self {
        Self {
            orphan_grace: Duration::from_secs(30 * 60),
        }
    }
}
