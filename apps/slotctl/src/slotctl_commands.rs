//! Command handlers. Results go to stdout, diagnostics to the tracing log.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::process::{ExitCode, ExitStatus};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use slotgate_application::{
    CapacityAdmission, GuardedRunOutcome, PoolStatus, ReclaimReport, SlotCoordinator,
    StaleReclaimer,
};
use slotgate_core::{AppError, AppResult};
use slotgate_domain::ResourceQuantity;
use tracing::{info, warn};

use crate::shutdown::shutdown_signal;
use crate::slotctl_config::SlotctlConfig;
use crate::slotctl_services::{AcquisitionServices, SlotctlServices, build_capacity_checker};

/// Exit status reported when a run is cancelled by a signal.
pub const CANCELLED_EXIT_CODE: u8 = 130;

/// Maps an error to the process exit status.
pub fn exit_status_for(error: &AppError) -> u8 {
    match error {
        AppError::AcquisitionTimeout(_) => 2,
        AppError::CapacityInsufficient(_) => 3,
        _ => 1,
    }
}

pub async fn acquire(
    services: &AcquisitionServices,
    holder_identity: &str,
) -> AppResult<ExitCode> {
    reclaim_before_acquire(&services.reclaimer).await;

    let lease = services
        .acquirer
        .acquire(holder_identity, &services.acquire_options)
        .await?;

    write_stdout(format!("{}\n", lease.name).as_str())?;
    Ok(ExitCode::SUCCESS)
}

pub async fn release(services: &SlotctlServices, index: u32) -> AppResult<ExitCode> {
    services.releaser.release_index(index).await?;
    Ok(ExitCode::SUCCESS)
}

pub async fn cleanup_stale(reclaimer: &StaleReclaimer) -> AppResult<ExitCode> {
    let report = reclaimer.reclaim().await?;
    write_stdout(render_reclaim_report(&report).as_str())?;
    Ok(ExitCode::SUCCESS)
}

pub async fn check_capacity(
    config: &SlotctlConfig,
    cpu: Option<&str>,
    memory: Option<&str>,
    strict: bool,
) -> AppResult<ExitCode> {
    let required = match (cpu, memory) {
        (None, None) => config.capacity_required,
        (cpu, memory) => ResourceQuantity::new(
            cpu.map(slotgate_domain::parse_cpu_millis)
                .transpose()?
                .unwrap_or(config.capacity_required.cpu_millis),
            memory
                .map(slotgate_domain::parse_memory_bytes)
                .transpose()?
                .unwrap_or(config.capacity_required.memory_bytes),
        ),
    };

    let checker = build_capacity_checker(config, strict || config.capacity_strict)?;
    let admission = checker.admit(&required).await?;

    write_stdout(render_capacity(&admission).as_str())?;
    Ok(ExitCode::SUCCESS)
}

pub async fn status(
    services: &SlotctlServices,
    watch: bool,
    interval: Duration,
) -> AppResult<ExitCode> {
    if !watch {
        let snapshot = services.status.snapshot().await?;
        write_stdout(render_status(&snapshot).as_str())?;
        return Ok(ExitCode::SUCCESS);
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        match services.status.snapshot().await {
            Ok(snapshot) => write_stdout(render_status(&snapshot).as_str())?,
            Err(error) => warn!(error = %error, "failed to read slot status"),
        }

        tokio::select! {
            () = &mut shutdown => return Ok(ExitCode::SUCCESS),
            () = tokio::time::sleep(interval) => {}
        }
    }
}

pub async fn run_guarded(
    coordinator: &SlotCoordinator,
    holder_identity: &str,
    command: &[String],
) -> AppResult<ExitCode> {
    let Some((program, args)) = command.split_first() else {
        return Err(AppError::Validation(
            "run requires a command after '--'".to_owned(),
        ));
    };

    let outcome = coordinator
        .run_guarded(
            holder_identity,
            |lease| async move {
                info!(slot = %lease.name, program = %program, "starting guarded command");
                tokio::process::Command::new(program)
                    .args(args)
                    .env("SLOTGATE_SLOT", lease.name.as_str())
                    .env("SLOTGATE_HOLDER", lease.holder_identity.as_str())
                    .kill_on_drop(true)
                    .status()
                    .await
            },
            shutdown_signal(),
        )
        .await?;

    match outcome {
        GuardedRunOutcome::Completed(Ok(status)) => {
            info!(status = %status, "guarded command finished");
            Ok(ExitCode::from(child_exit_status(status)))
        }
        GuardedRunOutcome::Completed(Err(error)) => Err(AppError::Internal(format!(
            "failed to start '{program}': {error}"
        ))),
        GuardedRunOutcome::Cancelled => Ok(ExitCode::from(CANCELLED_EXIT_CODE)),
    }
}

async fn reclaim_before_acquire(reclaimer: &StaleReclaimer) {
    match reclaimer.reclaim().await {
        Ok(report) if report.freed_any() => {
            info!(
                reclaimed = report.reclaimed.len(),
                "reclaimed stale leases before acquisition"
            );
        }
        Ok(_) => {}
        Err(error) => warn!(error = %error, "stale cleanup failed, acquiring anyway"),
    }
}

/// Maps the child's status to ours. A child killed by a signal reports
/// `128 + signo`, the shell convention, so it never collides with exit 1.
fn child_exit_status(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return u8::try_from(code).unwrap_or(1);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return u8::try_from(128 + signal).unwrap_or(u8::MAX);
        }
    }

    1
}

fn write_stdout(text: &str) -> AppResult<()> {
    let mut out = io::stdout().lock();
    out.write_all(text.as_bytes())
        .and_then(|()| out.flush())
        .map_err(|error| AppError::Internal(format!("failed to write to stdout: {error}")))
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn format_remaining(remaining: chrono::Duration) -> String {
    let minutes = remaining.num_minutes().max(0);
    format!("{}h{:02}m", minutes / 60, minutes % 60)
}

/// Renders the slot table printed by `status`.
pub fn render_status(status: &PoolStatus) -> String {
    let now = status.observed_at;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{:<16}  {:<7}  {:<24}  {:<20}  {:<20}  REMAINING",
        "SLOT", "STATE", "HOLDER", "ACQUIRED", "EXPIRES"
    );

    for slot in &status.slots {
        match &slot.lease {
            Some(lease) => {
                let state = if lease.is_expired(now) { "expired" } else { "held" };
                let _ = writeln!(
                    out,
                    "{:<16}  {:<7}  {:<24}  {:<20}  {:<20}  {}",
                    slot.slot_name,
                    state,
                    lease.holder_identity,
                    format_timestamp(lease.acquire_time),
                    format_timestamp(lease.expires_at()),
                    format_remaining(lease.remaining(now)),
                );
            }
            None => {
                let _ = writeln!(out, "{:<16}  {:<7}  -", slot.slot_name, "free");
            }
        }
    }

    let _ = writeln!(
        out,
        "{} slots, {} held, {} free",
        status.slots.len(),
        status.held_count(),
        status.free_count()
    );

    for lease in &status.stray_leases {
        let _ = writeln!(
            out,
            "outside pool: {} held by '{}' (expires {})",
            lease.name,
            lease.holder_identity,
            format_timestamp(lease.expires_at())
        );
    }

    out
}

/// Renders the summary printed by `cleanup-stale`.
pub fn render_reclaim_report(report: &ReclaimReport) -> String {
    let mut out = String::new();

    for reclaimed in &report.reclaimed {
        let _ = writeln!(
            out,
            "reclaimed {} ({}, holder '{}')",
            reclaimed.lease.name,
            reclaimed.reason.as_str(),
            reclaimed.lease.holder_identity
        );
    }

    for (slot_name, error) in &report.failed {
        let _ = writeln!(out, "failed {slot_name}: {error}");
    }

    let _ = writeln!(
        out,
        "scanned {}, reclaimed {}, failed {}",
        report.scanned,
        report.reclaimed.len(),
        report.failed.len()
    );

    out
}

/// Renders the decision printed by `check-capacity`.
pub fn render_capacity(admission: &CapacityAdmission) -> String {
    match admission {
        CapacityAdmission::Admitted(report) => format!(
            "proceed: required {} available {}\n",
            report.required,
            report.available()
        ),
        CapacityAdmission::AdmittedWithShortfall(report) => format!(
            "insufficient (advisory): required {} available {}\n",
            report.required,
            report.available()
        ),
        CapacityAdmission::AdmittedUnchecked { reason } => {
            format!("unchecked: {reason}\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use slotgate_application::{
        CapacityAdmission, CapacityReport, PoolStatus, ReclaimReport, ReclaimedLease,
    };
    use slotgate_core::AppError;
    use slotgate_domain::{
        CapacityDecision, CapacitySnapshot, LeaseDraft, ResourceQuantity, SlotPool, StaleReason,
    };

    use super::{
        child_exit_status, exit_status_for, format_remaining, render_capacity,
        render_reclaim_report, render_status,
    };

    #[test]
    fn exit_codes_distinguish_timeout_and_capacity() {
        assert_eq!(
            exit_status_for(&AppError::AcquisitionTimeout("busy".to_owned())),
            2
        );
        assert_eq!(
            exit_status_for(&AppError::CapacityInsufficient("full".to_owned())),
            3
        );
        assert_eq!(exit_status_for(&AppError::Unavailable("down".to_owned())), 1);
    }

    #[test]
    fn status_table_lists_every_slot_and_strays() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(|| unreachable!());
        let pool = SlotPool::new("slot", 3).unwrap_or_else(|_| unreachable!());
        let held = LeaseDraft::new("slot-1", "run-7-1", 7200)
            .unwrap_or_else(|_| unreachable!())
            .into_lease("ci", now - Duration::minutes(30));
        let expired = LeaseDraft::new("slot-2", "run-3-1", 7200)
            .unwrap_or_else(|_| unreachable!())
            .into_lease("ci", now - Duration::hours(3));
        let stray = LeaseDraft::new("slot-9", "run-old", 7200)
            .unwrap_or_else(|_| unreachable!())
            .into_lease("ci", now);

        let status = PoolStatus::from_leases(&pool, vec![held, expired, stray], now);
        let rendered = render_status(&status);

        assert!(
            rendered
                .lines()
                .any(|line| line.starts_with("slot-0") && line.contains("free"))
        );
        assert!(rendered.contains("run-7-1"));
        assert!(rendered.contains("1h30m"));
        assert!(rendered.contains("expired"));
        assert!(rendered.contains("3 slots, 2 held, 1 free"));
        assert!(rendered.contains("outside pool: slot-9 held by 'run-old'"));
    }

    #[test]
    fn reclaim_summary_names_reasons_and_failures() {
        let lease = LeaseDraft::new("slot-0", "run-1", 60)
            .unwrap_or_else(|_| unreachable!())
            .into_lease("ci", Utc::now() - Duration::hours(1));
        let report = ReclaimReport {
            scanned: 2,
            reclaimed: vec![ReclaimedLease {
                lease,
                reason: StaleReason::Expired,
            }],
            failed: vec![("slot-1".to_owned(), "forbidden".to_owned())],
        };

        let rendered = render_reclaim_report(&report);

        assert!(rendered.contains("reclaimed slot-0 (expired, holder 'run-1')"));
        assert!(rendered.contains("failed slot-1: forbidden"));
        assert!(rendered.ends_with("scanned 2, reclaimed 1, failed 1\n"));
    }

    #[test]
    fn capacity_rendering_reflects_admission() {
        let report = CapacityReport {
            decision: CapacityDecision::Insufficient,
            snapshot: CapacitySnapshot::default(),
            required: ResourceQuantity::new(4000, 0),
        };

        assert!(
            render_capacity(&CapacityAdmission::AdmittedWithShortfall(report))
                .starts_with("insufficient (advisory)")
        );
        assert_eq!(
            render_capacity(&CapacityAdmission::AdmittedUnchecked {
                reason: "timeout".to_owned()
            }),
            "unchecked: timeout\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn child_status_keeps_codes_and_maps_signals_above_128() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        assert_eq!(child_exit_status(ExitStatus::from_raw(0)), 0);
        assert_eq!(child_exit_status(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(child_exit_status(ExitStatus::from_raw(9)), 137);
        assert_eq!(child_exit_status(ExitStatus::from_raw(15)), 143);
    }

    #[test]
    fn remaining_time_is_clamped_and_formatted() {
        assert_eq!(format_remaining(Duration::minutes(125)), "2h05m");
        assert_eq!(format_remaining(Duration::minutes(-5)), "0h00m");
    }
}
