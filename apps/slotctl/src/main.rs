//! Slot admission control for CI runs sharing expensive infrastructure.

#![forbid(unsafe_code)]

mod shutdown;
mod slotctl_commands;
mod slotctl_config;
mod slotctl_services;

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use slotgate_core::AppResult;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::slotctl_commands::exit_status_for;
use crate::slotctl_config::SlotctlConfig;
use crate::slotctl_services::SlotctlServices;

/// Acquire, release and inspect capacity slots for CI runs.
#[derive(Parser, Debug)]
#[command(name = "slotctl", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reclaim stale leases, then wait for and acquire a free slot
    Acquire {
        /// Holder identity written into the lease
        #[arg(long)]
        holder: Option<String>,
    },
    /// Release the slot at INDEX; releasing a free slot succeeds
    Release {
        /// Slot index inside the pool
        index: u32,
    },
    /// Delete expired and orphaned leases once
    CleanupStale,
    /// Check whether the cluster can absorb one more test environment
    CheckCapacity {
        /// Cpu footprint override, e.g. 4 or 3500m
        #[arg(long)]
        cpu: Option<String>,
        /// Memory footprint override, e.g. 16Gi
        #[arg(long)]
        memory: Option<String>,
        /// Fail with exit code 3 on a shortfall
        #[arg(long)]
        strict: bool,
    },
    /// Show every slot and its holder
    Status {
        /// Re-render until interrupted
        #[arg(long)]
        watch: bool,
        /// Seconds between renders in watch mode
        #[arg(long, default_value_t = 10)]
        interval: u64,
    },
    /// Acquire a slot, run COMMAND, and release the slot on every exit path
    Run {
        /// Holder identity written into the lease
        #[arg(long)]
        holder: Option<String>,
        /// Command and arguments, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match execute(cli.command).await {
        Ok(code) => code,
        Err(error) => {
            error!(error = %error, "slotctl failed");
            ExitCode::from(exit_status_for(&error))
        }
    }
}

async fn execute(command: Command) -> AppResult<ExitCode> {
    let config = SlotctlConfig::load()?;

    match command {
        Command::Acquire { holder } => {
            let acquisition = build_services(&config)?.acquisition(&config)?;
            let holder = holder.unwrap_or_else(|| config.holder_identity.clone());
            slotctl_commands::acquire(&acquisition, holder.as_str()).await
        }
        Command::Release { index } => {
            slotctl_commands::release(&build_services(&config)?, index).await
        }
        Command::CleanupStale => {
            let reclaimer = build_services(&config)?.reclaimer(&config)?;
            slotctl_commands::cleanup_stale(&reclaimer).await
        }
        Command::CheckCapacity {
            cpu,
            memory,
            strict,
        } => {
            slotctl_commands::check_capacity(&config, cpu.as_deref(), memory.as_deref(), strict)
                .await
        }
        Command::Status { watch, interval } => {
            let services = build_services(&config)?;
            slotctl_commands::status(&services, watch, Duration::from_secs(interval.max(1))).await
        }
        Command::Run { holder, command } => {
            let coordinator = build_services(&config)?
                .acquisition(&config)?
                .coordinator(&config)?;
            let holder = holder.unwrap_or_else(|| config.holder_identity.clone());
            slotctl_commands::run_guarded(&coordinator, holder.as_str(), &command).await
        }
    }
}

fn build_services(config: &SlotctlConfig) -> AppResult<SlotctlServices> {
    info!(
        max_slots = config.max_slots,
        quota_guard_ceiling = ?config.quota_guard_ceiling,
        namespace = %config.namespace,
        backend = ?config.lease_backend,
        "slotctl configured"
    );

    SlotctlServices::build(config)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn run_takes_trailing_command_after_separator() {
        let cli = Cli::try_parse_from(["slotctl", "run", "--holder", "h1", "--", "make", "-j4"]);

        match cli.map(|cli| cli.command) {
            Ok(Command::Run { holder, command }) => {
                assert_eq!(holder.as_deref(), Some("h1"));
                assert_eq!(command, vec!["make".to_owned(), "-j4".to_owned()]);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn release_requires_an_index() {
        assert!(Cli::try_parse_from(["slotctl", "release"]).is_err());
        assert!(Cli::try_parse_from(["slotctl", "release", "1"]).is_ok());
    }
}
