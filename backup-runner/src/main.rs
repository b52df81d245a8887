//! Backup Runner - fleet configuration backups from the command line.
//!
//! One-shot by default: back up every device in the inventory, print the
//! report and exit non-zero when any device failed. With a cron schedule the
//! runner stays resident until SIGINT/SIGTERM.

mod report;
mod scheduler;
mod utils;

use anyhow::Context;
use backup_engine::session::ssh::SshConnector;
use backup_engine::{inventory, EngineConfig, FleetCoordinator};
use clap::Parser;
use report::ReportSink;
use scheduler::{FleetJob, FleetScheduler};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Inventory CSV (overrides config)
    #[arg(short, long, value_name = "FILE")]
    inventory: Option<PathBuf>,

    /// Backup root directory (overrides config)
    #[arg(long, value_name = "DIR")]
    storage_root: Option<PathBuf>,

    /// Maximum devices backed up at once, 0 for unbounded
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-device timeout in seconds, 0 for none
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Cron expression; run resident on this schedule
    #[arg(long)]
    schedule: Option<String>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Also write the JSON run report to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(path) = &self.inventory {
            config.inventory.path = path.clone();
        }
        if let Some(root) = &self.storage_root {
            config.storage.root = root.clone();
        }
        if let Some(n) = self.concurrency {
            config.run.max_concurrency = n;
        }
        if let Some(secs) = self.timeout_secs {
            config.run.device_timeout_secs = secs;
        }
        if let Some(cron) = &self.schedule {
            config.schedule.cron = Some(cron.clone());
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate()?;

    utils::logger::init(&config.log.level)?;
    tracing::info!("Starting backup-runner v{}", env!("CARGO_PKG_VERSION"));

    let connector = Arc::new(SshConnector::new(&config.session));
    let coordinator = FleetCoordinator::new(&config, connector);
    let sink = ReportSink {
        json: args.json,
        path: args.report.clone(),
    };

    if let Some(cron) = config.schedule.cron.clone() {
        run_scheduled(config, coordinator, sink, &cron).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let devices = inventory::load_from_config(&config).context("Failed to load inventory")?;
    let report = coordinator.run(devices).await;
    sink.emit(&report)?;

    if report.has_failures() {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn run_scheduled(
    config: EngineConfig,
    coordinator: FleetCoordinator,
    sink: ReportSink,
    cron: &str,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let job = Arc::new(FleetJob::new(config, coordinator, sink, cancel.clone()));

    let scheduler = FleetScheduler::new(job).await?;
    scheduler
        .schedule(cron)
        .await
        .with_context(|| format!("Invalid schedule {cron:?}"))?;
    scheduler.start().await?;

    shutdown_signal(cancel).await;

    tracing::info!("Shutting down...");
    scheduler.shutdown().await?;
    tracing::info!("Runner stopped");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_override_config() {
        let args = Args::parse_from([
            "backup-runner",
            "--inventory",
            "fleet.csv",
            "--storage-root",
            "/srv/backups",
            "--concurrency",
            "4",
            "--timeout-secs",
            "0",
            "--schedule",
            "0 0 2 * * *",
            "--json",
            "--log-level",
            "debug",
        ]);
        let mut config = EngineConfig::default();
        args.apply(&mut config);

        assert_eq!(config.inventory.path, PathBuf::from("fleet.csv"));
        assert_eq!(config.storage.root, PathBuf::from("/srv/backups"));
        assert_eq!(config.run.max_concurrency, 4);
        assert_eq!(config.device_timeout(), None);
        assert_eq!(config.schedule.cron.as_deref(), Some("0 0 2 * * *"));
        assert_eq!(config.log.level, "debug");
        assert!(args.json);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let args = Args::parse_from(["backup-runner"]);
        let mut config = EngineConfig::default();
        config.run.max_concurrency = 3;
        args.apply(&mut config);
        assert_eq!(config.run.max_concurrency, 3);
        assert!(config.schedule.cron.is_none());
    }
}
