//! Resident mode: run the whole fleet on a cron schedule.

use crate::report::ReportSink;
use backup_engine::{inventory, EngineConfig, FleetCoordinator, RunReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

/// Set while a fleet run is in progress. At most one holder at a time.
#[derive(Debug, Default)]
pub struct RunGuard(AtomicBool);

/// Held for the duration of one run; releases the guard on drop.
pub struct RunPermit<'a>(&'a RunGuard);

impl RunGuard {
    pub fn try_begin(&self) -> Option<RunPermit<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit(self))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        (self.0).0.store(false, Ordering::Release);
    }
}

/// One scheduled fleet run. The inventory is reloaded on every tick.
pub struct FleetJob {
    config: EngineConfig,
    coordinator: FleetCoordinator,
    sink: ReportSink,
    guard: RunGuard,
    cancel: CancellationToken,
}

impl FleetJob {
    pub fn new(
        config: EngineConfig,
        coordinator: FleetCoordinator,
        sink: ReportSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            coordinator,
            sink,
            guard: RunGuard::default(),
            cancel,
        }
    }

    /// Run the fleet unless a run is already active or shutdown has begun.
    pub async fn tick(&self) -> Option<RunReport> {
        if self.cancel.is_cancelled() {
            tracing::info!("Skipping scheduled run: shutting down");
            return None;
        }
        let Some(_permit) = self.guard.try_begin() else {
            tracing::warn!("Skipping scheduled run: previous run still in progress");
            return None;
        };

        let devices = match inventory::load_from_config(&self.config) {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load inventory, skipping run");
                return None;
            }
        };

        let report = self.coordinator.run(devices).await;
        let summary = report.summary();
        tracing::info!(
            run_id = %report.run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            changed = summary.changed,
            "Scheduled run finished"
        );
        if let Err(e) = self.sink.emit(&report) {
            tracing::error!(error = %e, "Failed to emit report");
        }
        Some(report)
    }

    /// Wait for an in-flight run to finish.
    pub async fn wait_idle(&self) {
        while self.guard.is_running() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

pub struct FleetScheduler {
    scheduler: Mutex<JobScheduler>,
    job: Arc<FleetJob>,
}

impl FleetScheduler {
    pub async fn new(job: Arc<FleetJob>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            job,
        })
    }

    pub async fn schedule(&self, cron_expression: &str) -> anyhow::Result<()> {
        let fleet_job = self.job.clone();
        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let fleet_job = fleet_job.clone();
            Box::pin(async move {
                tracing::info!("Starting scheduled fleet backup");
                fleet_job.tick().await;
            })
        })?;

        self.scheduler.lock().await.add(job).await?;
        tracing::info!(cron = %cron_expression, "Fleet backup scheduled");
        Ok(())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    /// Stop firing ticks, then let a running fleet backup complete.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        self.job.wait_idle().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_admits_one_run() {
        let guard = RunGuard::default();
        let first = guard.try_begin();
        assert!(first.is_some());
        assert!(guard.try_begin().is_none());
        assert!(guard.is_running());

        drop(first);
        assert!(!guard.is_running());
        assert!(guard.try_begin().is_some());
    }

    fn job(dir: &std::path::Path, cancel: CancellationToken) -> FleetJob {
        let mut config = EngineConfig::default();
        config.storage.root = dir.join("backups");
        config.inventory.path = dir.join("inventory.csv");
        let coordinator = FleetCoordinator::new(
            &config,
            Arc::new(backup_engine::session::ssh::SshConnector::new(&config.session)),
        );
        FleetJob::new(config, coordinator, ReportSink::default(), cancel)
    }

    #[tokio::test]
    async fn test_tick_skips_after_cancel() {
        let dir = tempfile::TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let job = job(dir.path(), cancel.clone());
        cancel.cancel();
        assert!(job.tick().await.is_none());
    }

    #[tokio::test]
    async fn test_tick_skips_while_running() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("inventory.csv"), "ip,hostname\n").unwrap();
        let job = job(dir.path(), CancellationToken::new());

        let permit = job.guard.try_begin();
        assert!(job.tick().await.is_none());
        drop(permit);

        let report = job.tick().await.unwrap();
        assert!(report.outcomes.is_empty());
        assert!(!job.guard.is_running());
    }

    #[tokio::test]
    async fn test_tick_without_inventory_is_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let job = job(dir.path(), CancellationToken::new());
        assert!(job.tick().await.is_none());
        assert!(!job.guard.is_running());
    }

    #[tokio::test]
    async fn test_invalid_cron_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let job = Arc::new(job(dir.path(), CancellationToken::new()));
        let scheduler = FleetScheduler::new(job).await.unwrap();
        assert!(scheduler.schedule("not a cron line").await.is_err());
    }
}
