//! Fleet-wide fan-out.
//!
//! One task per device, admitted through a semaphore sized by
//! `run.max_concurrency`. Each worker runs on the blocking pool; the
//! coordinator joins all of them and always returns one outcome per device,
//! in inventory order.

use crate::config::EngineConfig;
use crate::device::Device;
use crate::diff::DiffEngine;
use crate::outcome::{DeviceOutcome, FailureCause, RunReport, Stage};
use crate::session::DeviceConnector;
use crate::storage::{ArtifactNamer, FsVersionLocator, VersionLocator};
use crate::timestamp::RunTimestamp;
use crate::worker::{BackupPipeline, StageProbe};
use futures_util::future::join_all;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info};

pub struct FleetCoordinator {
    pipeline: Arc<BackupPipeline>,
    max_concurrency: usize,
    device_timeout: Option<Duration>,
}

impl FleetCoordinator {
    /// Coordinator over the filesystem layout rooted at `config.storage.root`.
    pub fn new(config: &EngineConfig, connector: Arc<dyn DeviceConnector>) -> Self {
        let namer = ArtifactNamer::new(&config.storage.root);
        let locator = Arc::new(FsVersionLocator::new(namer.clone()));
        Self::with_locator(config, connector, locator)
    }

    /// Same as [`new`](Self::new) with a different predecessor lookup.
    pub fn with_locator(
        config: &EngineConfig,
        connector: Arc<dyn DeviceConnector>,
        locator: Arc<dyn VersionLocator>,
    ) -> Self {
        let pipeline = BackupPipeline {
            connector,
            namer: ArtifactNamer::new(&config.storage.root),
            locator,
            diff: DiffEngine::new(config.diff.context_lines),
            keep_versions: config.storage.keep_versions,
        };
        Self {
            pipeline: Arc::new(pipeline),
            max_concurrency: config.run.max_concurrency,
            device_timeout: config.device_timeout(),
        }
    }

    /// Back up every device under a fresh run timestamp.
    pub async fn run(&self, devices: Vec<Device>) -> RunReport {
        let timestamp = RunTimestamp::now();
        let outcomes = self.run_at(devices, timestamp).await;
        RunReport::new(timestamp, outcomes)
    }

    /// Back up every device under `timestamp`. Waits for all devices.
    pub async fn run_at(&self, devices: Vec<Device>, timestamp: RunTimestamp) -> Vec<DeviceOutcome> {
        info!(
            devices = devices.len(),
            max_concurrency = self.max_concurrency,
            timestamp = %timestamp,
            "Starting fleet backup"
        );

        let semaphore = (self.max_concurrency > 0).then(|| Arc::new(Semaphore::new(self.max_concurrency)));
        let watched: Vec<(String, StageProbe)> = devices
            .iter()
            .map(|d| (d.hostname.clone(), StageProbe::new()))
            .collect();

        let tasks = devices.into_iter().zip(&watched).map(|(device, (_, probe))| {
            let pipeline = self.pipeline.clone();
            let semaphore = semaphore.clone();
            let device_timeout = self.device_timeout;
            let probe = probe.clone();
            tokio::spawn(async move {
                let permit = match semaphore {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                run_one(pipeline, device, timestamp, device_timeout, probe, permit).await
            })
        });

        let outcomes: Vec<DeviceOutcome> = join_all(tasks)
            .await
            .into_iter()
            .zip(watched)
            .map(|(joined, (hostname, probe))| match joined {
                Ok(outcome) => outcome,
                Err(e) => DeviceOutcome::failed(hostname, probe.current(), FailureCause::Panicked(e.to_string())),
            })
            .collect();

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(devices = outcomes.len(), failed, "Fleet backup finished");
        outcomes
    }
}

/// The permit moves into the blocking worker and is released only when the
/// worker returns, so a timed-out device keeps its slot while its session is
/// still open.
async fn run_one(
    pipeline: Arc<BackupPipeline>,
    device: Device,
    timestamp: RunTimestamp,
    device_timeout: Option<Duration>,
    probe: StageProbe,
    permit: Option<OwnedSemaphorePermit>,
) -> DeviceOutcome {
    let hostname = device.hostname.clone();
    let worker_probe = probe.clone();

    let mut handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        pipeline.run_device(&device, &timestamp, &worker_probe)
    });

    let joined = match device_timeout {
        Some(limit) => {
            let finished = tokio::time::timeout(limit, &mut handle).await.ok();
            match finished {
                Some(joined) => joined,
                // The worker committed just as the timer fired; its result stands.
                None if !probe.abandon() => handle.await,
                None => {
                    let stage = probe.current();
                    error!(hostname = %hostname, %stage, "Device timed out");
                    return DeviceOutcome::failed(
                        hostname,
                        stage,
                        FailureCause::Timeout(format!("no result after {}s", limit.as_secs_f32())),
                    );
                }
            }
        }
        None => handle.await,
    };

    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            let stage = probe.current();
            let message = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                e.to_string()
            };
            error!(hostname = %hostname, %stage, error = %message, "Worker panicked");
            DeviceOutcome::failed(hostname, stage, FailureCause::Panicked(message))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
