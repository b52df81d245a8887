//! Per-device backup pipeline.
//!
//! `Connecting → Fetching → Writing → Locating → Diffing → Done`, with any
//! stage able to end in `Failed(stage, cause)`. Failures of the locating and
//! diffing stages only add warnings: the backup itself is already on disk.
//! The session is closed right after fetching and, through [`SessionGuard`],
//! on every other exit path. A worker abandoned by the coordinator after a
//! timeout removes what it wrote and never prunes.

use crate::device::Device;
use crate::diff::DiffEngine;
use crate::outcome::{ChangeStatus, DeviceOutcome, FailureCause, OutcomeStatus, Stage};
use crate::session::{DeviceConnector, SessionGuard};
use crate::storage::{retention, write_artifact, ArtifactNamer, VersionLocator};
use crate::timestamp::RunTimestamp;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

const RUNNING: u8 = 0;
const ABANDONED: u8 = 1;
const COMMITTED: u8 = 2;

#[derive(Debug)]
struct ProbeState {
    stage: AtomicU8,
    fate: AtomicU8,
}

/// Shared between a worker and the coordinator waiting on it: the last stage
/// the worker entered, and whether its result still counts.
///
/// Exactly one of [`abandon`](Self::abandon) (coordinator, on timeout) and
/// the worker's commit succeeds. An abandoned worker leaves no artifact or
/// change record behind.
#[derive(Debug, Clone)]
pub struct StageProbe(Arc<ProbeState>);

impl StageProbe {
    pub fn new() -> Self {
        Self(Arc::new(ProbeState {
            stage: AtomicU8::new(Stage::Connecting as u8),
            fate: AtomicU8::new(RUNNING),
        }))
    }

    pub fn enter(&self, stage: Stage) {
        self.0.stage.store(stage as u8, Ordering::Release);
    }

    pub fn current(&self) -> Stage {
        Stage::from_u8(self.0.stage.load(Ordering::Acquire))
    }

    /// Give up on the worker. Returns false when it already committed its
    /// result, in which case that result stands.
    pub fn abandon(&self) -> bool {
        self.0
            .fate
            .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_abandoned(&self) -> bool {
        self.0.fate.load(Ordering::Acquire) == ABANDONED
    }

    fn commit(&self) -> bool {
        self.0
            .fate
            .compare_exchange(RUNNING, COMMITTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for StageProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a worker needs, shared read-only by all workers of a run.
pub struct BackupPipeline {
    pub connector: Arc<dyn DeviceConnector>,
    pub namer: ArtifactNamer,
    pub locator: Arc<dyn VersionLocator>,
    pub diff: DiffEngine,
    /// Artifacts kept per device (0 = all)
    pub keep_versions: usize,
}

impl BackupPipeline {
    /// Run the full pipeline for one device. Blocking.
    pub fn run_device(&self, device: &Device, timestamp: &RunTimestamp, probe: &StageProbe) -> DeviceOutcome {
        let hostname = device.hostname.as_str();

        probe.enter(Stage::Connecting);
        let session = match self.connector.open(device) {
            Ok(session) => session,
            Err(e) => {
                error!(hostname, address = %device.address, error = %e, "Connection failed");
                return DeviceOutcome::failed(hostname, Stage::Connecting, FailureCause::Connect(e.to_string()));
            }
        };
        let mut session = SessionGuard::new(session, hostname);

        probe.enter(Stage::Fetching);
        let fetched = session.fetch_running_config();
        session.close();
        let config = match fetched {
            Ok(config) => config,
            Err(e) => {
                error!(hostname, error = %e, "Failed to fetch running configuration");
                return DeviceOutcome::failed(hostname, Stage::Fetching, FailureCause::Fetch(e.to_string()));
            }
        };

        if probe.is_abandoned() {
            return self.abandoned(hostname, probe, &[]);
        }

        probe.enter(Stage::Writing);
        let artifact = self.namer.path(hostname, timestamp);
        if let Err(e) = write_artifact(&artifact, &config) {
            error!(hostname, error = %e, "Failed to write backup");
            return DeviceOutcome::failed(hostname, Stage::Writing, FailureCause::Write(e.to_string()));
        }
        info!(hostname, artifact = %artifact.display(), "Backup saved");

        probe.enter(Stage::Locating);
        let mut warnings = Vec::new();
        let previous = match self.locator.find_previous(hostname, &artifact) {
            Ok(located) => {
                warnings.extend(located.warnings.iter().map(|w| w.to_string()));
                Some(located.previous)
            }
            Err(e) => {
                warn!(hostname, error = %e, "Could not look up previous backup");
                warnings.push(e.to_string());
                None
            }
        };

        let (change, change_record) = match previous {
            None => (ChangeStatus::Undetermined, None),
            Some(None) => {
                info!(hostname, "First backup, nothing to compare");
                (ChangeStatus::FirstBackup, None)
            }
            Some(Some(_)) if probe.is_abandoned() => {
                return self.abandoned(hostname, probe, &[artifact.as_path()]);
            }
            Some(Some(previous)) => {
                probe.enter(Stage::Diffing);
                match self.diff.diff(&previous, &artifact) {
                    Ok(record) => {
                        let status = if record.is_changed() {
                            info!(hostname, previous = %previous.display(), "Configuration changed");
                            ChangeStatus::Changed
                        } else {
                            info!(hostname, previous = %previous.display(), "No configuration changes");
                            ChangeStatus::Unchanged
                        };
                        (status, Some(record.record_path()))
                    }
                    Err(e) => {
                        warn!(hostname, error = %e, "Diff failed");
                        warnings.push(e.to_string());
                        (ChangeStatus::Undetermined, None)
                    }
                }
            }
        };

        if !probe.commit() {
            let record = change_record.as_deref();
            let written: Vec<&Path> = std::iter::once(artifact.as_path()).chain(record).collect();
            return self.abandoned(hostname, probe, &written);
        }

        if self.keep_versions > 0 {
            let (_, retention_warnings) = retention::prune(&self.namer, hostname, self.keep_versions);
            warnings.extend(retention_warnings);
        }

        probe.enter(Stage::Done);
        DeviceOutcome {
            hostname: hostname.to_string(),
            status: OutcomeStatus::Success {
                change,
                artifact,
                change_record,
                warnings,
            },
        }
    }

    /// The coordinator stopped waiting: undo this run's writes and stop.
    fn abandoned(&self, hostname: &str, probe: &StageProbe, written: &[&Path]) -> DeviceOutcome {
        for path in written {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    error!(hostname, path = %path.display(), error = %e, "Failed to remove abandoned file");
                }
            }
        }
        let stage = probe.current();
        warn!(hostname, %stage, "Worker abandoned after timeout, storage left untouched");
        DeviceOutcome::failed(
            hostname,
            stage,
            FailureCause::Timeout("abandoned by the coordinator".into()),
        )
    }
}
