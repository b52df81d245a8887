//! Per-device outcomes and the run report.

use crate::timestamp::RunTimestamp;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Worker pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Stage {
    Connecting = 0,
    Fetching = 1,
    Writing = 2,
    Locating = 3,
    Diffing = 4,
    Done = 5,
}

impl Stage {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Stage::Connecting,
            1 => Stage::Fetching,
            2 => Stage::Writing,
            3 => Stage::Locating,
            4 => Stage::Diffing,
            _ => Stage::Done,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Connecting => "connecting",
            Stage::Fetching => "fetching",
            Stage::Writing => "writing",
            Stage::Locating => "locating",
            Stage::Diffing => "diffing",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful backup found when compared with its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeStatus {
    /// No earlier artifact exists; nothing was compared.
    FirstBackup,
    Unchanged,
    Changed,
    /// The artifact was saved but locating or diffing failed (see warnings).
    Undetermined,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::FirstBackup => "first-backup",
            ChangeStatus::Unchanged => "unchanged",
            ChangeStatus::Changed => "changed",
            ChangeStatus::Undetermined => "undetermined",
        }
    }
}

/// Why a device failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureCause {
    Connect(String),
    Fetch(String),
    Write(String),
    /// The coordinator stopped waiting for the worker.
    Timeout(String),
    /// The worker panicked.
    Panicked(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Connect(m) => write!(f, "connect failed: {}", m),
            FailureCause::Fetch(m) => write!(f, "fetch failed: {}", m),
            FailureCause::Write(m) => write!(f, "write failed: {}", m),
            FailureCause::Timeout(m) => write!(f, "timed out: {}", m),
            FailureCause::Panicked(m) => write!(f, "worker panicked: {}", m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success {
        change: ChangeStatus,
        artifact: PathBuf,
        change_record: Option<PathBuf>,
        warnings: Vec<String>,
    },
    Failed {
        stage: Stage,
        cause: FailureCause,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceOutcome {
    pub hostname: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl DeviceOutcome {
    pub fn failed(hostname: impl Into<String>, stage: Stage, cause: FailureCause) -> Self {
        Self {
            hostname: hostname.into(),
            status: OutcomeStatus::Failed { stage, cause },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }

    pub fn change(&self) -> Option<ChangeStatus> {
        match &self.status {
            OutcomeStatus::Success { change, .. } => Some(*change),
            OutcomeStatus::Failed { .. } => None,
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.status {
            OutcomeStatus::Failed { stage, .. } => Some(*stage),
            OutcomeStatus::Success { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub devices: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub changed: usize,
    pub warnings: usize,
}

/// Every device's outcome for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub timestamp: RunTimestamp,
    pub outcomes: Vec<DeviceOutcome>,
}

impl RunReport {
    pub fn new(timestamp: RunTimestamp, outcomes: Vec<DeviceOutcome>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            timestamp,
            outcomes,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| !o.is_success())
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            devices: self.outcomes.len(),
            ..Default::default()
        };
        for outcome in &self.outcomes {
            match &outcome.status {
                OutcomeStatus::Success { change, warnings, .. } => {
                    summary.succeeded += 1;
                    summary.warnings += warnings.len();
                    if *change == ChangeStatus::Changed {
                        summary.changed += 1;
                    }
                }
                OutcomeStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    /// One line per device plus a totals line.
    pub fn render_text(&self) -> String {
        let width = self
            .outcomes
            .iter()
            .map(|o| o.hostname.len())
            .max()
            .unwrap_or(0)
            .max("HOSTNAME".len());

        let mut out = format!("Run {} at {}\n", self.run_id, self.timestamp);
        out.push_str(&format!("{:<width$}  RESULT\n", "HOSTNAME"));
        for outcome in &self.outcomes {
            let result = match &outcome.status {
                OutcomeStatus::Success { change, warnings, .. } if warnings.is_empty() => {
                    format!("ok ({})", change.as_str())
                }
                OutcomeStatus::Success { change, warnings, .. } => {
                    format!("ok ({}), warnings: {}", change.as_str(), warnings.join("; "))
                }
                OutcomeStatus::Failed { stage, cause } => format!("FAILED at {}: {}", stage, cause),
            };
            out.push_str(&format!("{:<width$}  {}\n", outcome.hostname, result));
        }

        let s = self.summary();
        out.push_str(&format!(
            "{} devices: {} succeeded ({} changed), {} failed\n",
            s.devices, s.succeeded, s.changed, s.failed
        ));
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the JSON form to `path`.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
