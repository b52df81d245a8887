//! Run timestamps.
//!
//! One `RunTimestamp` is taken per run and shared by every device, so all
//! artifacts of a run sort together. The file-name form is zero padded
//! `YYYY_MM_DD-HH_MM_SS` in UTC: lexicographic order equals chronological
//! order, and parsing it back yields the same instant.
//!
//! Two runs started within the same second produce the same label; the
//! later run then overwrites the earlier run's artifacts.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const FILENAME_FORMAT: &str = "%Y_%m_%d-%H_%M_%S";

/// Serialized length of [`FILENAME_FORMAT`].
pub const FILENAME_LEN: usize = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunTimestamp(DateTime<Utc>);

impl RunTimestamp {
    /// Current instant truncated to whole seconds.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.trunc_subsecs(0))
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Filename-safe label, e.g. `2026_10_18-09_30_00`.
    pub fn label(&self) -> String {
        self.0.format(FILENAME_FORMAT).to_string()
    }

    /// Inverse of [`label`](Self::label). Rejects anything but the exact format.
    pub fn parse_label(label: &str) -> Option<Self> {
        if label.len() != FILENAME_LEN {
            return None;
        }
        NaiveDateTime::parse_from_str(label, FILENAME_FORMAT)
            .ok()
            .map(|naive| Self(naive.and_utc()))
    }
}

impl fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
