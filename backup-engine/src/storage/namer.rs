//! Artifact naming.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/
//!   <hostname>/
//!     <hostname>-<YYYY_MM_DD-HH_MM_SS>.txt    # artifact
//!     <hostname>-<YYYY_MM_DD-HH_MM_SS>.diff   # change record for that artifact
//! ```
//!
//! Everything here is a pure function of its inputs; no I/O.

use crate::timestamp::RunTimestamp;
use std::path::{Path, PathBuf};

pub const ARTIFACT_EXTENSION: &str = "txt";
pub const CHANGE_RECORD_EXTENSION: &str = "diff";

#[derive(Debug, Clone)]
pub struct ArtifactNamer {
    root: PathBuf,
}

impl ArtifactNamer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Partition directory holding every file of `hostname`.
    pub fn partition(&self, hostname: &str) -> PathBuf {
        self.root.join(hostname)
    }

    /// Storage path of the artifact taken at `timestamp`.
    ///
    /// `hostname` must satisfy [`crate::device::is_safe_hostname`]; the
    /// inventory loader enforces this.
    pub fn path(&self, hostname: &str, timestamp: &RunTimestamp) -> PathBuf {
        self.partition(hostname).join(file_name(hostname, timestamp))
    }
}

pub fn file_name(hostname: &str, timestamp: &RunTimestamp) -> String {
    format!("{}-{}.{}", hostname, timestamp.label(), ARTIFACT_EXTENSION)
}

/// Whether `file_name` has the shape of an artifact of `hostname`,
/// regardless of whether its timestamp parses.
pub fn is_artifact_name(hostname: &str, file_name: &str) -> bool {
    timestamp_part(hostname, file_name).is_some()
}

/// Recover the timestamp from an artifact file name of `hostname`.
pub fn parse(hostname: &str, file_name: &str) -> Option<RunTimestamp> {
    timestamp_part(hostname, file_name).and_then(RunTimestamp::parse_label)
}

fn timestamp_part<'a>(hostname: &str, file_name: &'a str) -> Option<&'a str> {
    file_name
        .strip_prefix(hostname)?
        .strip_prefix('-')?
        .strip_suffix(ARTIFACT_EXTENSION)?
        .strip_suffix('.')
}

/// Change-record path for an artifact: same base name, `.diff` suffix.
pub fn change_record_path(artifact: &Path) -> PathBuf {
    artifact.with_extension(CHANGE_RECORD_EXTENSION)
}
