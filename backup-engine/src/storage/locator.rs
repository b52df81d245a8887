//! Previous-version discovery.
//!
//! The partition's directory listing is the index: artifact file names carry
//! their timestamps, so the predecessor of an artifact is the entry with the
//! greatest timestamp strictly older than its own.

use super::namer::{self, ArtifactNamer};
use crate::timestamp::RunTimestamp;
use crate::utils::errors::{LocateError, LocateWarning};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Result of a lookup: the predecessor, if any, plus skipped entries.
#[derive(Debug, Default)]
pub struct Located {
    pub previous: Option<PathBuf>,
    pub warnings: Vec<LocateWarning>,
}

/// One parsed artifact entry of a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub timestamp: RunTimestamp,
    pub file_name: String,
    pub path: PathBuf,
}

/// Finds the artifact preceding a freshly written one.
pub trait VersionLocator: Send + Sync {
    fn find_previous(&self, hostname: &str, current: &Path) -> Result<Located, LocateError>;
}

/// Directory-scan locator over the [`ArtifactNamer`] layout.
#[derive(Debug, Clone)]
pub struct FsVersionLocator {
    namer: ArtifactNamer,
}

impl FsVersionLocator {
    pub fn new(namer: ArtifactNamer) -> Self {
        Self { namer }
    }
}

impl VersionLocator for FsVersionLocator {
    fn find_previous(&self, hostname: &str, current: &Path) -> Result<Located, LocateError> {
        let partition = self.namer.partition(hostname);
        let (entries, warnings) = list_artifacts(&partition, hostname)?;

        let current_name = current.file_name().and_then(|n| n.to_str());
        let current_ts = current_name.and_then(|n| namer::parse(hostname, n));

        let previous = entries
            .into_iter()
            .filter(|e| Some(e.file_name.as_str()) != current_name)
            .filter(|e| current_ts.map_or(true, |ts| e.timestamp < ts))
            // Equal timestamps cannot come from the namer; fall back to the name.
            .max_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.file_name.cmp(&b.file_name))
            })
            .map(|e| e.path);

        Ok(Located { previous, warnings })
    }
}

/// Parse every artifact of `hostname` in `partition`.
///
/// Entries that are not artifacts of this host (change records, stray files)
/// are ignored silently; artifact-shaped names whose timestamp does not parse
/// are skipped with a warning.
pub fn list_artifacts(
    partition: &Path,
    hostname: &str,
) -> Result<(Vec<ArtifactEntry>, Vec<LocateWarning>), LocateError> {
    let read_dir = fs::read_dir(partition).map_err(|source| LocateError {
        path: partition.to_path_buf(),
        source,
    })?;

    let listing = read_dir.map(|entry| entry.map(|e| (e.file_name(), e.path())));
    Ok(scan_entries(listing, hostname))
}

fn scan_entries<I>(listing: I, hostname: &str) -> (Vec<ArtifactEntry>, Vec<LocateWarning>)
where
    I: IntoIterator<Item = io::Result<(OsString, PathBuf)>>,
{
    let mut entries = Vec::new();
    let mut warnings = Vec::new();

    for item in listing {
        let (os_name, path) = match item {
            Ok(entry) => entry,
            Err(e) => {
                warn!(hostname, error = %e, "Skipping unreadable entry");
                warnings.push(LocateWarning::UnreadableEntry(e.to_string()));
                continue;
            }
        };
        let Some(file_name) = os_name.to_str() else {
            let lossy = os_name.to_string_lossy().to_string();
            if lossy.starts_with(hostname) {
                warn!(hostname, entry = %lossy, "Skipping non UTF-8 entry");
                warnings.push(LocateWarning::NonUtf8Name(lossy));
            }
            continue;
        };

        if !namer::is_artifact_name(hostname, file_name) {
            continue;
        }

        match namer::parse(hostname, file_name) {
            Some(timestamp) => entries.push(ArtifactEntry {
                timestamp,
                file_name: file_name.to_string(),
                path,
            }),
            None => {
                warn!(hostname, file_name, "Skipping artifact with unparseable timestamp");
                warnings.push(LocateWarning::UnparseableName {
                    file_name: file_name.to_string(),
                });
            }
        }
    }

    (entries, warnings)
}
