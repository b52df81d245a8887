//! Per-device retention: keep the newest N artifacts of a partition.

use super::locator::list_artifacts;
use super::namer::{change_record_path, ArtifactNamer};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Delete all but the newest `keep` artifacts of `hostname`, along with their
/// change records. Returns the removed artifact paths.
///
/// Problems are reported as warning strings; pruning never fails a device.
pub fn prune(namer: &ArtifactNamer, hostname: &str, keep: usize) -> (Vec<PathBuf>, Vec<String>) {
    let mut warnings = Vec::new();
    if keep == 0 {
        return (Vec::new(), warnings);
    }

    let (mut entries, _) = match list_artifacts(&namer.partition(hostname), hostname) {
        Ok(listed) => listed,
        Err(e) => {
            warnings.push(format!("retention skipped: {}", e));
            return (Vec::new(), warnings);
        }
    };

    // Newest first.
    entries.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.file_name.cmp(&a.file_name))
    });

    let mut removed = Vec::new();
    for old in entries.into_iter().skip(keep) {
        match fs::remove_file(&old.path) {
            Ok(()) => {
                let record = change_record_path(&old.path);
                if record.exists() {
                    if let Err(e) = fs::remove_file(&record) {
                        warnings.push(format!("cannot remove {}: {}", record.display(), e));
                    }
                }
                info!(hostname, file = %old.file_name, "Removed old backup");
                removed.push(old.path);
            }
            Err(e) => {
                warn!(hostname, file = %old.file_name, error = %e, "Failed to remove old backup");
                warnings.push(format!("cannot remove {}: {}", old.path.display(), e));
            }
        }
    }

    (removed, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::RunTimestamp;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn ts(minute: u32) -> RunTimestamp {
        RunTimestamp::from_datetime(Utc.with_ymd_and_hms(2026, 10, 18, 9, minute, 0).unwrap())
    }

    #[test]
    fn test_keeps_newest() {
        let temp_dir = TempDir::new().unwrap();
        let namer = ArtifactNamer::new(temp_dir.path());
        fs::create_dir_all(namer.partition("r1")).unwrap();

        let paths: Vec<PathBuf> = (0..5).map(|m| namer.path("r1", &ts(m))).collect();
        for p in &paths {
            fs::write(p, "cfg").unwrap();
            fs::write(change_record_path(p), "diff").unwrap();
        }

        let (removed, warnings) = prune(&namer, "r1", 2);
        assert!(warnings.is_empty());
        assert_eq!(removed.len(), 3);

        for p in &paths[..3] {
            assert!(!p.exists());
            assert!(!change_record_path(p).exists());
        }
        for p in &paths[3..] {
            assert!(p.exists());
            assert!(change_record_path(p).exists());
        }
    }

    #[test]
    fn test_zero_keeps_everything() {
        let temp_dir = TempDir::new().unwrap();
        let namer = ArtifactNamer::new(temp_dir.path());
        fs::create_dir_all(namer.partition("r1")).unwrap();
        let p = namer.path("r1", &ts(0));
        fs::write(&p, "cfg").unwrap();

        let (removed, _) = prune(&namer, "r1", 0);
        assert!(removed.is_empty());
        assert!(p.exists());
    }
}
