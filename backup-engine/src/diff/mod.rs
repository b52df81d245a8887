//! Change detection between consecutive artifacts of one device.

pub mod lines;

use crate::storage::namer::change_record_path;
use crate::utils::errors::DiffError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome of comparing an artifact with its predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    NoChange {
        previous: PathBuf,
        current: PathBuf,
    },
    Changed {
        previous: PathBuf,
        current: PathBuf,
        /// `---`/`+++` headers followed by unified hunks
        lines: Vec<String>,
    },
}

impl ChangeRecord {
    pub fn is_changed(&self) -> bool {
        matches!(self, ChangeRecord::Changed { .. })
    }

    pub fn current(&self) -> &Path {
        match self {
            ChangeRecord::NoChange { current, .. } | ChangeRecord::Changed { current, .. } => current,
        }
    }

    /// Where this record is persisted: next to the current artifact.
    pub fn record_path(&self) -> PathBuf {
        change_record_path(self.current())
    }

    /// Text written to the change-record file.
    pub fn render(&self) -> String {
        match self {
            ChangeRecord::NoChange { previous, current } => format!(
                "{} contains 0 changes compared to {}\n",
                display_name(current),
                display_name(previous)
            ),
            ChangeRecord::Changed {
                previous,
                current,
                lines,
            } => {
                let mut out = format!(
                    "{} contains the following changes compared to {}:\n",
                    display_name(current),
                    display_name(previous)
                );
                for line in lines {
                    out.push_str(line);
                    out.push('\n');
                }
                out
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Computes and persists change records.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    context_lines: usize,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self { context_lines: 3 }
    }
}

impl DiffEngine {
    pub fn new(context_lines: usize) -> Self {
        Self { context_lines }
    }

    /// Compare two artifacts without touching storage.
    ///
    /// Byte-identical files short-circuit to `NoChange`. Files whose line
    /// sequences are equal (differing only in the final line terminator or
    /// CRLF vs LF) are also `NoChange`, so a `Changed` record is never empty.
    pub fn compare(&self, previous: &Path, current: &Path) -> Result<ChangeRecord, DiffError> {
        let old = read(previous)?;
        let new = read(current)?;

        let unchanged = || ChangeRecord::NoChange {
            previous: previous.to_path_buf(),
            current: current.to_path_buf(),
        };

        if old == new {
            return Ok(unchanged());
        }

        let old_text = String::from_utf8_lossy(&old);
        let new_text = String::from_utf8_lossy(&new);
        let hunks = lines::unified_hunks(
            &lines::split_lines(&old_text),
            &lines::split_lines(&new_text),
            self.context_lines,
        );
        if hunks.is_empty() {
            return Ok(unchanged());
        }

        let mut diff_lines = Vec::with_capacity(hunks.len() + 2);
        diff_lines.push(format!("--- {}", display_name(previous)));
        diff_lines.push(format!("+++ {}", display_name(current)));
        diff_lines.extend(hunks);

        Ok(ChangeRecord::Changed {
            previous: previous.to_path_buf(),
            current: current.to_path_buf(),
            lines: diff_lines,
        })
    }

    /// Compare and persist the record next to `current`, replacing any
    /// earlier record for the same artifact.
    pub fn diff(&self, previous: &Path, current: &Path) -> Result<ChangeRecord, DiffError> {
        let record = self.compare(previous, current)?;
        let path = record.record_path();
        fs::write(&path, record.render()).map_err(|source| DiffError::Persist {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), changed = record.is_changed(), "Change record written");
        Ok(record)
    }
}

fn read(path: &Path) -> Result<Vec<u8>, DiffError> {
    fs::read(path).map_err(|source| DiffError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifacts(dir: &TempDir, old: &str, new: &str) -> (PathBuf, PathBuf) {
        let previous = dir.path().join("r1-2026_10_18-09_00_00.txt");
        let current = dir.path().join("r1-2026_10_18-10_00_00.txt");
        fs::write(&previous, old).unwrap();
        fs::write(&current, new).unwrap();
        (previous, current)
    }

    #[test]
    fn test_identical_artifacts() {
        let dir = TempDir::new().unwrap();
        let (previous, current) = artifacts(&dir, "hostname r1\n", "hostname r1\n");

        let record = DiffEngine::default().diff(&previous, &current).unwrap();
        assert!(matches!(record, ChangeRecord::NoChange { .. }));

        let written = fs::read_to_string(dir.path().join("r1-2026_10_18-10_00_00.diff")).unwrap();
        assert_eq!(
            written,
            "r1-2026_10_18-10_00_00.txt contains 0 changes compared to r1-2026_10_18-09_00_00.txt\n"
        );
    }

    #[test]
    fn test_one_line_changed() {
        let dir = TempDir::new().unwrap();
        let (previous, current) = artifacts(
            &dir,
            "hostname r1\nntp server 10.0.0.1\nend\n",
            "hostname r1\nntp server 10.0.0.2\nend\n",
        );

        let record = DiffEngine::default().diff(&previous, &current).unwrap();
        let ChangeRecord::Changed { lines, .. } = &record else {
            panic!("expected a change, got {:?}", record);
        };
        let removed: Vec<&String> = lines.iter().filter(|l| l.starts_with('-') && !l.starts_with("---")).collect();
        let added: Vec<&String> = lines.iter().filter(|l| l.starts_with('+') && !l.starts_with("+++")).collect();
        assert_eq!(removed, vec!["-ntp server 10.0.0.1"]);
        assert_eq!(added, vec!["+ntp server 10.0.0.2"]);
        assert_eq!(lines[0], "--- r1-2026_10_18-09_00_00.txt");
        assert_eq!(lines[1], "+++ r1-2026_10_18-10_00_00.txt");
    }

    #[test]
    fn test_terminator_only_difference_is_no_change() {
        let dir = TempDir::new().unwrap();
        let (previous, current) = artifacts(&dir, "a\r\nb\r\n", "a\nb");
        let record = DiffEngine::default().compare(&previous, &current).unwrap();
        assert!(!record.is_changed());
    }

    #[test]
    fn test_diff_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (previous, current) = artifacts(&dir, "A\nB\nC\n", "A\nX\nC\nD\n");
        let engine = DiffEngine::default();

        let first = engine.diff(&previous, &current).unwrap();
        let first_text = fs::read_to_string(first.record_path()).unwrap();
        let second = engine.diff(&previous, &current).unwrap();
        let second_text = fs::read_to_string(second.record_path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_text, second_text);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let (previous, current) = artifacts(&dir, "A\n", "B\n");
        fs::remove_file(&previous).unwrap();

        let err = DiffEngine::default().diff(&previous, &current).unwrap_err();
        assert!(matches!(err, DiffError::Read { .. }));
        assert!(!current.with_extension("diff").exists());
    }
}
