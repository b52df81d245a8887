//! Artifact persistence.

use crate::utils::errors::WriteError;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Write `content` to `path`, creating the partition directory first.
///
/// An existing file at `path` is replaced; under one timestamp per run that
/// only happens when two runs start within the same second.
pub fn write_artifact(path: &Path, content: &str) -> Result<(), WriteError> {
    if let Some(partition) = path.parent() {
        fs::create_dir_all(partition).map_err(|source| WriteError::CreatePartition {
            path: partition.to_path_buf(),
            source,
        })?;
    }

    fs::write(path, content).map_err(|source| WriteError::WriteArtifact {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), bytes = content.len(), "Artifact written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_partition() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("router1/router1-2026_10_18-09_00_00.txt");

        write_artifact(&path, "hostname router1\n").unwrap();
        assert_eq!(fs::read_to_string(&path)?, "hostname router1\n");

        // Partition already present.
        let second = temp_dir.path().join("router1/router1-2026_10_18-10_00_00.txt");
        write_artifact(&second, "hostname router1\n").unwrap();
        assert!(second.exists());
        Ok(())
    }

    #[test]
    fn test_overwrites_same_path() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("r1/r1-2026_10_18-09_00_00.txt");

        write_artifact(&path, "old").unwrap();
        write_artifact(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path)?, "new");
        Ok(())
    }

    #[test]
    fn test_partition_blocked_by_file() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("r1"), b"not a directory")?;

        let err = write_artifact(&temp_dir.path().join("r1/r1-x.txt"), "config").unwrap_err();
        assert!(matches!(err, WriteError::CreatePartition { .. }));
        Ok(())
    }
}
