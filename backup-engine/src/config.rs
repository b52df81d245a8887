//! Configuration management for the backup engine.
//!
//! Loads configuration from a TOML file, then applies environment variable
//! overrides (a `.env` file in the working directory is honored).

use crate::utils::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub inventory: InventoryConfig,
    pub storage: StorageConfig,
    pub run: RunConfig,
    pub session: SessionConfig,
    pub diff: DiffConfig,
    pub log: LogConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// CSV file listing the devices
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding one partition per hostname
    pub root: PathBuf,

    /// Artifacts kept per device after each run (0 = keep everything)
    pub keep_versions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Devices processed at the same time (0 = unbounded)
    pub max_concurrency: usize,

    /// Seconds the coordinator waits for one device (0 = wait forever)
    pub device_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// SSH port used when the inventory row has none
    pub port: u16,

    pub connect_timeout_secs: u64,

    /// Applied to every blocking call on an open session
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Unchanged lines shown around each hunk
    pub context_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Cron expression (with seconds field); absent means run once
    pub cron: Option<String>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("inventory.csv"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("backups"),
            keep_versions: 0,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            device_timeout_secs: 120,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: 22,
            connect_timeout_secs: 10,
            command_timeout_secs: 60,
        }
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self { context_lines: 3 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file. Missing sections use defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from an optional file, then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BACKUP_INVENTORY") {
            self.inventory.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("BACKUP_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("BACKUP_KEEP_VERSIONS") {
            self.storage.keep_versions = parse_env("BACKUP_KEEP_VERSIONS", &v)?;
        }
        if let Some(v) = lookup("BACKUP_MAX_CONCURRENCY") {
            self.run.max_concurrency = parse_env("BACKUP_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("BACKUP_DEVICE_TIMEOUT_SECS") {
            self.run.device_timeout_secs = parse_env("BACKUP_DEVICE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(v) = lookup("BACKUP_SCHEDULE") {
            self.schedule.cron = if v.trim().is_empty() { None } else { Some(v) };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.root must not be empty".into()));
        }
        if self.inventory.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("inventory.path must not be empty".into()));
        }
        Ok(())
    }

    pub fn device_timeout(&self) -> Option<Duration> {
        match self.run.device_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.run.max_concurrency, 8);
        assert_eq!(config.session.port, 22);
        assert_eq!(config.diff.context_lines, 3);
        assert_eq!(config.device_timeout(), Some(Duration::from_secs(120)));
        assert!(config.schedule.cron.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<(), ConfigError> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.toml");
        std::fs::write(
            &path,
            "[storage]\nroot = \"/srv/configs\"\n\n[run]\ndevice_timeout_secs = 0\n",
        )
        .unwrap();

        let config = EngineConfig::from_file(&path)?;
        assert_eq!(config.storage.root, PathBuf::from("/srv/configs"));
        assert_eq!(config.storage.keep_versions, 0);
        assert_eq!(config.run.max_concurrency, 8);
        assert_eq!(config.device_timeout(), None);
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<(), ConfigError> {
        let env: HashMap<&str, &str> = [
            ("BACKUP_STORAGE_ROOT", "/data/backups"),
            ("BACKUP_MAX_CONCURRENCY", "2"),
            ("BACKUP_SCHEDULE", "0 0 * * * *"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()))?;
        assert_eq!(config.storage.root, PathBuf::from("/data/backups"));
        assert_eq!(config.run.max_concurrency, 2);
        assert_eq!(config.schedule.cron.as_deref(), Some("0 0 * * * *"));
        Ok(())
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_env(|k| (k == "BACKUP_MAX_CONCURRENCY").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_empty_storage_root_rejected() {
        let mut config = EngineConfig::default();
        config.storage.root = PathBuf::new();
        assert!(config.validate().is_err());
    }
}
