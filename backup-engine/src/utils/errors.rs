//! Error types for the backup engine.
//!
//! Every per-device error stays scoped to the worker that produced it; only
//! `EngineError` is surfaced to callers of the library, and only for problems
//! that happen before any device is touched (configuration, inventory).

use std::path::PathBuf;
use thiserror::Error;

/// Opening the CLI session failed (unreachable, handshake or auth failure).
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("cannot reach {address}: {source}")]
    Unreachable {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("SSH handshake with {address} failed: {reason}")]
    Handshake { address: String, reason: String },

    #[error("authentication as {username} failed: {reason}")]
    Authentication { username: String, reason: String },

    #[error("connection refused by collaborator: {0}")]
    Other(String),
}

/// Retrieving the running configuration failed after the session was open.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("privilege escalation failed: {0}")]
    Privilege(String),

    #[error("session dropped during retrieval: {0}")]
    Io(#[from] std::io::Error),

    #[error("device returned an empty configuration")]
    EmptyOutput,
}

/// Persisting an artifact failed.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("cannot create partition {path}: {source}")]
    CreatePartition {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write artifact {path}: {source}")]
    WriteArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Listing a partition failed outright. Individual bad entries are
/// reported as [`LocateWarning`]s instead.
#[derive(Error, Debug)]
#[error("cannot list partition {path}: {source}")]
pub struct LocateError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A sibling entry that looked like an artifact but could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateWarning {
    #[error("skipping {file_name}: timestamp does not parse")]
    UnparseableName { file_name: String },

    #[error("skipping non UTF-8 entry {0}")]
    NonUtf8Name(String),

    #[error("skipping unreadable entry: {0}")]
    UnreadableEntry(String),
}

/// Comparing two artifacts or persisting the change record failed.
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("cannot read artifact {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write change record {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Inventory rows that cannot become devices.
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("cannot open inventory {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("inventory row {row}: {source}")]
    Parse {
        row: u64,
        #[source]
        source: csv::Error,
    },

    #[error("inventory row {row}: {reason}")]
    InvalidRow { row: u64, reason: String },

    #[error("inventory row {row}: hostname {hostname} already used on row {first_row}")]
    DuplicateHostname {
        row: u64,
        hostname: String,
        first_row: u64,
    },
}

/// Configuration could not be loaded or is invalid.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
