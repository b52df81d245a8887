//! Backup Engine Library
//!
//! Retrieves running configurations from a fleet of network devices,
//! stores each retrieval as a timestamped artifact in a per-hostname
//! partition, and records a unified diff against the previous artifact.

pub mod config;
pub mod coordinator;
pub mod device;
pub mod diff;
pub mod inventory;
pub mod outcome;
pub mod session;
pub mod storage;
pub mod timestamp;
pub mod utils;
pub mod worker;

// Re-export commonly used types
pub use config::EngineConfig;
pub use coordinator::FleetCoordinator;
pub use device::Device;
pub use outcome::{ChangeStatus, DeviceOutcome, RunReport, Stage};
pub use utils::errors::EngineError;
pub type Result<T> = std::result::Result<T, EngineError>;
