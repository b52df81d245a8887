//! Utility modules for the backup engine.

pub mod errors;
pub mod sensitive;

pub use errors::{EngineError, Result};
pub use sensitive::Sensitive;
