//! Filesystem storage of artifacts and change records, one partition
//! directory per hostname.

pub mod locator;
pub mod namer;
pub mod retention;
pub mod writer;

pub use locator::{FsVersionLocator, Located, VersionLocator};
pub use namer::ArtifactNamer;
pub use writer::write_artifact;
