//! Version classification
//!
//! # Modules
//!
//! - [`stability`]: stability tier, level and ordering rank of a version string
//! - [`latest`]: selection of a package's last version

pub mod latest;
pub mod stability;

pub use latest::{VersionSummary, extract_last_version};
pub use stability::{Stability, StabilityLevel, VersionClass, classify};
