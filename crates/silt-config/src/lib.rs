//! Layered loading, saving, and path resolution for [`MonitorConfig`].
//!
//! The data shape itself lives in `silt-core` so that `silt-watch` and
//! `silt-pipeline` can depend on it without also depending on this crate's
//! file-format machinery.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::{ConfigFormat, ConfigLoader};

pub use silt_core::{MonitorConfig, WatchedDirectory};
