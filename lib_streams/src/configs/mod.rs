//! # Configuration Modules
//!
//! Endpoint and timing settings for the channels. File and environment
//! loaders are compiled with the `configs` feature.

/// Stream endpoints, timings and their loaders.
pub mod settings;

pub use settings::{SettingsError, StreamSettings};
