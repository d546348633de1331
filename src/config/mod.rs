// src/config/mod.rs
//! Configuration management for the mining service
//!
//! This module handles all configuration-related functionality including:
//! - Loading, parsing and validating the TOML configuration file
//! - Discovering which file to read
//! - Generating configuration templates

/// Core configuration implementation
///
/// Contains the [`MinerConfig`] struct and its validation rules.
pub mod config;

/// Configuration discovery
///
/// Contains the [`ConfigSource`] seam used by the orchestrator and the
/// file-backed implementation used in production.
pub mod source;

// Re-export key items for easy access
pub use config::{MinerConfig, MinerSettings, PoolSettings};
pub use source::{ConfigLocations, ConfigSource, FileConfigSource};

/// Generates a commented configuration template
pub fn generate_template() -> String {
    MinerConfig::generate_template()
}
