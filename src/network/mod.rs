// src/network/mod.rs
//! Network communication components
//!
//! This module handles the connection to the mining pool. [`PoolClient`] is
//! the production mining engine: it speaks a line-delimited JSON stratum
//! dialect over TCP and owns the worker threads for each run.

/// Mining pool client implementation
///
/// Handles the pool handshake, job distribution and share submission.
pub mod pool;

// Re-export main components for cleaner imports
pub use pool::{PoolClient, PoolClientFactory};
