//! Pool Miner - pool mining worker service in Rust
//!
//! This crate provides a long-running mining worker with:
//! - A lifecycle orchestrator and a self-healing service state machine
//! - A Stratum-style pool engine with multi-threaded nonce scanning
//! - A local JSON-RPC control socket with live event subscriptions
//! - File-based configuration discovery

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner core implementation including hashing, workers and scheduling
pub mod miner;

/// Pool connection
pub mod network;

/// Local control interface
pub mod rpc;

/// Worker lifecycle and the service control loop
pub mod service;

/// Hash rate measurement
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

#[cfg(test)]
mod testing;

// Core exports
pub use cli::Commands;
pub use config::{ConfigSource, FileConfigSource, MinerConfig};
pub use miner::{Algorithm, EngineFactory, MiningEngine, MiningJob, Scheduler, Share, Worker};
pub use network::{PoolClient, PoolClientFactory};
pub use rpc::{ControlEndpoint, NotificationHub, RpcClient, RpcServer};
pub use service::{MiningOrchestrator, MiningStatus, ServiceStateMachine};
pub use stats::HashRateMeter;
pub use types::StreamKind;
pub use utils::{MinerError, init_logging};
