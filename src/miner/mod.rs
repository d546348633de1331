// src/miner/mod.rs
//! Mining engine
//!
//! This module contains everything below the orchestrator:
//! - The engine contract the orchestrator drives
//! - Hashing algorithm interface
//! - Job scheduling and worker thread management

/// Engine contract and telemetry senders
pub mod engine;

/// Mining algorithm interface and implementation
pub mod algorithm;

/// Mining job scheduler
///
/// Holds the current job and nonce distribution, and spawns the worker
/// threads for each engine run.
pub mod scheduler;

/// Worker thread implementation
///
/// Contains the worker loop that performs the hash computations.
pub mod worker;

// Re-export main components for cleaner imports
pub use self::algorithm::Algorithm;
pub use self::engine::{EngineEvents, EngineFactory, MiningEngine};
pub use self::scheduler::{MiningJob, Scheduler, Share};
pub use self::worker::Worker;
