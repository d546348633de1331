// src/miner/engine.rs
//! Mining engine contract
//!
//! The orchestrator drives exactly one engine at a time through a
//! connect / handshake / listen episode. Everything the engine reports back
//! outside of return values goes through [`EngineEvents`].

use crate::config::MinerConfig;
use crate::utils::error::MinerError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A mining engine built for one configuration
///
/// One engine handle may serve several runs: a failed connect leaves it
/// reusable, and each run gets a fresh cancellation token.
#[async_trait]
pub trait MiningEngine: Send + Sync {
    /// Spawns the worker threads for a run
    ///
    /// The threads exit once `cancel` is cancelled.
    fn start_workers(&self, cancel: CancellationToken);

    /// Opens the connection to the pool
    ///
    /// # Errors
    /// `MinerError::ConnectError` if the pool cannot be reached
    async fn connect(&self, pool_address: &str) -> Result<(), MinerError>;

    /// Introduces this worker to the pool after connecting
    async fn handshake(&self) -> Result<(), MinerError>;

    /// Runs the pool event loop until cancellation or a fault
    ///
    /// # Returns
    /// - `Ok(())` when `cancel` ended the run
    /// - `Err(MinerError::RunError)` on protocol or network faults
    async fn listen(&self, cancel: CancellationToken) -> Result<(), MinerError>;

    /// Address of the connected pool, if any
    fn remote_addr(&self) -> Option<String>;

    /// Shares accepted by the pool over the lifetime of this engine
    fn total_successes(&self) -> u64;
}

/// Builds engines from configuration
pub trait EngineFactory: Send + Sync {
    /// Constructs an engine handle
    ///
    /// # Errors
    /// `MinerError::EngineInitError` if the configuration cannot drive an engine
    fn create(
        &self,
        config: &MinerConfig,
        events: EngineEvents,
    ) -> Result<Arc<dyn MiningEngine>, MinerError>;
}

/// Senders for the telemetry an engine produces
///
/// Sends never block: when the consuming side is not keeping up the event
/// is dropped.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    hash_rate: mpsc::Sender<f64>,
    submissions: mpsc::Sender<u64>,
}

impl EngineEvents {
    /// Wraps the orchestrator-owned stream senders
    pub fn new(hash_rate: mpsc::Sender<f64>, submissions: mpsc::Sender<u64>) -> Self {
        EngineEvents {
            hash_rate,
            submissions,
        }
    }

    /// Publishes one hash rate sample in hashes per second
    pub fn emit_hash_rate(&self, rate: f64) {
        if self.hash_rate.try_send(rate).is_err() {
            log::trace!("Dropped hash rate sample {:.2}", rate);
        }
    }

    /// Publishes one accepted share
    ///
    /// `accepted` is the running count of accepted shares for the engine.
    pub fn emit_submission(&self, accepted: u64) {
        if self.submissions.try_send(accepted).is_err() {
            log::trace!("Dropped submission event {}", accepted);
        }
    }
}
