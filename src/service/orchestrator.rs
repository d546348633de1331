// src/service/orchestrator.rs
//! Worker lifecycle state
//!
//! [`MiningOrchestrator`] owns every piece of mutable lifecycle state behind
//! a single reader/writer lock. All mutation goes through its methods; no
//! lock is ever held across an await point or a call into the engine's
//! event loop.

use crate::config::{ConfigSource, MinerConfig};
use crate::miner::engine::{EngineEvents, EngineFactory, MiningEngine};
use crate::service::status::MiningStatus;
use crate::service::stream::{EventSource, EventStream};
use crate::types::StreamKind;
use crate::utils::error::MinerError;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

/// Queue depth of the status stream
pub const STATUS_QUEUE: usize = 16;
/// Queue depth of the hash rate stream
pub const HASH_RATE_QUEUE: usize = 64;
/// Queue depth of the submission stream
pub const SUBMISSION_QUEUE: usize = 64;

/// Mutable lifecycle state, only reachable through [`MiningOrchestrator`]
///
/// Invariants:
/// - an engine exists only together with a configuration
/// - a connection timestamp or an active run exists only together with an engine
/// - `cumulative_blocks_submitted` never decreases
struct OrchestratorState {
    running: bool,
    config: Option<MinerConfig>,
    engine: Option<Arc<dyn MiningEngine>>,
    connected_since: Option<Instant>,
    cancel_current_run: Option<CancellationToken>,
    cumulative_blocks_submitted: u64,
}

impl OrchestratorState {
    fn status(&self) -> MiningStatus {
        let connected = self.connected_since.zip(self.engine.as_ref());
        let engine_successes = self.engine.as_ref().map_or(0, |e| e.total_successes());

        MiningStatus {
            is_running: self.running,
            is_connected: connected.is_some(),
            pool_address: connected.and_then(|(_, engine)| engine.remote_addr()),
            seconds_connected: connected.map(|(since, _)| since.elapsed().as_secs()),
            total_blocks_submitted: self.cumulative_blocks_submitted + engine_successes,
        }
    }

    fn reset(&mut self) {
        if let Some(cancel) = self.cancel_current_run.take() {
            log::info!("Disconnecting");
            cancel.cancel();
        }
        if let Some(engine) = self.engine.take() {
            let successes = engine.total_successes();
            log::debug!("Adding {} successes to blocks submitted", successes);
            self.cumulative_blocks_submitted += successes;
        }
        self.config = None;
        self.connected_since = None;
    }

    fn invariants_hold(&self) -> bool {
        (self.engine.is_none() || self.config.is_some())
            && (self.connected_since.is_none() || self.engine.is_some())
            && (self.cancel_current_run.is_none() || self.engine.is_some())
    }
}

impl fmt::Debug for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorState")
            .field("running", &self.running)
            .field("config", &self.config)
            .field("engine", &self.engine.as_ref().map(|e| e.remote_addr()))
            .field("connected_since", &self.connected_since)
            .field("run_active", &self.cancel_current_run.is_some())
            .field("cumulative_blocks_submitted", &self.cumulative_blocks_submitted)
            .finish()
    }
}

/// Consistent view of the lifecycle flags, taken under one lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    /// Operator wants mining to happen
    pub running: bool,
    /// A configuration has been loaded
    pub has_config: bool,
    /// An engine has been initialized
    pub has_engine: bool,
}

/// Owner of the worker lifecycle
pub struct MiningOrchestrator {
    state: RwLock<OrchestratorState>,
    config_source: Arc<dyn ConfigSource>,
    engine_factory: Arc<dyn EngineFactory>,
    engine_events: EngineEvents,
    status_sender: mpsc::Sender<MiningStatus>,
    hash_rate: EventStream<f64>,
    status: EventStream<MiningStatus>,
    submissions: EventStream<u64>,
    lifecycle_changed: Notify,
}

impl MiningOrchestrator {
    /// Creates an orchestrator that is running but has no configuration yet
    pub fn new(config_source: Arc<dyn ConfigSource>, engine_factory: Arc<dyn EngineFactory>) -> Self {
        log::trace!("MiningOrchestrator::new");
        let (hash_rate_tx, hash_rate) = EventStream::channel(StreamKind::HashRate, HASH_RATE_QUEUE);
        let (status_sender, status) = EventStream::channel(StreamKind::Status, STATUS_QUEUE);
        let (submission_tx, submissions) =
            EventStream::channel(StreamKind::Submission, SUBMISSION_QUEUE);

        MiningOrchestrator {
            state: RwLock::new(OrchestratorState {
                running: true,
                config: None,
                engine: None,
                connected_since: None,
                cancel_current_run: None,
                cumulative_blocks_submitted: 0,
            }),
            config_source,
            engine_factory,
            engine_events: EngineEvents::new(hash_rate_tx, submission_tx),
            status_sender,
            hash_rate,
            status,
            submissions,
            lifecycle_changed: Notify::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, OrchestratorState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, OrchestratorState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Asks the configuration source for a configuration and keeps it
    ///
    /// # Errors
    /// The source's `MinerError::ConfigError`; state is left unchanged.
    pub fn load_config(&self) -> Result<(), MinerError> {
        log::trace!("MiningOrchestrator::load_config");
        let config = self.config_source.load()?;
        log::info!("Loaded configuration for miner {}", config.miner.miner_id);
        self.write().config = Some(config);
        Ok(())
    }

    /// Builds the engine for the loaded configuration
    ///
    /// Does nothing if an engine already exists.
    ///
    /// # Errors
    /// - `MinerError::MissingConfig` without a configuration
    /// - the factory's `MinerError::EngineInitError`; state is left unchanged
    pub fn initialize_engine(&self) -> Result<(), MinerError> {
        log::trace!("MiningOrchestrator::initialize_engine");
        let mut state = self.write();
        if state.engine.is_some() {
            return Ok(());
        }
        let config = state.config.as_ref().ok_or_else(|| {
            log::error!("Cannot start mining without miner configuration");
            MinerError::MissingConfig
        })?;

        let engine = self
            .engine_factory
            .create(config, self.engine_events.clone())
            .inspect_err(|e| log::error!("Failed to create the mining engine: {}", e))?;
        state.engine = Some(engine);
        Ok(())
    }

    /// Runs one engine episode: start workers, connect, handshake, listen
    ///
    /// Blocks until the run is cancelled through [`stop`](Self::stop) or
    /// [`reset`](Self::reset), or the engine reports a fault.
    ///
    /// # Errors
    /// - `MinerError::MissingEngine` / `MissingConfig` / `RunActive` when a run cannot start
    /// - the engine's connect error; configuration and engine are kept for a retry
    /// - the engine's terminal error after a connection was established
    pub async fn run_until_stopped(&self) -> Result<(), MinerError> {
        log::trace!("MiningOrchestrator::run_until_stopped");
        let (engine, pool_address, cancel) = {
            let mut state = self.write();
            let engine = state.engine.clone().ok_or(MinerError::MissingEngine)?;
            let pool_address = state
                .config
                .as_ref()
                .map(|c| c.pool_address().to_string())
                .ok_or(MinerError::MissingConfig)?;
            if state.cancel_current_run.is_some() {
                return Err(MinerError::RunActive);
            }
            let cancel = CancellationToken::new();
            state.cancel_current_run = Some(cancel.clone());
            (engine, pool_address, cancel)
        };

        engine.start_workers(cancel.clone());

        if let Err(e) = engine.connect(&pool_address).await {
            log::error!("Failed to connect to the pool host {}: {}", pool_address, e);
            cancel.cancel();
            self.write().cancel_current_run = None;
            return Err(e);
        }

        {
            let mut state = self.write();
            if cancel.is_cancelled() {
                log::info!("Run cancelled while connecting to {}", pool_address);
                state.cancel_current_run = None;
                return Ok(());
            }
            state.connected_since = Some(Instant::now());
            self.emit_status(&state);
        }

        let result = match engine.handshake().await {
            Ok(()) => engine.listen(cancel.clone()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            log::warn!("Disconnected from {}: {}", pool_address, e);
        }

        let mut state = self.write();
        cancel.cancel();
        state.cancel_current_run = None;
        state.connected_since = None;
        self.emit_status(&state);
        result
    }

    /// Cancels any active run and discards configuration and engine
    ///
    /// Successes of the discarded engine are folded into the cumulative counter.
    pub fn reset(&self) {
        log::trace!("MiningOrchestrator::reset");
        self.write().reset();
    }

    /// Marks mining as wanted
    pub fn start(&self) {
        log::trace!("MiningOrchestrator::start");
        self.write().running = true;
        self.lifecycle_changed.notify_waiters();
    }

    /// Marks mining as unwanted and resets
    pub fn stop(&self) {
        log::trace!("MiningOrchestrator::stop");
        {
            let mut state = self.write();
            state.running = false;
            state.reset();
        }
        self.lifecycle_changed.notify_waiters();
    }

    /// Snapshot of the current state
    pub fn get_status(&self) -> MiningStatus {
        self.read().status()
    }

    /// Whether mining is wanted
    pub fn is_running(&self) -> bool {
        self.read().running
    }

    /// Whether a configuration is loaded
    pub fn has_config(&self) -> bool {
        self.read().config.is_some()
    }

    /// Whether an engine is initialized
    pub fn has_engine(&self) -> bool {
        self.read().engine.is_some()
    }

    /// Running, configured and initialized
    pub fn is_ready_to_mine(&self) -> bool {
        let state = self.read();
        state.running && state.config.is_some() && state.engine.is_some()
    }

    /// All lifecycle flags from a single lock acquisition
    pub fn lifecycle(&self) -> Lifecycle {
        let state = self.read();
        Lifecycle {
            running: state.running,
            has_config: state.config.is_some(),
            has_engine: state.engine.is_some(),
        }
    }

    /// Full state rendering for diagnostics
    pub fn state_dump(&self) -> String {
        format!("{:?}", *self.read())
    }

    /// Whether the structural invariants currently hold
    pub fn invariants_hold(&self) -> bool {
        self.read().invariants_hold()
    }

    /// Resolves on the next [`start`](Self::start) or [`stop`](Self::stop)
    pub async fn lifecycle_changed(&self) {
        self.lifecycle_changed.notified().await
    }

    fn emit_status(&self, state: &OrchestratorState) {
        // Nobody listening is the normal case; the event is simply dropped.
        if self.status_sender.try_send(state.status()).is_err() {
            log::trace!("Dropped status notification");
        }
    }
}

impl EventSource for MiningOrchestrator {
    fn hash_rate_stream(&self) -> Option<EventStream<f64>> {
        Some(self.hash_rate.clone())
    }

    fn status_stream(&self) -> Option<EventStream<MiningStatus>> {
        Some(self.status.clone())
    }

    fn submission_stream(&self) -> Option<EventStream<u64>> {
        Some(self.submissions.clone())
    }
}
