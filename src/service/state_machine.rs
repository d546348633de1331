// src/service/state_machine.rs
//! Service control loop
//!
//! A level-triggered loop: every iteration takes one consistent snapshot of
//! the orchestrator's lifecycle flags, classifies it into a service state and
//! issues the single action that moves that state forward.
//!
//! | state            | condition                        | action                |
//! |------------------|----------------------------------|-----------------------|
//! | not running      | `!running`                       | wait for `start`      |
//! | seeking config   | `running && !config`             | `load_config`         |
//! | configured       | `running && config && !engine`   | `initialize_engine`   |
//! | mining           | `running && config && engine`    | `run_until_stopped`   |
//!
//! Iterations that make no forward progress are followed by a fixed backoff.

use crate::service::orchestrator::{Lifecycle, MiningOrchestrator};
use crate::utils::error::MinerError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause after an iteration that made no progress
pub const BACKOFF: Duration = Duration::from_secs(1);

/// Consecutive failed runs that trigger a full reset
pub const NETWORK_ERROR_LIMIT: u32 = 5;

/// Lifecycle states of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Mining is not wanted
    NotRunning,
    /// Waiting for a usable configuration
    SeekingConfig,
    /// Configured, engine not yet initialized
    Configured,
    /// Engine runs are being driven
    Mining,
}

impl ServiceState {
    /// Maps lifecycle flags onto a state
    ///
    /// Returns `None` for combinations no sequence of orchestrator
    /// operations can produce.
    pub fn classify(lifecycle: Lifecycle) -> Option<ServiceState> {
        match (lifecycle.running, lifecycle.has_config, lifecycle.has_engine) {
            (false, _, _) => Some(ServiceState::NotRunning),
            (true, false, false) => Some(ServiceState::SeekingConfig),
            (true, true, false) => Some(ServiceState::Configured),
            (true, true, true) => Some(ServiceState::Mining),
            (true, false, true) => None,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::NotRunning => write!(f, "not running"),
            ServiceState::SeekingConfig => write!(f, "seeking configuration"),
            ServiceState::Configured => write!(f, "configured"),
            ServiceState::Mining => write!(f, "mining"),
        }
    }
}

/// Result of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// State the iteration acted on
    pub state: ServiceState,
    /// Whether the action succeeded
    pub progressed: bool,
}

/// The single control loop driving the orchestrator
pub struct ServiceStateMachine {
    orchestrator: Arc<MiningOrchestrator>,
    backoff: Duration,
    network_errors: u32,
    last_state: Option<ServiceState>,
}

impl ServiceStateMachine {
    /// Creates a state machine with the standard backoff
    pub fn new(orchestrator: Arc<MiningOrchestrator>) -> Self {
        ServiceStateMachine {
            orchestrator,
            backoff: BACKOFF,
            network_errors: 0,
            last_state: None,
        }
    }

    /// Overrides the pause between unproductive iterations
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Consecutive failed runs of the current engine since its last clean run
    pub fn network_errors(&self) -> u32 {
        self.network_errors
    }

    /// Drives the orchestrator until `shutdown` is cancelled
    ///
    /// Stopping an active run is the caller's job (via
    /// [`MiningOrchestrator::stop`]); an iteration is never abandoned halfway.
    ///
    /// # Errors
    /// `MinerError::InvariantViolation` if the lifecycle state matches none of
    /// the service states. This is a defect; the process is expected to exit.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), MinerError> {
        log::info!("Service state machine started");
        while !shutdown.is_cancelled() {
            let step = self.step().await?;
            if !step.progressed {
                self.pause(step.state, &shutdown).await;
            }
        }
        log::info!("Service state machine stopped");
        Ok(())
    }

    /// Performs one iteration of the loop, without backoff
    pub async fn step(&mut self) -> Result<Step, MinerError> {
        let lifecycle = self.orchestrator.lifecycle();
        let Some(state) = ServiceState::classify(lifecycle) else {
            let dump = self.orchestrator.state_dump();
            log::error!("Mining service entered unexpected state: {}", dump);
            return Err(MinerError::InvariantViolation(dump));
        };

        if self.last_state != Some(state) {
            log::info!("Service state: {}", state);
            self.last_state = Some(state);
        }
        // failures only count while the same engine keeps failing
        if state != ServiceState::Mining {
            self.network_errors = 0;
        }

        let progressed = match state {
            ServiceState::NotRunning => false,
            ServiceState::SeekingConfig => self.orchestrator.load_config().is_ok(),
            ServiceState::Configured => self.orchestrator.initialize_engine().is_ok(),
            ServiceState::Mining => self.mine().await,
        };
        Ok(Step { state, progressed })
    }

    async fn mine(&mut self) -> bool {
        match self.orchestrator.run_until_stopped().await {
            Ok(()) => {
                self.network_errors = 0;
                true
            }
            Err(e) => {
                self.network_errors += 1;
                log::error!(
                    "Mining run failed ({} of {}): {}",
                    self.network_errors,
                    NETWORK_ERROR_LIMIT,
                    e
                );
                if self.network_errors >= NETWORK_ERROR_LIMIT {
                    log::warn!("Too many network errors, seeking configuration again");
                    self.orchestrator.reset();
                    self.network_errors = 0;
                }
                false
            }
        }
    }

    async fn pause(&self, state: ServiceState, shutdown: &CancellationToken) {
        if state == ServiceState::NotRunning {
            tokio::select! {
                _ = tokio::time::sleep(self.backoff) => {}
                _ = self.orchestrator.lifecycle_changed() => {}
                _ = shutdown.cancelled() => {}
            }
        } else {
            tokio::select! {
                _ = tokio::time::sleep(self.backoff) => {}
                _ = shutdown.cancelled() => {}
            }
        }
    }
}
