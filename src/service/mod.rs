// src/service/mod.rs
//! Worker lifecycle: orchestrator state, the control loop and the outbound
//! event streams

/// Lifecycle owner and its operations
pub mod orchestrator;
/// Level-triggered control loop
pub mod state_machine;
/// Client-visible status snapshot
pub mod status;
/// Outbound event streams
pub mod stream;

pub use orchestrator::{Lifecycle, MiningOrchestrator};
pub use state_machine::{ServiceState, ServiceStateMachine};
pub use status::MiningStatus;
pub use stream::{EventSource, EventStream};
