// src/service/status.rs
use serde::{Deserialize, Serialize};

/// Snapshot of the worker state as seen by clients
///
/// Built from the orchestrator state at the instant of the read and never
/// updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningStatus {
    /// Whether the operator wants mining to happen
    pub is_running: bool,

    /// Whether a pool connection is currently established
    pub is_connected: bool,

    /// Address of the connected pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_address: Option<String>,

    /// Seconds since the current pool connection was established
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_connected: Option<u64>,

    /// Shares accepted across all engine runs of this process
    pub total_blocks_submitted: u64,
}
