// src/utils/error.rs
use crate::types::StreamKind;
use serde_json;
use std::io;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Main error type for the mining service
///
/// The first group of variants is the lifecycle taxonomy the service state
/// machine reacts to. The rest are plumbing errors raised by the IPC
/// transport, the pool connection and the command-line client.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Configuration missing or invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The mining engine could not be built from an otherwise valid configuration
    #[error("Engine initialization error: {0}")]
    EngineInitError(String),

    /// The pool could not be reached
    #[error("Pool connection error: {0}")]
    ConnectError(String),

    /// Failure after a pool connection was established
    #[error("Mining run error: {0}")]
    RunError(String),

    /// A subscription was requested before its event stream exists
    #[error("The {0} stream is not available")]
    StreamUnavailable(StreamKind),

    /// Lifecycle state matched none of the service states
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// An engine operation was requested without a loaded configuration
    #[error("Miner configuration is missing")]
    MissingConfig,

    /// A run was requested before the engine was initialized
    #[error("Mining engine is not initialized")]
    MissingEngine,

    /// A second engine run was requested while one is active
    #[error("An engine run is already active")]
    RunActive,

    /// Errors in protocol handling or invalid protocol messages
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// Error object returned by the remote end of an RPC call
    #[error("RPC error {code}: {message}")]
    RpcError {
        /// JSON-RPC error code
        code: i64,
        /// Human readable message
        message: String,
    },

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Async task execution errors
    #[error("Task execution error: {0}")]
    TaskError(String),
}

impl MinerError {
    /// Whether the service state machine may absorb this error and retry
    ///
    /// Only an invariant violation is fatal; it indicates a defect rather
    /// than an operational condition.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, MinerError::InvariantViolation(_))
    }
}

/// Converts line framing errors into MinerError
///
/// Raised when a peer sends a line longer than the codec limit or the
/// underlying socket fails mid-frame.
impl From<LinesCodecError> for MinerError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::Io(io) => MinerError::IoError(io),
            LinesCodecError::MaxLineLengthExceeded => {
                MinerError::ProtocolError("Line length limit exceeded".into())
            }
        }
    }
}

/// Converts hex decoding errors into MinerError
///
/// Used when a pool sends a job with a malformed blob or target.
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::ProtocolError(format!("Hex conversion failed: {}", e))
    }
}

/// Converts async task join errors into MinerError
impl From<tokio::task::JoinError> for MinerError {
    fn from(e: tokio::task::JoinError) -> Self {
        MinerError::TaskError(format!("Async task failed: {}", e))
    }
}
