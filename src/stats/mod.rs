//! Statistics collection module
//!
//! Tracks the hashes completed by worker threads and converts them into the
//! periodic hash rate samples published on the hash rate stream.

/// Submodule containing the hash rate meter
///
/// The meter handles:
/// - Atomic collection of hash counts
/// - Thread-safe channels for receiving counts from workers
/// - Periodic sampling onto the engine's telemetry senders
pub mod reporter;

// Re-export main components
pub use reporter::{DEFAULT_SAMPLE_INTERVAL, HashRateMeter};
