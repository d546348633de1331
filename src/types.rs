// src/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Telemetry streams a client can subscribe to
///
/// Each kind maps to one outbound event stream of the orchestrator
/// and one subscription entry point of the control endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamKind {
    /// Hash rate samples in hashes per second
    HashRate,

    /// Connection status snapshots, emitted on connect and disconnect
    Status,

    /// Accepted share notifications
    Submission,
}

impl StreamKind {
    /// All stream kinds, in a stable order
    pub const ALL: [StreamKind; 3] = [StreamKind::HashRate, StreamKind::Status, StreamKind::Submission];

    /// Name of the subscription entry point for this stream
    pub fn subscription_method(self) -> &'static str {
        match self {
            StreamKind::HashRate => "hashRateSubscription",
            StreamKind::Status => "statusSubscription",
            StreamKind::Submission => "submissionSubscription",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::HashRate => write!(f, "hash-rate"),
            StreamKind::Status => write!(f, "status"),
            StreamKind::Submission => write!(f, "submission"),
        }
    }
}

impl FromStr for StreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hash-rate" | "hashRate" | "hashRateSubscription" => Ok(StreamKind::HashRate),
            "status" | "statusSubscription" => Ok(StreamKind::Status),
            "submission" | "submissionSubscription" => Ok(StreamKind::Submission),
            _ => Err(format!("Unknown stream: {}", s)),
        }
    }
}
