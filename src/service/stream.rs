// src/service/stream.rs
//! Outbound event streams
//!
//! Each stream is the receiving half of a bounded channel. Producers never
//! block on it; a single fan-out task drains it once somebody subscribes.

use crate::service::status::MiningStatus;
use crate::types::StreamKind;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Read-only view of one outbound event stream
pub struct EventStream<T> {
    kind: StreamKind,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        EventStream {
            kind: self.kind,
            receiver: self.receiver.clone(),
        }
    }
}

impl<T: Send> EventStream<T> {
    /// Creates a stream and the sender feeding it
    pub fn channel(kind: StreamKind, capacity: usize) -> (mpsc::Sender<T>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let stream = EventStream {
            kind,
            receiver: Arc::new(Mutex::new(rx)),
        };
        (tx, stream)
    }

    /// Which telemetry this stream carries
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Waits for the next event
    ///
    /// Returns `None` once every sender is gone.
    pub async fn recv(&self) -> Option<T> {
        self.receiver.lock().await.recv().await
    }

    /// Drops events queued while nobody was consuming the stream
    ///
    /// Does nothing if a consumer is currently waiting on the stream.
    pub fn discard_pending(&self) -> usize {
        let Ok(mut receiver) = self.receiver.try_lock() else {
            return 0;
        };
        let mut discarded = 0;
        while receiver.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

/// Provider of the three outbound event streams
///
/// A stream is `None` until its producer exists and permanently available
/// afterwards.
pub trait EventSource: Send + Sync {
    /// Hash rate samples in hashes per second
    fn hash_rate_stream(&self) -> Option<EventStream<f64>>;

    /// Status snapshots on connect and disconnect
    fn status_stream(&self) -> Option<EventStream<MiningStatus>>;

    /// Running accepted-share counts, one per accepted share
    fn submission_stream(&self) -> Option<EventStream<u64>>;
}
