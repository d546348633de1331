// src/rpc/hub.rs
//! Subscription fan-out
//!
//! One subscriber set per stream kind, each behind its own lock and never
//! locked together with the orchestrator. The first subscription of a kind
//! starts that stream's fan-out task, which then runs for the lifetime of
//! the process; an empty subscriber set just means idle.

use crate::service::status::MiningStatus;
use crate::service::stream::{EventSource, EventStream};
use crate::types::StreamKind;
use crate::utils::error::MinerError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Identifier handed to the client for one subscription
pub type SubscriptionId = String;

/// A single event of any stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Event {
    /// Hashes per second
    HashRate(f64),
    /// Connection status snapshot
    Status(MiningStatus),
    /// Running accepted-share count
    Submission(u64),
}

/// An event addressed to one subscription
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Target subscription
    pub subscription: SubscriptionId,
    /// The event
    pub event: Event,
}

/// Where a client connection receives its deliveries
///
/// `closed` is cancelled when the connection goes away; every subscription
/// made through the sink ends with it.
#[derive(Clone)]
pub struct SubscriptionSink {
    deliveries: mpsc::Sender<Delivery>,
    closed: CancellationToken,
}

impl SubscriptionSink {
    /// Creates a sink from a connection's outbound queue and its close signal
    pub fn new(deliveries: mpsc::Sender<Delivery>, closed: CancellationToken) -> Self {
        SubscriptionSink { deliveries, closed }
    }
}

/// Result of a successful subscribe call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    /// Identifier used in notifications and for unsubscribing
    pub id: SubscriptionId,
    /// Stream the subscription is attached to
    pub kind: StreamKind,
}

struct Subscriber {
    deliveries: mpsc::Sender<Delivery>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Topic {
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
    fan_out_started: AtomicBool,
}

impl Topic {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<SubscriptionId, Subscriber>> {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SubscriptionId, Subscriber>> {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fans orchestrator events out to client subscriptions
pub struct NotificationHub {
    source: Arc<dyn EventSource>,
    hash_rate: Topic,
    status: Topic,
    submission: Topic,
    next_id: AtomicU64,
}

impl NotificationHub {
    /// Creates a hub reading from `source`
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        NotificationHub {
            source,
            hash_rate: Topic::default(),
            status: Topic::default(),
            submission: Topic::default(),
            next_id: AtomicU64::new(1),
        }
    }

    fn topic(&self, kind: StreamKind) -> &Topic {
        match kind {
            StreamKind::HashRate => &self.hash_rate,
            StreamKind::Status => &self.status,
            StreamKind::Submission => &self.submission,
        }
    }

    /// Attaches a subscription for `kind` to the sink's connection
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `MinerError::StreamUnavailable` if the source has no such stream yet.
    pub fn subscribe(
        self: &Arc<Self>,
        kind: StreamKind,
        sink: &SubscriptionSink,
    ) -> Result<SubscriptionHandle, MinerError> {
        log::trace!("NotificationHub::subscribe {}", kind);
        let unavailable = || MinerError::StreamUnavailable(kind);
        let handle = match kind {
            StreamKind::HashRate => {
                let stream = self.source.hash_rate_stream().ok_or_else(unavailable)?;
                self.attach(stream, sink, Event::HashRate)
            }
            StreamKind::Status => {
                let stream = self.source.status_stream().ok_or_else(unavailable)?;
                self.attach(stream, sink, Event::Status)
            }
            StreamKind::Submission => {
                let stream = self.source.submission_stream().ok_or_else(unavailable)?;
                self.attach(stream, sink, Event::Submission)
            }
        };
        Ok(handle)
    }

    /// Removes a subscription by id
    ///
    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: &str) -> bool {
        log::trace!("NotificationHub::unsubscribe {}", id);
        for kind in StreamKind::ALL {
            if let Some(subscriber) = self.topic(kind).write().remove(id) {
                subscriber.cancel.cancel();
                log::debug!("Removed {} subscription {}", kind, id);
                return true;
            }
        }
        false
    }

    /// Number of live subscriptions for a stream
    pub fn subscriber_count(&self, kind: StreamKind) -> usize {
        self.topic(kind).read().len()
    }

    fn next_subscription_id(&self) -> SubscriptionId {
        format!("0x{:x}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn attach<T>(
        self: &Arc<Self>,
        stream: EventStream<T>,
        sink: &SubscriptionSink,
        wrap: fn(T) -> Event,
    ) -> SubscriptionHandle
    where
        T: Send + 'static,
    {
        let kind = stream.kind();
        let id = self.next_subscription_id();
        let cancel = sink.closed.child_token();

        self.topic(kind).write().insert(
            id.clone(),
            Subscriber {
                deliveries: sink.deliveries.clone(),
                cancel: cancel.clone(),
            },
        );
        log::debug!("Added {} subscription {}", kind, id);

        // Connection closed or unsubscribed
        tokio::spawn({
            let hub = self.clone();
            let id = id.clone();
            async move {
                cancel.cancelled().await;
                if hub.topic(kind).write().remove(&id).is_some() {
                    log::debug!("Cancelled {} subscription {}", kind, id);
                }
            }
        });

        let topic = self.topic(kind);
        if !topic.fan_out_started.swap(true, Ordering::SeqCst) {
            let stale = stream.discard_pending();
            if stale > 0 {
                log::debug!("Discarded {} {} events queued before the first subscriber", stale, kind);
            }
            log::debug!("Starting {} fan-out", kind);
            tokio::spawn(self.clone().fan_out(stream, wrap));
        }

        SubscriptionHandle { id, kind }
    }

    async fn fan_out<T>(self: Arc<Self>, stream: EventStream<T>, wrap: fn(T) -> Event)
    where
        T: Send + 'static,
    {
        let kind = stream.kind();
        while let Some(value) = stream.recv().await {
            let event = wrap(value);
            let subscribers = self.topic(kind).read();
            for (id, subscriber) in subscribers.iter() {
                let delivery = Delivery {
                    subscription: id.clone(),
                    event: event.clone(),
                };
                match subscriber.deliveries.try_send(delivery) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        log::debug!("Dropped {} event for slow subscription {}", kind, id);
                    }
                    Err(TrySendError::Closed(_)) => subscriber.cancel.cancel(),
                }
            }
        }
        log::debug!("The {} stream ended", kind);
    }
}
