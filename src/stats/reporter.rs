// src/stats/reporter.rs
use crate::miner::engine::EngineEvents;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Default interval between two hash rate samples
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Counts completed hashes and turns them into hash rate samples
#[derive(Clone)]
pub struct HashRateMeter {
    /// Hashes reported by workers since the meter was created
    hashes: Arc<AtomicU64>,
    /// Interval at which samples are emitted
    sample_interval: Duration,
}

impl HashRateMeter {
    /// Creates a new meter with the specified sampling interval
    pub fn new(sample_interval: Duration) -> Self {
        HashRateMeter {
            hashes: Arc::new(AtomicU64::new(0)),
            sample_interval,
        }
    }

    /// Creates and returns a channel sender for hash counts
    ///
    /// The returned sender can be used to report completed hashes.
    /// The meter listens for these counts on a background thread that exits
    /// once every sender has been dropped.
    pub fn hash_sender(&self) -> Sender<u64> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.start_hash_listener(rx);
        tx
    }

    /// Total hashes counted so far
    pub fn total_hashes(&self) -> u64 {
        self.hashes.load(Ordering::Relaxed)
    }

    /// Emits one hash rate sample per interval until `cancel` is cancelled
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_sampling(&self, events: EngineEvents, cancel: CancellationToken) {
        let meter = self.clone();
        let mut last_total = meter.total_hashes();
        let mut last_time = Instant::now();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(meter.sample_interval);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let total = meter.total_hashes();
                        let rate = rate(total - last_total, last_time.elapsed());
                        log::debug!("Hashrate: {:.2} H/s", rate);
                        events.emit_hash_rate(rate);
                        last_total = total;
                        last_time = Instant::now();
                    }
                }
            }
        });
    }

    /// Starts a listener for hash counts on a background thread
    fn start_hash_listener(&self, receiver: Receiver<u64>) {
        let hashes = self.hashes.clone();

        std::thread::spawn(move || {
            for count in receiver {
                hashes.fetch_add(count, Ordering::Relaxed);
            }
        });
    }
}

fn rate(hashes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        hashes as f64 / seconds
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn rate_handles_zero_elapsed() {
        assert_eq!(rate(100, Duration::ZERO), 0.0);
        assert_eq!(rate(100, Duration::from_secs(4)), 25.0);
    }

    #[tokio::test]
    async fn samples_reflect_reported_hashes() {
        let meter = HashRateMeter::new(Duration::from_millis(50));
        let sender = meter.hash_sender();
        let (hash_tx, mut hash_rx) = mpsc::channel(16);
        let (sub_tx, _sub_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        meter.start_sampling(EngineEvents::new(hash_tx, sub_tx), cancel.clone());

        sender.send(1000).unwrap();
        let mut saw_positive = false;
        for _ in 0..10 {
            if hash_rx.recv().await.unwrap() > 0.0 {
                saw_positive = true;
                break;
            }
        }
        cancel.cancel();

        assert!(saw_positive);
        assert_eq!(meter.total_hashes(), 1000);
    }
}
