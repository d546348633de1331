// src/miner/scheduler.rs
//! Mining job scheduler implementation
//!
//! Manages the distribution of mining jobs to workers. Handles job updates,
//! nonce distribution, and worker thread startup for each engine run.

use crate::miner::algorithm::Algorithm;
use crate::miner::worker::Worker;
use arc_swap::ArcSwap;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Shares buffered between the workers and the pool connection
///
/// Shares found while the queue is full are dropped.
pub const SHARE_QUEUE: usize = 256;

/// Represents a mining job received from the pool
#[derive(Debug, Clone, PartialEq)]
pub struct MiningJob {
    /// Unique identifier for the job
    pub job_id: String,
    /// Job data to be hashed
    pub blob: Vec<u8>,
    /// Target difficulty for this job
    pub target: Vec<u8>,
}

/// Represents a valid share found by a worker
#[derive(Debug, Clone)]
pub struct Share {
    /// Job ID this share belongs to
    pub job_id: String,
    /// Nonce that produced the valid hash
    pub nonce: u64,
    /// Resulting hash that meets the target
    pub result: [u8; 32],
}

/// Coordinates mining jobs across worker threads
pub struct Scheduler {
    /// Current active job (atomically swappable)
    current_job: Arc<ArcSwap<Option<MiningJob>>>,
    /// Atomic counter for nonce distribution
    nonce_counter: Arc<AtomicU64>,
    /// Hash function used by every worker
    algorithm: Arc<dyn Algorithm>,
    /// Number of nonces each worker processes per batch
    batch_size: u64,
}

impl Scheduler {
    /// Creates a new Scheduler instance
    ///
    /// # Arguments
    /// * `algorithm` - The mining algorithm to use
    /// * `batch_size` - Number of nonces each worker processes at once
    pub fn new(algorithm: Arc<dyn Algorithm>, batch_size: u64) -> Self {
        Scheduler {
            current_job: Arc::new(ArcSwap::from_pointee(None)),
            nonce_counter: Arc::new(AtomicU64::new(0)),
            algorithm,
            batch_size,
        }
    }

    /// Updates the current mining job
    pub fn update_job(&self, new_job: MiningJob) {
        log::debug!("New job {}", new_job.job_id);
        self.current_job.store(Arc::new(Some(new_job)));
        self.nonce_counter.store(0, Ordering::SeqCst);
    }

    /// Drops the current job so workers idle until the next one
    pub fn clear_job(&self) {
        self.current_job.store(Arc::new(None));
    }

    /// Current job, if any
    pub fn current_job(&self) -> Option<MiningJob> {
        (**self.current_job.load()).clone()
    }

    /// Spawns worker threads for one engine run
    ///
    /// # Arguments
    /// * `workers` - Number of worker threads to spawn
    /// * `cancel` - Token ending the run; workers exit once it is cancelled
    /// * `share_sender` - Channel for sending valid shares
    /// * `hash_sender` - Channel for reporting completed hashes
    pub fn start_mining(
        &self,
        workers: usize,
        cancel: CancellationToken,
        share_sender: mpsc::Sender<Share>,
        hash_sender: Sender<u64>,
    ) {
        log::info!(
            "Starting {} {} workers",
            workers,
            self.algorithm.name()
        );
        (0..workers).for_each(|_| {
            let worker = Worker {
                algorithm: self.algorithm.clone(),
                current_job: self.current_job.clone(),
                nonce_counter: self.nonce_counter.clone(),
                batch_size: self.batch_size,
                share_sender: share_sender.clone(),
                hash_sender: hash_sender.clone(),
            };
            let cancel = cancel.clone();

            std::thread::spawn(move || worker.run(&cancel));
        });
    }
}
