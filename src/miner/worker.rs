// src/miner/worker.rs
//! Worker thread implementation
//!
//! Each worker repeatedly claims a batch of nonces for the current job,
//! scans it in parallel and reports found shares and completed hashes.

use crate::miner::algorithm::{Algorithm, meets_target};
use crate::miner::scheduler::{MiningJob, Share};
use arc_swap::ArcSwap;
use crossbeam_channel::Sender;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Idle wait while no job has been received yet
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Worker thread that performs mining computations
pub struct Worker {
    /// The mining algorithm implementation to use
    pub(crate) algorithm: Arc<dyn Algorithm>,
    /// Job shared with the scheduler, swapped when the pool sends a new one
    pub(crate) current_job: Arc<ArcSwap<Option<MiningJob>>>,
    /// Next unclaimed nonce for the current job
    pub(crate) nonce_counter: Arc<AtomicU64>,
    /// Number of nonces claimed per batch
    pub(crate) batch_size: u64,
    /// Channel for sending valid shares to the pool connection
    pub(crate) share_sender: mpsc::Sender<Share>,
    /// Channel for reporting completed hash counts
    pub(crate) hash_sender: Sender<u64>,
}

impl Worker {
    /// Mines until `cancel` is cancelled or the pool connection goes away
    pub fn run(&self, cancel: &CancellationToken) {
        while !cancel.is_cancelled() && !self.share_sender.is_closed() {
            let current_job = self.current_job.load();
            match &**current_job {
                Some(job) => {
                    let start = self.nonce_counter.fetch_add(self.batch_size, Ordering::SeqCst);
                    self.process_batch(job, start);
                }
                None => std::thread::sleep(IDLE_WAIT),
            }
        }
        log::debug!("Worker {:?} exiting", std::thread::current().id());
    }

    /// Scans `batch_size` nonces starting at `start`
    ///
    /// Uses rayon's parallel iterator to process the nonce range and sends
    /// every hash meeting the job target as a share.
    fn process_batch(&self, job: &MiningJob, start: u64) {
        (start..start.saturating_add(self.batch_size))
            .into_par_iter()
            .for_each(|nonce| match self.algorithm.hash(&job.blob, nonce) {
                Ok(hash) => {
                    if meets_target(&hash, &job.target) {
                        let share = Share {
                            job_id: job.job_id.clone(),
                            nonce,
                            result: hash,
                        };
                        if let Err(TrySendError::Full(share)) = self.share_sender.try_send(share) {
                            log::debug!("Share queue full, dropped nonce {} of job {}", share.nonce, share.job_id);
                        }
                    }
                }
                Err(e) => log::error!("Hashing error: {}", e),
            });
        let _ = self.hash_sender.send(self.batch_size);
    }
}
