// src/miner/algorithm/mod.rs
//! Proof-of-work hashing interface
//!
//! Worker threads only see the [`Algorithm`] trait. The hash itself always
//! comes from a library implementation; this crate does not implement any
//! hash function.

/// Keccak-256 backed implementation
pub mod keccak;

use crate::utils::error::MinerError;

/// Common interface for all mining algorithms
///
/// All mining algorithm implementations must provide these basic operations
/// to be compatible with the mining scheduler.
pub trait Algorithm: Send + Sync {
    /// Compute the hash for given input data and nonce
    ///
    /// # Arguments
    /// * `input` - The job blob to be hashed
    /// * `nonce` - The nonce value to use in the hash computation
    ///
    /// # Returns
    /// 32-byte hash result or error if computation fails
    fn hash(&self, input: &[u8], nonce: u64) -> Result<[u8; 32], MinerError>;

    /// Verify if a hash meets the target difficulty
    ///
    /// # Returns
    /// `true` if hash is valid (less than target), `false` otherwise
    fn verify(&self, input: &[u8], nonce: u64, target: &[u8]) -> Result<bool, MinerError> {
        Ok(meets_target(&self.hash(input, nonce)?, target))
    }

    /// Short name reported in logs
    fn name(&self) -> &'static str;
}

/// Byte-wise comparison of a hash against a pool target
pub fn meets_target(hash: &[u8; 32], target: &[u8]) -> bool {
    hash.as_slice() < target
}

pub use keccak::Keccak;
