// src/miner/algorithm/keccak.rs
use crate::miner::algorithm::Algorithm;
use crate::utils::error::MinerError;
use sha3::{Digest, Keccak256};

/// Keccak-256 over the job blob followed by the little-endian nonce
#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak;

impl Algorithm for Keccak {
    fn hash(&self, input: &[u8], nonce: u64) -> Result<[u8; 32], MinerError> {
        let mut hasher = Keccak256::new();
        hasher.update(input);
        hasher.update(nonce.to_le_bytes());
        Ok(hasher.finalize().into())
    }

    fn name(&self) -> &'static str {
        "keccak256"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_changes_the_hash() {
        let algo = Keccak;
        let a = algo.hash(b"blob", 0).unwrap();
        let b = algo.hash(b"blob", 1).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, algo.hash(b"blob", 0).unwrap());
    }

    #[test]
    fn verify_against_extreme_targets() {
        let algo = Keccak;
        assert!(algo.verify(b"blob", 7, &[0xff; 33]).unwrap());
        assert!(!algo.verify(b"blob", 7, &[0x00; 32]).unwrap());
    }
}
