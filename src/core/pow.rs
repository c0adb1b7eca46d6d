//! Proof of work
//!
//! A block hash is `SHA-256(prev_hash ‖ tx_digest ‖ hex(timestamp) ‖
//! hex(difficulty_bits) ‖ hex(nonce))`, where `hex` is lowercase
//! hexadecimal without padding. Read as a big-endian integer it must be
//! strictly below `1 << (256 - difficulty_bits)`.

use std::time::Instant;

use log::info;
use sha2::{Digest, Sha256};

use super::block::BlockError;

/// Difficulty used by every chain unless configured otherwise
pub const TARGET_BITS: u32 = 24;

/// Smallest accepted difficulty
pub const MIN_DIFFICULTY_BITS: u32 = 1;

/// Largest accepted difficulty
pub const MAX_DIFFICULTY_BITS: u32 = 255;

/// The nonce search stops before reaching this value
pub const MAX_NONCE: u64 = i64::MAX as u64;

/// Big-endian 256-bit target `1 << (256 - bits)`
pub fn target_for_bits(bits: u32) -> [u8; 32] {
    let bits = bits.clamp(MIN_DIFFICULTY_BITS, MAX_DIFFICULTY_BITS);
    let shift = (256 - bits) as usize;

    let mut target = [0u8; 32];
    target[31 - shift / 8] = 1 << (shift % 8);
    target
}

/// Lowercase hex of a signed integer, with a leading `-` for negatives
fn hex_i64(n: i64) -> String {
    if n < 0 {
        format!("-{:x}", n.unsigned_abs())
    } else {
        format!("{:x}", n)
    }
}

/// Header material bound to a difficulty, ready to mine or validate
#[derive(Debug, Clone)]
pub struct ProofOfWork<'a> {
    prev_hash: &'a [u8],
    tx_digest: Vec<u8>,
    timestamp: i64,
    difficulty_bits: u32,
    target: [u8; 32],
}

impl<'a> ProofOfWork<'a> {
    pub fn new(prev_hash: &'a [u8], tx_digest: Vec<u8>, timestamp: i64, difficulty_bits: u32) -> Self {
        Self {
            prev_hash,
            tx_digest,
            timestamp,
            difficulty_bits,
            target: target_for_bits(difficulty_bits),
        }
    }

    /// Everything hashed for a nonce except the nonce itself
    fn prefix(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.prev_hash.len() + self.tx_digest.len() + 24);
        data.extend_from_slice(self.prev_hash);
        data.extend_from_slice(&self.tx_digest);
        data.extend_from_slice(hex_i64(self.timestamp).as_bytes());
        data.extend_from_slice(hex_i64(self.difficulty_bits as i64).as_bytes());
        data
    }

    /// Full preimage for a nonce
    pub fn prepare_data(&self, nonce: u64) -> Vec<u8> {
        let mut data = self.prefix();
        data.extend_from_slice(format!("{:x}", nonce).as_bytes());
        data
    }

    /// Strict big-endian comparison against the target
    pub fn meets_target(&self, hash: &[u8]) -> bool {
        hash.len() == 32 && hash < &self.target[..]
    }

    /// Search nonces from zero upward until a hash meets the target
    pub fn run(&self) -> Result<(u64, Vec<u8>), BlockError> {
        let start = Instant::now();

        let mut base = Sha256::new();
        base.update(self.prefix());

        let mut nonce = 0u64;
        while nonce < MAX_NONCE {
            let mut hasher = base.clone();
            hasher.update(format!("{:x}", nonce).as_bytes());
            let hash = hasher.finalize().to_vec();

            if self.meets_target(&hash) {
                let elapsed = start.elapsed().as_millis();
                let attempts = nonce + 1;
                let hash_rate = if elapsed > 0 {
                    (attempts as f64) / (elapsed as f64 / 1000.0)
                } else {
                    attempts as f64
                };
                info!(
                    "Found nonce {} in {}ms ({} attempts, {:.2} H/s): {}",
                    nonce,
                    elapsed,
                    attempts,
                    hash_rate,
                    hex::encode(&hash)
                );
                return Ok((nonce, hash));
            }

            nonce += 1;
        }

        Err(BlockError::Exhausted)
    }

    /// Recompute the hash for `nonce` and check it against the target
    pub fn validate(&self, nonce: u64) -> bool {
        let hash = Sha256::digest(self.prepare_data(nonce));
        self.meets_target(&hash)
    }

    /// Hash for `nonce` without checking the target
    pub fn hash_for(&self, nonce: u64) -> Vec<u8> {
        Sha256::digest(self.prepare_data(nonce)).to_vec()
    }
}
