//! Hashing primitives for the ledger
//!
//! SHA-256 is used for block hashes, transaction ids and the
//! transaction digest; RIPEMD-160 over SHA-256 produces locking hashes.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Length of a public-key hash in bytes
pub const PUB_KEY_HASH_LEN: usize = 20;

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// Locking hash of a public key: RIPEMD160(SHA256(pubkey))
pub fn hash_pub_key(public_key: &[u8]) -> Vec<u8> {
    let mut ripemd = Ripemd160::new();
    ripemd.update(sha256(public_key));
    ripemd.finalize().to_vec()
}
