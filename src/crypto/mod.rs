//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 and locking-hash computation
//! - ECDSA key management (secp256k1)
//! - Base58Check address encoding

pub mod address;
pub mod hash;
pub mod keys;

pub use address::{
    address_from_pub_key_hash, decode_address, validate_address, AddressError,
    ADDRESS_CHECKSUM_LEN, ADDRESS_VERSION,
};
pub use hash::{double_sha256, hash_pub_key, sha256, PUB_KEY_HASH_LEN};
pub use keys::{verify_signature, KeyError, KeyPair};
