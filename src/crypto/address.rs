//! Base58Check addresses
//!
//! An address is `Base58(version ‖ pub_key_hash ‖ checksum)` where the
//! checksum is the first four bytes of a double SHA-256 over
//! `version ‖ pub_key_hash`.

use thiserror::Error;

use super::hash::{double_sha256, PUB_KEY_HASH_LEN};

/// Address version byte (mainnet)
pub const ADDRESS_VERSION: u8 = 0x00;

/// Number of checksum bytes appended to the payload
pub const ADDRESS_CHECKSUM_LEN: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    double_sha256(payload)[..ADDRESS_CHECKSUM_LEN].to_vec()
}

/// Encode a locking hash as an address
pub fn address_from_pub_key_hash(pub_key_hash: &[u8]) -> String {
    let mut payload = Vec::with_capacity(1 + pub_key_hash.len() + ADDRESS_CHECKSUM_LEN);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(pub_key_hash);
    let checksum = checksum(&payload);
    payload.extend_from_slice(&checksum);

    bs58::encode(payload).into_string()
}

/// Decode an address into its locking hash, checking version and checksum
pub fn decode_address(address: &str) -> Result<Vec<u8>, AddressError> {
    let invalid = || AddressError::InvalidAddress(address.to_string());

    let payload = bs58::decode(address).into_vec().map_err(|_| invalid())?;
    if payload.len() != 1 + PUB_KEY_HASH_LEN + ADDRESS_CHECKSUM_LEN {
        return Err(invalid());
    }

    let (versioned, actual_checksum) = payload.split_at(payload.len() - ADDRESS_CHECKSUM_LEN);
    if versioned[0] != ADDRESS_VERSION || checksum(versioned) != actual_checksum {
        return Err(invalid());
    }

    Ok(versioned[1..].to_vec())
}

/// Check whether an address is well formed
pub fn validate_address(address: &str) -> bool {
    decode_address(address).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_address_round_trip() {
        let kp = KeyPair::generate();
        let address = kp.address();

        // Version 0x00 encodes to a leading '1'
        assert!(address.starts_with('1'));
        assert_eq!(decode_address(&address).unwrap(), kp.pub_key_hash());
        assert!(validate_address(&address));
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        let kp = KeyPair::generate();
        let mut raw = bs58::decode(kp.address()).into_vec().unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = bs58::encode(raw).into_string();

        assert_eq!(
            decode_address(&tampered),
            Err(AddressError::InvalidAddress(tampered.clone()))
        );
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut payload = vec![0x05];
        payload.extend_from_slice(&[7u8; PUB_KEY_HASH_LEN]);
        let sum = checksum(&payload);
        payload.extend_from_slice(&sum);
        let address = bs58::encode(payload).into_string();

        assert!(!validate_address(&address));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(!validate_address(""));
        assert!(!validate_address("addrA"));
        assert!(!validate_address("0OIl"));
    }
}
