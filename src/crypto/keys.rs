//! ECDSA key management for the ledger
//!
//! Key pair generation, signing, and verification using the secp256k1
//! curve. Public keys travel in uncompressed form (65 bytes) and
//! signatures in compact form (64 bytes).

use rand::rngs::OsRng;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::address::address_from_pub_key_hash;
use super::hash::hash_pub_key;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Digest must be 32 bytes, got {0}")]
    InvalidDigest(usize),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Uncompressed public key bytes
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.serialize_uncompressed().to_vec()
    }

    /// Locking hash of this key pair's public key
    pub fn pub_key_hash(&self) -> Vec<u8> {
        hash_pub_key(&self.public_key_bytes())
    }

    /// Base58Check address of this key pair
    pub fn address(&self) -> String {
        address_from_pub_key_hash(&self.pub_key_hash())
    }

    /// Sign a 32-byte digest with the private key
    pub fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
        sign_digest(&self.secret_key, digest)
    }
}

/// Sign a 32-byte digest with a secret key, returning the compact signature
pub fn sign_digest(secret_key: &SecretKey, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
    if digest.len() != 32 {
        return Err(KeyError::InvalidDigest(digest.len()));
    }
    let secp = Secp256k1::signing_only();
    let message = Message::from_digest_slice(digest)?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_compact().to_vec())
}

/// Verify a compact signature over a 32-byte digest.
///
/// Malformed keys, digests or signatures verify as `false`.
pub fn verify_signature(public_key: &[u8], digest: &[u8], signature: &[u8]) -> bool {
    let Ok(public_key) = PublicKey::from_slice(public_key) else {
        return false;
    };
    let Ok(message) = Message::from_digest_slice(digest) else {
        return false;
    };
    let Ok(signature) = Signature::from_compact(signature) else {
        return false;
    };

    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
}
