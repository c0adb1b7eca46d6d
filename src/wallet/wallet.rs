//! Wallet implementation for the ledger
//!
//! A wallet is one secp256k1 key pair. [`Wallets`] keeps every wallet of a
//! node in a single JSON file keyed by address.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{KeyError, KeyPair};

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Wallet not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

/// A key pair able to own and spend outputs
pub struct Wallet {
    key_pair: KeyPair,
}

impl Wallet {
    /// Create a new wallet with a fresh key pair
    pub fn new() -> Self {
        Self {
            key_pair: KeyPair::generate(),
        }
    }

    /// Import a wallet from a private key
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, WalletError> {
        Ok(Self {
            key_pair: KeyPair::from_private_key_hex(private_key_hex)?,
        })
    }

    pub fn address(&self) -> String {
        self.key_pair.address()
    }

    /// Uncompressed public key bytes
    pub fn public_key(&self) -> Vec<u8> {
        self.key_pair.public_key_bytes()
    }

    pub fn pub_key_hash(&self) -> Vec<u8> {
        self.key_pair.pub_key_hash()
    }

    /// Get the wallet's private key (hex)
    /// WARNING: Keep this secret!
    pub fn private_key(&self) -> String {
        self.key_pair.private_key_hex()
    }

    /// Sign a 32-byte digest
    pub fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, WalletError> {
        Ok(self.key_pair.sign_digest(digest)?)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// On-disk layout of the wallet file
#[derive(Debug, Default, Serialize, Deserialize)]
struct WalletFile {
    /// Address -> private key (hex)
    wallets: BTreeMap<String, String>,
}

/// Every wallet of a node, persisted as one JSON file
pub struct Wallets {
    path: PathBuf,
    wallets: BTreeMap<String, Wallet>,
}

impl Wallets {
    /// Load the wallet file, or start empty if it does not exist yet
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let mut wallets = BTreeMap::new();

        if path.exists() {
            let json = fs::read_to_string(path)?;
            let file: WalletFile = serde_json::from_str(&json)?;
            for private_key_hex in file.wallets.values() {
                let wallet = Wallet::from_private_key(private_key_hex)?;
                wallets.insert(wallet.address(), wallet);
            }
            debug!("Loaded {} wallet(s) from {:?}", wallets.len(), path);
        }

        Ok(Self {
            path: path.to_path_buf(),
            wallets,
        })
    }

    /// Write every wallet back to the file
    pub fn save(&self) -> Result<(), WalletError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = WalletFile {
            wallets: self
                .wallets
                .iter()
                .map(|(address, wallet)| (address.clone(), wallet.private_key()))
                .collect(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Generate a wallet, persist it and return its address
    pub fn create_wallet(&mut self) -> Result<String, WalletError> {
        let wallet = Wallet::new();
        let address = wallet.address();
        self.wallets.insert(address.clone(), wallet);
        self.save()?;
        Ok(address)
    }

    pub fn get_wallet(&self, address: &str) -> Result<&Wallet, WalletError> {
        self.wallets
            .get(address)
            .ok_or_else(|| WalletError::NotFound(address.to_string()))
    }

    /// Known addresses in ascending order
    pub fn addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}
