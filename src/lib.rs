//! UTXO Ledger: a single-node proof-of-work ledger in Rust
//!
//! This crate provides:
//! - Proof of Work block mining with a fixed target
//! - ECDSA digital signatures (secp256k1) over UTXO transactions
//! - A hash-linked chain persisted in a bucketed key-value store (sled)
//! - A UTXO index kept in step with the chain
//! - Base58Check addresses and a JSON wallet file
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use utxo_ledger::core::Ledger;
//! use utxo_ledger::storage::MemoryStore;
//! use utxo_ledger::wallet::Wallet;
//!
//! let alice = Wallet::new();
//! let bob = Wallet::new();
//!
//! // Create a chain at low difficulty; the genesis reward goes to alice
//! let ledger = Ledger::create_chain(Arc::new(MemoryStore::new()), &alice.address(), 8).unwrap();
//!
//! // Transfer 3 coins, mined into a new block
//! ledger.send(&alice, &bob.address(), 3).unwrap();
//! assert_eq!(ledger.balance_of(&bob.address()).unwrap(), 3);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod crypto;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use config::NodeConfig;
pub use core::{
    Block, Blockchain, BlockchainError, Ledger, Transaction, UtxoSet, BLOCK_REWARD, TARGET_BITS,
};
pub use crypto::KeyPair;
pub use storage::{MemoryStore, SledStore, Store};
pub use wallet::{Wallet, Wallets};
