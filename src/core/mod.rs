//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Proof of work over block header material
//! - Transactions (UTXO model with ECDSA-signed inputs)
//! - Blocks and the hash-linked blockchain
//! - The UTXO index kept in the `chain_state` bucket
//! - The ledger facade that keeps chain and index in step

pub mod block;
pub mod blockchain;
pub mod ledger;
pub mod pow;
pub mod transaction;
pub mod utxo_set;

pub use block::{hash_transactions, Block, BlockError};
pub use blockchain::{
    Blockchain, BlockchainError, BlockchainIterator, GENESIS_COINBASE_DATA, TIP_KEY,
};
pub use ledger::{ChainEntry, Ledger};
pub use pow::{ProofOfWork, TARGET_BITS};
pub use transaction::{
    Transaction, TransactionError, TxInput, TxOutput, TxOutputs, Utxo, BLOCK_REWARD,
    COINBASE_OUTPUT_INDEX,
};
pub use utxo_set::UtxoSet;
