//! Ledger facade
//!
//! Ties the chain and its UTXO index together so that every appended
//! block is also applied to the index. This is the entry point used by
//! the command line.

use std::sync::Arc;

use log::info;

use crate::core::block::Block;
use crate::core::blockchain::{Blockchain, BlockchainError};
use crate::core::transaction::Transaction;
use crate::core::utxo_set::UtxoSet;
use crate::crypto::decode_address;
use crate::storage::Store;
use crate::wallet::Wallet;

/// A block as reported by [`Ledger::print_chain`]
#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub block: Block,
    /// Whether the stored nonce satisfies the chain's difficulty
    pub pow_valid: bool,
}

/// A chain plus its UTXO index
pub struct Ledger {
    blockchain: Blockchain,
}

impl Ledger {
    /// Create a chain paying the genesis reward to `address` and index it
    pub fn create_chain(
        store: Arc<dyn Store>,
        address: &str,
        difficulty_bits: u32,
    ) -> Result<Self, BlockchainError> {
        let blockchain = Blockchain::create(store, address, difficulty_bits)?;
        UtxoSet::new(&blockchain).reindex()?;
        Ok(Self { blockchain })
    }

    /// Open an existing chain
    pub fn open(store: Arc<dyn Store>, difficulty_bits: u32) -> Result<Self, BlockchainError> {
        Ok(Self {
            blockchain: Blockchain::open(store, difficulty_bits)?,
        })
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn utxo_set(&self) -> UtxoSet<'_> {
        UtxoSet::new(&self.blockchain)
    }

    /// Mine `transactions` into a block and apply it to the index
    pub fn mine(&self, transactions: Vec<Transaction>) -> Result<Block, BlockchainError> {
        let block = self.blockchain.mine_block(transactions)?;
        self.utxo_set().update(&block)?;
        Ok(block)
    }

    /// Balance of a raw public-key hash
    pub fn get_balance(&self, pub_key_hash: &[u8]) -> Result<u64, BlockchainError> {
        self.utxo_set().balance(pub_key_hash)
    }

    /// Balance of an address
    pub fn balance_of(&self, address: &str) -> Result<u64, BlockchainError> {
        let pub_key_hash = decode_address(address)?;
        self.get_balance(&pub_key_hash)
    }

    /// Transfer `amount` from `from` to `to` in a freshly mined block
    pub fn send(&self, from: &Wallet, to: &str, amount: u64) -> Result<Block, BlockchainError> {
        let tx = Transaction::new_utxo_transaction(from, to, amount, &self.utxo_set())?;
        let block = self.mine(vec![tx])?;
        info!("Sent {} from {} to {}", amount, from.address(), to);
        Ok(block)
    }

    /// Every block from the tip back to genesis, with its PoW status
    pub fn print_chain(&self) -> Result<Vec<ChainEntry>, BlockchainError> {
        let bits = self.blockchain.difficulty_bits();
        self.blockchain
            .iter()
            .map(|block| {
                block.map(|block| ChainEntry {
                    pow_valid: block.is_valid_pow(bits),
                    block,
                })
            })
            .collect()
    }

    /// Rebuild the UTXO index from the chain
    pub fn reindex(&self) -> Result<usize, BlockchainError> {
        self.utxo_set().reindex()
    }

    pub fn height(&self) -> Result<u64, BlockchainError> {
        self.blockchain.height()
    }
}
