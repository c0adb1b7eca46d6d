//! Blockchain implementation
//!
//! The chain lives in the `blocks` bucket of a [`Store`]: every block is
//! keyed by its hash and the key `"l"` points at the tip. Traversal runs
//! from the tip back to the genesis block, and that newest-to-oldest
//! order is the one every full-chain scan uses.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;
use thiserror::Error;

use crate::core::block::{Block, BlockError};
use crate::core::pow::{MAX_DIFFICULTY_BITS, MIN_DIFFICULTY_BITS};
use crate::core::transaction::{Transaction, TransactionError, TxOutputs};
use crate::core::utxo_set::UtxoSet;
use crate::crypto::AddressError;
use crate::storage::{Bucket, StorageError, Store, WriteBatch};
use crate::wallet::Wallet;

/// Key of the tip pointer in the blocks bucket
pub const TIP_KEY: &[u8] = b"l";

/// Payload of the genesis coinbase input
pub const GENESIS_COINBASE_DATA: &str = "hello world！";

/// Blockchain-related errors
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Blockchain already exists")]
    AlreadyExists,
    #[error("No existing blockchain found")]
    NoChain,
    #[error("Invalid difficulty: {0} bits")]
    InvalidDifficulty(u32),
    #[error("Block error: {0}")]
    BlockError(#[from] BlockError),
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Address error: {0}")]
    AddressError(#[from] AddressError),
}

fn check_difficulty(difficulty_bits: u32) -> Result<(), BlockchainError> {
    if (MIN_DIFFICULTY_BITS..=MAX_DIFFICULTY_BITS).contains(&difficulty_bits) {
        Ok(())
    } else {
        Err(BlockchainError::InvalidDifficulty(difficulty_bits))
    }
}

/// Handle to the canonical chain
pub struct Blockchain {
    store: Arc<dyn Store>,
    tip: RwLock<Vec<u8>>,
    difficulty_bits: u32,
}

impl Blockchain {
    /// Create a new chain whose genesis coinbase pays `address`
    pub fn create(
        store: Arc<dyn Store>,
        address: &str,
        difficulty_bits: u32,
    ) -> Result<Self, BlockchainError> {
        check_difficulty(difficulty_bits)?;
        if store.get(Bucket::Blocks, TIP_KEY)?.is_some() {
            return Err(BlockchainError::AlreadyExists);
        }

        let coinbase = Transaction::new_coinbase(address, GENESIS_COINBASE_DATA)?;
        let genesis = Block::genesis_with_difficulty(coinbase, difficulty_bits)?;

        let mut batch = WriteBatch::new();
        batch.put(Bucket::Blocks, genesis.hash.clone(), genesis.serialize()?);
        batch.put(Bucket::Blocks, TIP_KEY, genesis.hash.clone());
        store.write(&batch)?;

        info!("Created blockchain with genesis block {}", hex::encode(&genesis.hash));

        Ok(Self {
            store,
            tip: RwLock::new(genesis.hash),
            difficulty_bits,
        })
    }

    /// Open an existing chain
    pub fn open(store: Arc<dyn Store>, difficulty_bits: u32) -> Result<Self, BlockchainError> {
        check_difficulty(difficulty_bits)?;
        let tip = store
            .get(Bucket::Blocks, TIP_KEY)?
            .ok_or(BlockchainError::NoChain)?;

        Ok(Self {
            store,
            tip: RwLock::new(tip),
            difficulty_bits,
        })
    }

    /// Hash of the most recently appended block
    pub fn tip(&self) -> Vec<u8> {
        self.tip.read().clone()
    }

    pub fn difficulty_bits(&self) -> u32 {
        self.difficulty_bits
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Load a block by hash
    pub fn get_block(&self, hash: &[u8]) -> Result<Block, BlockchainError> {
        let bytes = self
            .store
            .get(Bucket::Blocks, hash)?
            .ok_or_else(|| BlockchainError::NotFound(format!("block {}", hex::encode(hash))))?;
        Ok(Block::deserialize(&bytes)?)
    }

    /// Verify a batch of transactions, mine a block over them and append it.
    ///
    /// Any invalid transaction rejects the whole batch before mining starts.
    /// The caller is responsible for applying the block to the UTXO index.
    pub fn mine_block(&self, transactions: Vec<Transaction>) -> Result<Block, BlockchainError> {
        let mut spent = HashSet::new();
        for tx in &transactions {
            if tx.outputs.is_empty() {
                return Err(BlockchainError::InvalidTransaction(format!(
                    "{} has no outputs",
                    hex::encode(&tx.id)
                )));
            }
            if tx.inputs.is_empty() {
                return Err(BlockchainError::InvalidTransaction(format!(
                    "{} has no inputs",
                    hex::encode(&tx.id)
                )));
            }
            if !self.verify_transaction(tx)? {
                return Err(BlockchainError::InvalidTransaction(hex::encode(&tx.id)));
            }
            if tx.is_coinbase() {
                continue;
            }
            for input in &tx.inputs {
                if !spent.insert((input.prev_tx_id.clone(), input.output_index)) {
                    return Err(BlockchainError::InvalidTransaction(format!(
                        "{} spends {}:{} twice in one block",
                        hex::encode(&tx.id),
                        hex::encode(&input.prev_tx_id),
                        input.output_index
                    )));
                }
            }
        }

        let last_hash = self
            .store
            .get(Bucket::Blocks, TIP_KEY)?
            .ok_or(BlockchainError::NoChain)?;

        // No store transaction is held while searching for a nonce
        let block = Block::with_difficulty(transactions, last_hash, self.difficulty_bits)?;

        let mut batch = WriteBatch::new();
        batch.put(Bucket::Blocks, block.hash.clone(), block.serialize()?);
        batch.put(Bucket::Blocks, TIP_KEY, block.hash.clone());
        self.store.write(&batch)?;
        *self.tip.write() = block.hash.clone();

        info!(
            "Appended block {} with {} transaction(s)",
            hex::encode(&block.hash),
            block.tx_count()
        );

        Ok(block)
    }

    /// Walk the chain from the tip back to the genesis block
    pub fn iter(&self) -> BlockchainIterator<'_> {
        BlockchainIterator {
            blockchain: self,
            current_hash: Some(self.tip()),
        }
    }

    /// Number of blocks reachable from the tip
    pub fn height(&self) -> Result<u64, BlockchainError> {
        self.iter().try_fold(0u64, |count, block| block.map(|_| count + 1))
    }

    /// Find a transaction anywhere on the chain
    pub fn find_transaction(&self, id: &[u8]) -> Result<Transaction, BlockchainError> {
        for block in self.iter() {
            if let Some(tx) = block?.transactions.into_iter().find(|tx| tx.id == id) {
                return Ok(tx);
            }
        }
        Err(BlockchainError::NotFound(format!("transaction {}", hex::encode(id))))
    }

    /// Transactions holding at least one unspent output locked to `pub_key_hash`
    pub fn find_unspent_transactions(
        &self,
        pub_key_hash: &[u8],
    ) -> Result<Vec<Transaction>, BlockchainError> {
        let mut unspent = Vec::new();
        let mut spent: HashMap<Vec<u8>, HashSet<i64>> = HashMap::new();

        for block in self.iter() {
            for tx in block?.transactions {
                let spent_outputs = spent.get(&tx.id);
                let has_unspent = tx.outputs.iter().enumerate().any(|(index, output)| {
                    let index = index as i64;
                    !spent_outputs.is_some_and(|s| s.contains(&index))
                        && output.is_locked_with_key(pub_key_hash)
                });

                if !tx.is_coinbase() {
                    for input in &tx.inputs {
                        if input.uses_key(pub_key_hash) {
                            spent
                                .entry(input.prev_tx_id.clone())
                                .or_default()
                                .insert(input.output_index);
                        }
                    }
                }

                if has_unspent {
                    unspent.push(tx);
                }
            }
        }

        Ok(unspent)
    }

    /// Every unspent output on the chain, grouped by transaction id
    pub fn find_utxo(&self) -> Result<BTreeMap<Vec<u8>, TxOutputs>, BlockchainError> {
        let mut utxo: BTreeMap<Vec<u8>, TxOutputs> = BTreeMap::new();
        let mut spent: HashMap<Vec<u8>, HashSet<i64>> = HashMap::new();

        for block in self.iter() {
            for tx in block?.transactions {
                let spent_outputs = spent.get(&tx.id);
                for (index, output) in tx.outputs.iter().enumerate() {
                    let index = index as i64;
                    if spent_outputs.is_some_and(|s| s.contains(&index)) {
                        continue;
                    }
                    utxo.entry(tx.id.clone())
                        .or_default()
                        .outputs
                        .insert(index, output.clone());
                }

                if !tx.is_coinbase() {
                    for input in &tx.inputs {
                        spent
                            .entry(input.prev_tx_id.clone())
                            .or_default()
                            .insert(input.output_index);
                    }
                }
            }
        }

        Ok(utxo)
    }

    /// Transactions referenced by `tx`'s inputs, keyed by hex id.
    ///
    /// Ids that cannot be found are left out so that signing reports
    /// them and verification fails closed.
    fn referenced_transactions(
        &self,
        tx: &Transaction,
    ) -> Result<HashMap<String, Transaction>, BlockchainError> {
        let mut prev_txs = HashMap::new();
        for input in &tx.inputs {
            let key = hex::encode(&input.prev_tx_id);
            if prev_txs.contains_key(&key) {
                continue;
            }
            match self.find_transaction(&input.prev_tx_id) {
                Ok(prev_tx) => {
                    prev_txs.insert(key, prev_tx);
                }
                Err(BlockchainError::NotFound(what)) => warn!("Referenced {} is not on the chain", what),
                Err(e) => return Err(e),
            }
        }
        Ok(prev_txs)
    }

    /// Sign `tx` with `wallet` against the transactions it spends
    pub fn sign_transaction(
        &self,
        tx: &mut Transaction,
        wallet: &Wallet,
    ) -> Result<(), BlockchainError> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let prev_txs = self.referenced_transactions(tx)?;
        tx.sign(wallet, &prev_txs)?;
        Ok(())
    }

    /// Check that every input spends an output still present in the UTXO
    /// index and carries a valid signature
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool, BlockchainError> {
        if tx.is_coinbase() {
            return Ok(true);
        }

        let utxo_set = UtxoSet::new(self);
        for input in &tx.inputs {
            if utxo_set
                .find_output(&input.prev_tx_id, input.output_index)?
                .is_none()
            {
                warn!(
                    "Transaction {} spends unavailable output {}:{}",
                    hex::encode(&tx.id),
                    hex::encode(&input.prev_tx_id),
                    input.output_index
                );
                return Ok(false);
            }
        }

        let prev_txs = self.referenced_transactions(tx)?;
        Ok(tx.verify(&prev_txs))
    }
}

/// Lazy newest-to-oldest walk over the chain.
///
/// Yields the genesis block last, then stops. A read or decode failure is
/// yielded once and ends the walk.
pub struct BlockchainIterator<'a> {
    blockchain: &'a Blockchain,
    current_hash: Option<Vec<u8>>,
}

impl Iterator for BlockchainIterator<'_> {
    type Item = Result<Block, BlockchainError>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current_hash.take()?;
        let block = match self.blockchain.get_block(&hash) {
            Ok(block) => block,
            Err(e) => return Some(Err(e)),
        };

        if !block.is_genesis() {
            self.current_hash = Some(block.prev_hash.clone());
        }
        Some(Ok(block))
    }
}
