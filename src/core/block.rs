//! Block implementation for the ledger
//!
//! A block holds an ordered, non-empty list of transactions, the hash of
//! its predecessor, and the nonce/hash pair found by proof of work.

use bincode::{Decode, Encode};
use chrono::Utc;
use thiserror::Error;

use crate::core::pow::{ProofOfWork, TARGET_BITS};
use crate::core::transaction::Transaction;
use crate::crypto::sha256;
use crate::storage::{codec, StorageError};

/// Block errors
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Nonce space exhausted without meeting the target")]
    Exhausted,
    #[error("A block must contain at least one transaction")]
    Empty,
}

/// A block in the chain
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Block {
    /// Creation time in seconds since the Unix epoch
    pub timestamp: i64,
    /// Transactions in inclusion order
    pub transactions: Vec<Transaction>,
    /// Hash of the previous block; empty for the genesis block
    pub prev_hash: Vec<u8>,
    /// Proof-of-work hash of this block
    pub hash: Vec<u8>,
    /// Nonce found by mining
    pub nonce: u64,
}

/// SHA-256 over the concatenated transaction ids, in order
pub fn hash_transactions(transactions: &[Transaction]) -> Vec<u8> {
    let ids: Vec<u8> = transactions
        .iter()
        .flat_map(|tx| tx.id.iter().copied())
        .collect();
    sha256(&ids)
}

impl Block {
    /// Mine a new block at the default difficulty
    pub fn new(transactions: Vec<Transaction>, prev_hash: Vec<u8>) -> Result<Self, BlockError> {
        Self::with_difficulty(transactions, prev_hash, TARGET_BITS)
    }

    /// Mine a new block at the given difficulty.
    ///
    /// Blocks the caller until a nonce is found.
    pub fn with_difficulty(
        transactions: Vec<Transaction>,
        prev_hash: Vec<u8>,
        difficulty_bits: u32,
    ) -> Result<Self, BlockError> {
        if transactions.is_empty() {
            return Err(BlockError::Empty);
        }

        let timestamp = Utc::now().timestamp();
        let (nonce, hash) = ProofOfWork::new(
            &prev_hash,
            hash_transactions(&transactions),
            timestamp,
            difficulty_bits,
        )
        .run()?;

        Ok(Self {
            timestamp,
            transactions,
            prev_hash,
            hash,
            nonce,
        })
    }

    /// Create the genesis block
    pub fn genesis(coinbase: Transaction) -> Result<Self, BlockError> {
        Self::new(vec![coinbase], Vec::new())
    }

    /// Create the genesis block at the given difficulty
    pub fn genesis_with_difficulty(
        coinbase: Transaction,
        difficulty_bits: u32,
    ) -> Result<Self, BlockError> {
        Self::with_difficulty(vec![coinbase], Vec::new(), difficulty_bits)
    }

    /// Digest of this block's transaction ids
    pub fn hash_transactions(&self) -> Vec<u8> {
        hash_transactions(&self.transactions)
    }

    /// Proof-of-work view of this block's header material
    pub fn proof_of_work(&self, difficulty_bits: u32) -> ProofOfWork<'_> {
        ProofOfWork::new(
            &self.prev_hash,
            self.hash_transactions(),
            self.timestamp,
            difficulty_bits,
        )
    }

    /// Check the stored nonce against the target
    pub fn is_valid_pow(&self, difficulty_bits: u32) -> bool {
        self.proof_of_work(difficulty_bits).validate(self.nonce)
    }

    /// Check that the stored hash matches the header material
    pub fn verify_hash(&self, difficulty_bits: u32) -> bool {
        self.hash == self.proof_of_work(difficulty_bits).hash_for(self.nonce)
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_empty()
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, StorageError> {
        codec::encode(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
        codec::decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{TxInput, TxOutput};
    use crate::crypto::KeyPair;
    use proptest::prelude::*;

    const TEST_BITS: u32 = 8;

    fn coinbase() -> Transaction {
        Transaction::new_coinbase(&KeyPair::generate().address(), "").unwrap()
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis_with_difficulty(coinbase(), TEST_BITS).unwrap();

        assert!(genesis.is_genesis());
        assert_eq!(genesis.hash.len(), 32);
        assert!(genesis.is_valid_pow(TEST_BITS));
        assert!(genesis.verify_hash(TEST_BITS));
    }

    #[test]
    fn test_block_links_to_previous() {
        let genesis = Block::genesis_with_difficulty(coinbase(), TEST_BITS).unwrap();
        let block =
            Block::with_difficulty(vec![coinbase()], genesis.hash.clone(), TEST_BITS).unwrap();

        assert!(!block.is_genesis());
        assert_eq!(block.prev_hash, genesis.hash);
        assert!(block.is_valid_pow(TEST_BITS));
    }

    #[test]
    fn test_empty_block_rejected() {
        assert!(matches!(
            Block::with_difficulty(vec![], Vec::new(), TEST_BITS),
            Err(BlockError::Empty)
        ));
    }

    #[test]
    fn test_tampering_breaks_pow() {
        let mut block = Block::genesis_with_difficulty(coinbase(), TEST_BITS).unwrap();
        assert!(block.verify_hash(TEST_BITS));

        block.nonce += 1;
        assert!(!block.verify_hash(TEST_BITS));

        let mut block = Block::genesis_with_difficulty(coinbase(), TEST_BITS).unwrap();
        block.transactions.push(coinbase());
        assert!(!block.verify_hash(TEST_BITS));
    }

    #[test]
    fn test_transaction_digest_is_order_sensitive() {
        let a = coinbase();
        let b = coinbase();

        let forward = hash_transactions(&[a.clone(), b.clone()]);
        let backward = hash_transactions(&[b, a.clone()]);
        assert_ne!(forward, backward);

        let mut ids = a.id.clone();
        ids.extend_from_slice(&a.id);
        assert_eq!(hash_transactions(&[a.clone(), a]), sha256(&ids));
    }

    #[test]
    fn test_serialize_round_trip() {
        let block = Block::genesis_with_difficulty(coinbase(), TEST_BITS).unwrap();
        let decoded = Block::deserialize(&block.serialize().unwrap()).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_deserialize_corrupt() {
        let block = Block::genesis_with_difficulty(coinbase(), TEST_BITS).unwrap();
        let bytes = block.serialize().unwrap();

        assert!(matches!(
            Block::deserialize(&bytes[..bytes.len() / 2]),
            Err(StorageError::Corrupt(_))
        ));
        assert!(matches!(
            Block::deserialize(&[]),
            Err(StorageError::Corrupt(_))
        ));
    }

    fn arb_input() -> impl Strategy<Value = TxInput> {
        (
            prop::collection::vec(any::<u8>(), 0..33),
            any::<i64>(),
            prop::collection::vec(any::<u8>(), 0..65),
            prop::collection::vec(any::<u8>(), 0..66),
        )
            .prop_map(|(prev_tx_id, output_index, signature, public_key)| TxInput {
                prev_tx_id,
                output_index,
                signature,
                public_key,
            })
    }

    fn arb_output() -> impl Strategy<Value = TxOutput> {
        (any::<u64>(), prop::collection::vec(any::<u8>(), 0..21))
            .prop_map(|(value, pub_key_hash)| TxOutput {
                value,
                pub_key_hash,
            })
    }

    fn arb_transaction() -> impl Strategy<Value = Transaction> {
        (
            prop::collection::vec(any::<u8>(), 0..33),
            prop::collection::vec(arb_input(), 0..4),
            prop::collection::vec(arb_output(), 0..4),
        )
            .prop_map(|(id, inputs, outputs)| Transaction {
                id,
                inputs,
                outputs,
            })
    }

    proptest! {
        #[test]
        fn prop_block_round_trip(
            timestamp in any::<i64>(),
            transactions in prop::collection::vec(arb_transaction(), 0..4),
            prev_hash in prop::collection::vec(any::<u8>(), 0..33),
            hash in prop::collection::vec(any::<u8>(), 0..33),
            nonce in any::<u64>(),
        ) {
            let block = Block { timestamp, transactions, prev_hash, hash, nonce };
            let decoded = Block::deserialize(&block.serialize().unwrap()).unwrap();
            prop_assert_eq!(decoded, block);
        }

        #[test]
        fn prop_block_truncation_detected(
            transactions in prop::collection::vec(arb_transaction(), 1..3),
            nonce in any::<u64>(),
            cut in any::<prop::sample::Index>(),
        ) {
            let block = Block { timestamp: 1, transactions, prev_hash: vec![], hash: vec![0; 32], nonce };
            let bytes = block.serialize().unwrap();
            let cut = cut.index(bytes.len());
            prop_assert!(Block::deserialize(&bytes[..cut]).is_err());
        }
    }
}
