//! UTXO index
//!
//! Caches the unspent outputs of the chain in the `chain_state` bucket,
//! one record per transaction id. The index is rebuilt from the chain by
//! [`UtxoSet::reindex`] and advanced block by block with [`UtxoSet::update`].

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::core::block::Block;
use crate::core::blockchain::{Blockchain, BlockchainError};
use crate::core::transaction::{TxOutput, TxOutputs, Utxo};
use crate::storage::{Bucket, WriteBatch};

/// View of the UTXO index backed by a chain's store
pub struct UtxoSet<'a> {
    blockchain: &'a Blockchain,
}

impl<'a> UtxoSet<'a> {
    pub fn new(blockchain: &'a Blockchain) -> Self {
        Self { blockchain }
    }

    pub fn blockchain(&self) -> &'a Blockchain {
        self.blockchain
    }

    /// Rebuild the index from a full chain scan.
    ///
    /// Old records are dropped and new ones written in one batch, so a
    /// failed rebuild leaves the previous index in place. Returns the
    /// number of transactions with unspent outputs.
    pub fn reindex(&self) -> Result<usize, BlockchainError> {
        let store = self.blockchain.store();
        let utxo = self.blockchain.find_utxo()?;

        let mut batch = WriteBatch::new();
        for (key, _) in store.scan(Bucket::ChainState)? {
            batch.delete(Bucket::ChainState, key);
        }
        for (tx_id, outputs) in &utxo {
            batch.put(Bucket::ChainState, tx_id.clone(), outputs.serialize()?);
        }
        store.write(&batch)?;

        info!("Reindexed UTXO set: {} transaction(s) with unspent outputs", utxo.len());
        Ok(utxo.len())
    }

    /// Apply a freshly appended block to the index.
    ///
    /// Spent outputs are removed from their records (a record left empty is
    /// deleted) and every transaction's outputs are added under its id. All
    /// changes land in a single batch.
    pub fn update(&self, block: &Block) -> Result<(), BlockchainError> {
        let mut pending: BTreeMap<Vec<u8>, Option<TxOutputs>> = BTreeMap::new();

        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let record = match pending.get(&input.prev_tx_id) {
                        Some(record) => record.clone(),
                        None => self.get_outputs(&input.prev_tx_id)?,
                    };

                    let Some(mut outputs) = record else {
                        warn!(
                            "UTXO record {} missing while applying block {}",
                            hex::encode(&input.prev_tx_id),
                            hex::encode(&block.hash)
                        );
                        continue;
                    };

                    outputs.outputs.remove(&input.output_index);
                    let record = if outputs.is_empty() { None } else { Some(outputs) };
                    pending.insert(input.prev_tx_id.clone(), record);
                }
            }

            if !tx.outputs.is_empty() {
                pending.insert(tx.id.clone(), Some(TxOutputs::from_outputs(&tx.outputs)));
            }
        }

        let mut batch = WriteBatch::new();
        for (tx_id, record) in pending {
            match record {
                Some(outputs) => batch.put(Bucket::ChainState, tx_id, outputs.serialize()?),
                None => batch.delete(Bucket::ChainState, tx_id),
            }
        }
        self.blockchain.store().write(&batch)?;

        debug!("Applied block {} to UTXO set", hex::encode(&block.hash));
        Ok(())
    }

    /// Collect outputs locked to `pub_key_hash` until `amount` is covered.
    ///
    /// Returns the accumulated value, which is below `amount` when the
    /// owner cannot cover it.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, Vec<Utxo>), BlockchainError> {
        let mut accumulated = 0u64;
        let mut spendable = Vec::new();

        'scan: for (tx_id, outputs) in self.entries()? {
            for (output_index, output) in outputs.outputs {
                if accumulated >= amount {
                    break 'scan;
                }
                if output.is_locked_with_key(pub_key_hash) {
                    accumulated = accumulated.saturating_add(output.value);
                    spendable.push(Utxo {
                        tx_id: tx_id.clone(),
                        output_index,
                        output,
                    });
                }
            }
        }

        Ok((accumulated, spendable))
    }

    /// Every unspent output locked to `pub_key_hash`
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TxOutput>, BlockchainError> {
        Ok(self
            .entries()?
            .into_values()
            .flat_map(|outputs| outputs.outputs.into_values())
            .filter(|output| output.is_locked_with_key(pub_key_hash))
            .collect())
    }

    /// Sum of every unspent output locked to `pub_key_hash`
    pub fn balance(&self, pub_key_hash: &[u8]) -> Result<u64, BlockchainError> {
        Ok(self
            .find_utxo(pub_key_hash)?
            .iter()
            .fold(0u64, |sum, output| sum.saturating_add(output.value)))
    }

    /// Unspent outputs recorded for one transaction
    pub fn get_outputs(&self, tx_id: &[u8]) -> Result<Option<TxOutputs>, BlockchainError> {
        match self.blockchain.store().get(Bucket::ChainState, tx_id)? {
            Some(bytes) => Ok(Some(TxOutputs::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// A single unspent output, if it is still in the index
    pub fn find_output(
        &self,
        tx_id: &[u8],
        output_index: i64,
    ) -> Result<Option<TxOutput>, BlockchainError> {
        Ok(self
            .get_outputs(tx_id)?
            .and_then(|mut outputs| outputs.outputs.remove(&output_index)))
    }

    /// Every record of the index, ordered by transaction id
    pub fn entries(&self) -> Result<BTreeMap<Vec<u8>, TxOutputs>, BlockchainError> {
        self.blockchain
            .store()
            .scan(Bucket::ChainState)?
            .into_iter()
            .map(|(tx_id, bytes)| -> Result<_, BlockchainError> {
                Ok((tx_id, TxOutputs::deserialize(&bytes)?))
            })
            .collect()
    }

    /// Number of transactions with at least one unspent output
    pub fn count_transactions(&self) -> Result<usize, BlockchainError> {
        Ok(self.blockchain.store().scan(Bucket::ChainState)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::transaction::{
        Transaction, TransactionError, TxInput, TxOutput, BLOCK_REWARD,
    };
    use crate::storage::{MemoryStore, Store};
    use crate::wallet::Wallet;

    const TEST_BITS: u32 = 8;

    fn new_chain(owner: &Wallet) -> (Arc<MemoryStore>, Blockchain) {
        let store = Arc::new(MemoryStore::new());
        let chain = Blockchain::create(store.clone(), &owner.address(), TEST_BITS).unwrap();
        UtxoSet::new(&chain).reindex().unwrap();
        (store, chain)
    }

    fn send(chain: &Blockchain, from: &Wallet, to: &Wallet, amount: u64) -> Block {
        let utxo_set = UtxoSet::new(chain);
        let tx = Transaction::new_utxo_transaction(from, &to.address(), amount, &utxo_set).unwrap();
        let block = chain.mine_block(vec![tx]).unwrap();
        utxo_set.update(&block).unwrap();
        block
    }

    /// The incrementally maintained index matches a fresh rebuild
    fn assert_matches_rebuild(chain: &Blockchain) {
        let utxo_set = UtxoSet::new(chain);
        let incremental = utxo_set.entries().unwrap();
        assert_eq!(incremental, chain.find_utxo().unwrap());

        utxo_set.reindex().unwrap();
        assert_eq!(utxo_set.entries().unwrap(), incremental);
    }

    #[test]
    fn test_reindex_genesis() {
        let owner = Wallet::new();
        let (_, chain) = new_chain(&owner);
        let utxo_set = UtxoSet::new(&chain);

        assert_eq!(utxo_set.count_transactions().unwrap(), 1);
        assert_eq!(utxo_set.balance(&owner.pub_key_hash()).unwrap(), BLOCK_REWARD);
        assert_eq!(utxo_set.balance(&Wallet::new().pub_key_hash()).unwrap(), 0);
    }

    #[test]
    fn test_reindex_replaces_stale_records() {
        let owner = Wallet::new();
        let (store, chain) = new_chain(&owner);

        let mut batch = WriteBatch::new();
        batch.put(
            Bucket::ChainState,
            vec![0xAB; 32],
            TxOutputs::from_outputs(&[TxOutput::locked_to(99, &owner.pub_key_hash())])
                .serialize()
                .unwrap(),
        );
        store.write(&batch).unwrap();

        let utxo_set = UtxoSet::new(&chain);
        assert_eq!(utxo_set.count_transactions().unwrap(), 2);
        assert_eq!(utxo_set.reindex().unwrap(), 1);
        assert_eq!(utxo_set.balance(&owner.pub_key_hash()).unwrap(), BLOCK_REWARD);
    }

    #[test]
    fn test_update_tracks_spends() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let (_, chain) = new_chain(&alice);

        send(&chain, &alice, &bob, 3);
        let utxo_set = UtxoSet::new(&chain);
        assert_eq!(utxo_set.balance(&alice.pub_key_hash()).unwrap(), BLOCK_REWARD - 3);
        assert_eq!(utxo_set.balance(&bob.pub_key_hash()).unwrap(), 3);
        assert_matches_rebuild(&chain);

        send(&chain, &bob, &alice, 2);
        assert_eq!(utxo_set.balance(&alice.pub_key_hash()).unwrap(), BLOCK_REWARD - 1);
        assert_eq!(utxo_set.balance(&bob.pub_key_hash()).unwrap(), 1);
        assert_matches_rebuild(&chain);
    }

    #[test]
    fn test_partial_spend_keeps_output_index() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let carol = Wallet::new();
        let (_, chain) = new_chain(&alice);

        // Output 0 goes to bob, output 1 is alice's change
        let first = send(&chain, &alice, &bob, 4);
        let first_id = first.transactions[0].id.clone();

        // Spending bob's output leaves only index 1 in the record
        send(&chain, &bob, &carol, 4);
        let utxo_set = UtxoSet::new(&chain);
        let record = utxo_set.get_outputs(&first_id).unwrap().unwrap();
        assert_eq!(record.outputs.keys().copied().collect::<Vec<_>>(), vec![1]);

        // Alice can still spend her change at its original index
        let block = send(&chain, &alice, &carol, BLOCK_REWARD - 4);
        assert_eq!(block.transactions[0].inputs[0].output_index, 1);
        assert!(utxo_set.get_outputs(&first_id).unwrap().is_none());
        assert_eq!(utxo_set.balance(&carol.pub_key_hash()).unwrap(), BLOCK_REWARD);
        assert_matches_rebuild(&chain);
    }

    #[test]
    fn test_find_spendable_outputs_stops_when_covered() {
        let alice = Wallet::new();
        let (_, chain) = new_chain(&alice);
        let utxo_set = UtxoSet::new(&chain);

        for _ in 0..3 {
            let reward = Transaction::new_coinbase(&alice.address(), "").unwrap();
            let block = chain.mine_block(vec![reward]).unwrap();
            utxo_set.update(&block).unwrap();
        }

        let (accumulated, outputs) = utxo_set
            .find_spendable_outputs(&alice.pub_key_hash(), BLOCK_REWARD + 1)
            .unwrap();
        assert_eq!(accumulated, 2 * BLOCK_REWARD);
        assert_eq!(outputs.len(), 2);

        let (accumulated, outputs) = utxo_set
            .find_spendable_outputs(&alice.pub_key_hash(), 1000)
            .unwrap();
        assert_eq!(accumulated, 4 * BLOCK_REWARD);
        assert_eq!(outputs.len(), 4);
    }

    #[test]
    fn test_spent_output_cannot_be_spent_again() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let (_, chain) = new_chain(&alice);
        let utxo_set = UtxoSet::new(&chain);

        // Both spends are built against the same genesis output
        let first =
            Transaction::new_utxo_transaction(&alice, &bob.address(), 5, &utxo_set).unwrap();
        let second =
            Transaction::new_utxo_transaction(&alice, &bob.address(), 6, &utxo_set).unwrap();

        let block = chain.mine_block(vec![first]).unwrap();
        utxo_set.update(&block).unwrap();

        let height = chain.height().unwrap();
        assert!(matches!(
            chain.mine_block(vec![second]),
            Err(BlockchainError::InvalidTransaction(_))
        ));
        assert_eq!(chain.height().unwrap(), height);
        assert_matches_rebuild(&chain);
    }

    #[test]
    fn test_spend_without_outputs_is_rejected() {
        let alice = Wallet::new();
        let (_, chain) = new_chain(&alice);
        let genesis_tx_id = chain.get_block(&chain.tip()).unwrap().transactions[0].id.clone();

        let mut tx = Transaction {
            id: vec![],
            inputs: vec![TxInput {
                prev_tx_id: genesis_tx_id,
                output_index: 0,
                signature: vec![],
                public_key: alice.public_key(),
            }],
            outputs: vec![],
        };
        tx.id = tx.hash();
        chain.sign_transaction(&mut tx, &alice).unwrap();
        assert!(chain.verify_transaction(&tx).unwrap());

        assert!(matches!(
            chain.mine_block(vec![tx]),
            Err(BlockchainError::InvalidTransaction(_))
        ));
        assert_eq!(chain.height().unwrap(), 1);
        assert_eq!(UtxoSet::new(&chain).balance(&alice.pub_key_hash()).unwrap(), BLOCK_REWARD);
        assert_matches_rebuild(&chain);
    }

    #[test]
    fn test_transaction_without_inputs_is_rejected() {
        let alice = Wallet::new();
        let (_, chain) = new_chain(&alice);

        let mut tx = Transaction {
            id: vec![],
            inputs: vec![],
            outputs: vec![TxOutput::new(100, &alice.address()).unwrap()],
        };
        tx.id = tx.hash();
        assert!(!tx.is_coinbase());

        assert!(matches!(
            chain.mine_block(vec![tx]),
            Err(BlockchainError::InvalidTransaction(_))
        ));
        assert_eq!(chain.height().unwrap(), 1);
        assert_eq!(UtxoSet::new(&chain).balance(&alice.pub_key_hash()).unwrap(), BLOCK_REWARD);
        assert_matches_rebuild(&chain);
    }

    #[test]
    fn test_update_skips_transactions_without_outputs() {
        let alice = Wallet::new();
        let (_, chain) = new_chain(&alice);

        let mut empty = Transaction::new_coinbase(&alice.address(), "").unwrap();
        empty.outputs.clear();
        empty.id = empty.hash();
        let block = Block::with_difficulty(vec![empty.clone()], chain.tip(), TEST_BITS).unwrap();

        let utxo_set = UtxoSet::new(&chain);
        utxo_set.update(&block).unwrap();
        assert!(utxo_set.get_outputs(&empty.id).unwrap().is_none());
        assert_eq!(utxo_set.count_transactions().unwrap(), 1);
    }

    #[test]
    fn test_insufficient_funds() {
        let alice = Wallet::new();
        let (_, chain) = new_chain(&alice);
        let utxo_set = UtxoSet::new(&chain);

        let result = Transaction::new_utxo_transaction(
            &alice,
            &Wallet::new().address(),
            BLOCK_REWARD + 1,
            &utxo_set,
        );
        assert!(matches!(
            result,
            Err(BlockchainError::TransactionError(TransactionError::InsufficientFunds {
                have: BLOCK_REWARD,
                need
            })) if need == BLOCK_REWARD + 1
        ));
    }

    #[test]
    fn test_update_with_missing_record_is_tolerated() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let (store, chain) = new_chain(&alice);
        let utxo_set = UtxoSet::new(&chain);

        let tx = Transaction::new_utxo_transaction(&alice, &bob.address(), 3, &utxo_set).unwrap();
        let block = chain.mine_block(vec![tx.clone()]).unwrap();

        let mut batch = WriteBatch::new();
        batch.delete(Bucket::ChainState, tx.inputs[0].prev_tx_id.clone());
        store.write(&batch).unwrap();

        utxo_set.update(&block).unwrap();
        assert_eq!(utxo_set.balance(&bob.pub_key_hash()).unwrap(), 3);
    }

    #[test]
    fn test_corrupt_record_surfaces() {
        let alice = Wallet::new();
        let (store, chain) = new_chain(&alice);

        let mut batch = WriteBatch::new();
        batch.put(Bucket::ChainState, vec![1u8; 32], vec![0xFF]);
        store.write(&batch).unwrap();

        assert!(matches!(
            UtxoSet::new(&chain).find_utxo(&alice.pub_key_hash()),
            Err(BlockchainError::StorageError(_))
        ));
    }
}
