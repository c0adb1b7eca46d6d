//! Persistent store backed by sled
//!
//! Each bucket maps to one sled tree. Batches run as a single
//! multi-tree sled transaction and are flushed before returning.

use std::path::Path;

use log::debug;
use sled::transaction::{TransactionError, TransactionResult};
use sled::{Db, Transactional, Tree};

use super::store::{Bucket, StorageError, Store, WriteBatch, WriteOp};

pub struct SledStore {
    db: Db,
    blocks: Tree,
    chain_state: Tree,
}

impl SledStore {
    /// Open (or create) a store at the given directory
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        debug!("Opening sled store at {:?}", path);
        Self::from_db(sled::open(path)?)
    }

    /// A store that is deleted when dropped
    pub fn temporary() -> Result<Self, StorageError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let blocks = db.open_tree(Bucket::Blocks.name())?;
        let chain_state = db.open_tree(Bucket::ChainState.name())?;
        Ok(Self {
            db,
            blocks,
            chain_state,
        })
    }

    fn tree(&self, bucket: Bucket) -> &Tree {
        match bucket {
            Bucket::Blocks => &self.blocks,
            Bucket::ChainState => &self.chain_state,
        }
    }
}

impl Store for SledStore {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.tree(bucket).get(key)?.map(|value| value.to_vec()))
    }

    fn scan(&self, bucket: Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        self.tree(bucket)
            .iter()
            .map(|entry| -> Result<_, StorageError> {
                let (key, value) = entry?;
                Ok((key.to_vec(), value.to_vec()))
            })
            .collect()
    }

    fn write(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }

        let result: TransactionResult<(), ()> =
            (&self.blocks, &self.chain_state).transaction(|(blocks, chain_state)| {
                for op in batch.ops() {
                    match op {
                        WriteOp::Put { bucket, key, value } => {
                            let tree = match bucket {
                                Bucket::Blocks => blocks,
                                Bucket::ChainState => chain_state,
                            };
                            tree.insert(key.as_slice(), value.as_slice())?;
                        }
                        WriteOp::Delete { bucket, key } => {
                            let tree = match bucket {
                                Bucket::Blocks => blocks,
                                Bucket::ChainState => chain_state,
                            };
                            tree.remove(key.as_slice())?;
                        }
                    }
                }
                Ok(())
            });

        result.map_err(|e| match e {
            TransactionError::Abort(()) => StorageError::Aborted,
            TransactionError::Storage(e) => StorageError::Sled(e),
        })?;

        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_spans_buckets() {
        let store = SledStore::temporary().unwrap();

        let mut batch = WriteBatch::new();
        batch.put(Bucket::Blocks, b"l".to_vec(), b"tip".to_vec());
        batch.put(Bucket::ChainState, b"tx".to_vec(), b"outs".to_vec());
        store.write(&batch).unwrap();

        assert_eq!(store.get(Bucket::Blocks, b"l").unwrap(), Some(b"tip".to_vec()));
        assert_eq!(
            store.get(Bucket::ChainState, b"tx").unwrap(),
            Some(b"outs".to_vec())
        );
        // Buckets are independent key spaces
        assert_eq!(store.get(Bucket::Blocks, b"tx").unwrap(), None);
    }

    #[test]
    fn test_reopen_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("db");

        {
            let store = SledStore::open(&path).unwrap();
            let mut batch = WriteBatch::new();
            batch.put(Bucket::ChainState, vec![2], vec![1]);
            batch.put(Bucket::ChainState, vec![1], vec![1]);
            store.write(&batch).unwrap();
        }

        let store = SledStore::open(&path).unwrap();
        let entries = store.scan(Bucket::ChainState).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, vec![1]);

        let mut batch = WriteBatch::new();
        batch.delete(Bucket::ChainState, vec![1]);
        store.write(&batch).unwrap();
        assert_eq!(store.scan(Bucket::ChainState).unwrap().len(), 1);
    }
}
