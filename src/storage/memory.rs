//! In-memory store
//!
//! Same ordering and atomicity as the sled store, without touching disk.
//! Used by tests and throwaway chains.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::store::{Bucket, StorageError, Store, WriteBatch, WriteOp};

type Tree = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    trees: RwLock<BTreeMap<Bucket, Tree>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let trees = self.trees.read();
        Ok(trees.get(&bucket).and_then(|tree| tree.get(key)).cloned())
    }

    fn scan(&self, bucket: Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let trees = self.trees.read();
        Ok(trees
            .get(&bucket)
            .map(|tree| tree.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn write(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        // Holding the write guard for the whole batch makes it atomic
        let mut trees = self.trees.write();
        for op in batch.ops() {
            match op {
                WriteOp::Put { bucket, key, value } => {
                    trees
                        .entry(*bucket)
                        .or_default()
                        .insert(key.clone(), value.clone());
                }
                WriteOp::Delete { bucket, key } => {
                    if let Some(tree) = trees.get_mut(bucket) {
                        tree.remove(key);
                    }
                }
            }
        }
        Ok(())
    }
}
