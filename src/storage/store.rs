//! Abstract key-value store used by the chain and the UTXO index
//!
//! The store is an ordered byte-key map split into buckets. Reads are
//! point lookups or ordered scans; writes are grouped in a [`WriteBatch`]
//! and committed atomically across buckets.

use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Corrupt data: {0}")]
    Corrupt(String),
    #[error("Encoding error: {0}")]
    Encode(String),
    #[error("Transaction aborted")]
    Aborted,
}

/// Logical buckets of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    /// Block hash -> encoded block, plus the tip pointer
    Blocks,
    /// Transaction id -> encoded unspent outputs
    ChainState,
}

impl Bucket {
    /// On-disk name of the bucket
    pub fn name(&self) -> &'static str {
        match self {
            Bucket::Blocks => "blocks",
            Bucket::ChainState => "chain_state",
        }
    }
}

/// A single mutation inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        bucket: Bucket,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        bucket: Bucket,
        key: Vec<u8>,
    },
}

/// Ordered list of mutations applied as one atomic transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, bucket: Bucket, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Put {
            bucket,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, bucket: Bucket, key: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Delete {
            bucket,
            key: key.into(),
        });
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Ordered byte-key store with atomic batch writes.
///
/// Implementations must apply a batch entirely or not at all, and must
/// serialize concurrent batches against each other.
pub trait Store: Send + Sync {
    /// Read a single value
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// All entries of a bucket in ascending key order
    fn scan(&self, bucket: Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Apply every operation of the batch atomically
    fn write(&self, batch: &WriteBatch) -> Result<(), StorageError>;
}
