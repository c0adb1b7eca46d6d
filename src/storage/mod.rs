//! Storage module for chain persistence

pub mod codec;
pub mod memory;
pub mod sled_store;
pub mod store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use store::{Bucket, StorageError, Store, WriteBatch, WriteOp};
