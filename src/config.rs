//! Node configuration

use std::path::{Path, PathBuf};

use crate::core::TARGET_BITS;

/// Default data directory, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = ".blockchain_data";

/// Where a node keeps its files and how hard it mines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub difficulty_bits: u32,
}

impl NodeConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_difficulty(mut self, difficulty_bits: u32) -> Self {
        self.difficulty_bits = difficulty_bits;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory of the sled database
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("chain_db")
    }

    /// JSON file holding the node's wallets
    pub fn wallet_path(&self) -> PathBuf {
        self.data_dir.join("wallets.json")
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            difficulty_bits: TARGET_BITS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.difficulty_bits, 24);
        assert_eq!(config.db_path(), PathBuf::from(".blockchain_data/chain_db"));
        assert_eq!(config.wallet_path(), PathBuf::from(".blockchain_data/wallets.json"));
    }

    #[test]
    fn test_custom_config() {
        let config = NodeConfig::new("/tmp/node").with_difficulty(8);
        assert_eq!(config.difficulty_bits, 8);
        assert_eq!(config.data_dir(), Path::new("/tmp/node"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/node/chain_db"));
    }
}
