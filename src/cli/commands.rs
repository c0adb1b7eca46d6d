//! CLI commands for the ledger
//!
//! Implements all command handlers for the CLI interface.

use std::fs;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use crate::config::NodeConfig;
use crate::core::{BlockchainError, Ledger, TransactionError};
use crate::crypto::validate_address;
use crate::storage::SledStore;
use crate::wallet::Wallets;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Open the on-disk store of a node
fn open_store(config: &NodeConfig) -> CliResult<Arc<SledStore>> {
    fs::create_dir_all(&config.data_dir)?;
    Ok(Arc::new(SledStore::open(&config.db_path())?))
}

/// Open the existing chain of a node
fn open_ledger(config: &NodeConfig) -> CliResult<Ledger> {
    let store = open_store(config)?;
    match Ledger::open(store, config.difficulty_bits) {
        Ok(ledger) => Ok(ledger),
        Err(BlockchainError::NoChain) => {
            Err("No existing blockchain found. Create one with: ledger create-blockchain".into())
        }
        Err(e) => Err(e.into()),
    }
}

fn ensure_address(address: &str) -> CliResult<()> {
    if validate_address(address) {
        Ok(())
    } else {
        Err(format!("Address is not valid: {}", address).into())
    }
}

/// Create a new chain whose genesis reward goes to `address`
pub fn cmd_create_blockchain(config: &NodeConfig, address: &str) -> CliResult<()> {
    ensure_address(address)?;

    let store = open_store(config)?;
    let ledger = match Ledger::create_chain(store, address, config.difficulty_bits) {
        Ok(ledger) => ledger,
        Err(BlockchainError::AlreadyExists) => {
            return Err(format!("Blockchain already exists at {:?}", config.data_dir).into());
        }
        Err(e) => return Err(e.into()),
    };

    println!("✅ Blockchain created!");
    println!("   📁 Data directory: {:?}", config.data_dir);
    println!("   🔧 Difficulty: {} bits", config.difficulty_bits);
    println!("   🧱 Genesis block hash: {}", hex::encode(ledger.blockchain().tip()));

    Ok(())
}

/// Show the balance of an address
pub fn cmd_get_balance(config: &NodeConfig, address: &str) -> CliResult<()> {
    ensure_address(address)?;
    let ledger = open_ledger(config)?;

    let balance = ledger.balance_of(address)?;
    println!("💰 Balance of {}: {}", address, balance);

    Ok(())
}

/// Send coins from a local wallet, mining the transfer immediately
pub fn cmd_send(config: &NodeConfig, from: &str, to: &str, amount: u64) -> CliResult<()> {
    ensure_address(from)?;
    ensure_address(to)?;
    if amount == 0 {
        return Err("Amount must be at least 1".into());
    }

    let wallets = Wallets::load(&config.wallet_path())?;
    let wallet = wallets.get_wallet(from)?;
    let ledger = open_ledger(config)?;

    let block = match ledger.send(wallet, to, amount) {
        Ok(block) => block,
        Err(BlockchainError::TransactionError(TransactionError::InsufficientFunds {
            have,
            need,
        })) => {
            return Err(format!("Insufficient funds: have {}, need {}", have, need).into());
        }
        Err(e) => return Err(e.into()),
    };

    println!("📤 Sent {} from {} to {}", amount, from, to);
    println!("   ├─ Block: {}", hex::encode(&block.hash));
    println!("   └─ Nonce: {}", block.nonce);

    Ok(())
}

/// Print every block from the tip back to genesis
pub fn cmd_print_chain(config: &NodeConfig) -> CliResult<()> {
    let ledger = open_ledger(config)?;

    for entry in ledger.print_chain()? {
        let block = &entry.block;
        let time = Utc
            .timestamp_opt(block.timestamp, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| block.timestamp.to_string());

        println!("============ Block {} ============", hex::encode(&block.hash));
        println!("Prev. block: {}", hex::encode(&block.prev_hash));
        println!("Timestamp:   {}", time);
        println!("Nonce:       {}", block.nonce);
        println!("PoW:         {}", entry.pow_valid);
        for tx in &block.transactions {
            print!("{}", tx);
        }
        println!();
    }

    Ok(())
}

/// Generate a wallet and store it in the wallet file
pub fn cmd_create_wallet(config: &NodeConfig) -> CliResult<()> {
    let mut wallets = Wallets::load(&config.wallet_path())?;
    let address = wallets.create_wallet()?;

    println!("🔐 New wallet created!");
    println!("   📍 Address: {}", address);
    println!("\n   ⚠️  IMPORTANT: Your private key is stored in {:?}.", config.wallet_path());
    println!("   Back up this file to avoid losing access to your funds!");

    Ok(())
}

/// List the addresses of every local wallet
pub fn cmd_list_addresses(config: &NodeConfig) -> CliResult<()> {
    let wallets = Wallets::load(&config.wallet_path())?;

    if wallets.is_empty() {
        println!("📭 No wallets found. Create one with: ledger create-wallet");
        return Ok(());
    }

    for address in wallets.addresses() {
        println!("{}", address);
    }

    Ok(())
}

/// Rebuild the UTXO index from the chain
pub fn cmd_reindex_utxo(config: &NodeConfig) -> CliResult<()> {
    let ledger = open_ledger(config)?;
    let count = ledger.reindex()?;

    println!("✅ Done! There are {} transactions in the UTXO set.", count);

    Ok(())
}
