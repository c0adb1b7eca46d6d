//! UTXO Ledger CLI Application
//!
//! A command-line interface for creating, inspecting and spending on a
//! single-node ledger.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use utxo_ledger::cli;
use utxo_ledger::config::{NodeConfig, DEFAULT_DATA_DIR};

#[derive(Parser)]
#[command(name = "ledger")]
#[command(version = "0.1.0")]
#[command(about = "A single-node UTXO ledger with proof of work", long_about = None)]
struct Cli {
    /// Data directory for chain and wallet storage
    #[arg(short, long, global = true, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a blockchain and send the genesis reward to ADDRESS
    CreateBlockchain {
        #[arg(short, long)]
        address: String,
    },

    /// Show the balance of ADDRESS
    GetBalance {
        #[arg(short, long)]
        address: String,
    },

    /// Send AMOUNT of coins from FROM to TO and mine the transfer
    Send {
        /// Sender's wallet address
        #[arg(short, long)]
        from: String,

        /// Recipient's address
        #[arg(short, long)]
        to: String,

        /// Amount to send
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        amount: u64,
    },

    /// Print every block of the chain, newest first
    PrintChain,

    /// Generate a new key pair and save it to the wallet file
    CreateWallet,

    /// List the addresses in the wallet file
    ListAddresses,

    /// Rebuild the UTXO set from the chain
    ReindexUtxo,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = NodeConfig::new(cli.data_dir);

    match cli.command {
        Commands::CreateBlockchain { address } => {
            cli::cmd_create_blockchain(&config, &address)?;
        }

        Commands::GetBalance { address } => {
            cli::cmd_get_balance(&config, &address)?;
        }

        Commands::Send { from, to, amount } => {
            cli::cmd_send(&config, &from, &to, amount)?;
        }

        Commands::PrintChain => {
            cli::cmd_print_chain(&config)?;
        }

        Commands::CreateWallet => {
            cli::cmd_create_wallet(&config)?;
        }

        Commands::ListAddresses => {
            cli::cmd_list_addresses(&config)?;
        }

        Commands::ReindexUtxo => {
            cli::cmd_reindex_utxo(&config)?;
        }
    }

    Ok(())
}
