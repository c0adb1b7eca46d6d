//! Transaction handling for the ledger
//!
//! Implements the UTXO transaction model: inputs reference outputs of
//! earlier transactions, outputs lock value to a public-key hash, and
//! every non-coinbase input carries an ECDSA signature over a trimmed
//! copy of the spending transaction.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bincode::{Decode, Encode};
use rand::RngCore;
use thiserror::Error;

use crate::core::blockchain::BlockchainError;
use crate::core::utxo_set::UtxoSet;
use crate::crypto::{decode_address, hash_pub_key, sha256, verify_signature, AddressError};
use crate::storage::{codec, StorageError};
use crate::wallet::{Wallet, WalletError};

/// Output index carried by the synthetic coinbase input
pub const COINBASE_OUTPUT_INDEX: i64 = -1;

/// Amount minted by a coinbase transaction
pub const BLOCK_REWARD: u64 = 10;

/// Number of random bytes used for a coinbase payload when none is given
const COINBASE_RANDOM_DATA_LEN: usize = 20;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Referenced input not found: {0}")]
    MissingInput(String),
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("Invalid amount: {0}")]
    InvalidAmount(u64),
    #[error("Address error: {0}")]
    AddressError(#[from] AddressError),
    #[error("Signing error: {0}")]
    SigningError(#[from] WalletError),
}

// =============================================================================
// Transaction Input
// =============================================================================

/// Transaction input (reference to a previous output)
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct TxInput {
    /// Id of the transaction holding the spent output
    pub prev_tx_id: Vec<u8>,
    /// Index of the output in the previous transaction
    pub output_index: i64,
    /// Compact ECDSA signature, empty until signed
    pub signature: Vec<u8>,
    /// Uncompressed public key of the spender (coinbase: arbitrary data)
    pub public_key: Vec<u8>,
}

impl TxInput {
    /// Check whether this input was created by the owner of `pub_key_hash`
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash_pub_key(&self.public_key) == pub_key_hash
    }
}

// =============================================================================
// Transaction Output
// =============================================================================

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct TxOutput {
    /// Amount of coins
    pub value: u64,
    /// Hash of the public key allowed to spend this output
    pub pub_key_hash: Vec<u8>,
}

impl TxOutput {
    /// Create an output locked to an address
    pub fn new(value: u64, address: &str) -> Result<Self, AddressError> {
        let mut output = Self {
            value,
            pub_key_hash: Vec::new(),
        };
        output.lock(address)?;
        Ok(output)
    }

    /// Create an output locked to a raw public-key hash
    pub fn locked_to(value: u64, pub_key_hash: &[u8]) -> Self {
        Self {
            value,
            pub_key_hash: pub_key_hash.to_vec(),
        }
    }

    /// Lock this output to the key behind `address`
    pub fn lock(&mut self, address: &str) -> Result<(), AddressError> {
        self.pub_key_hash = decode_address(address)?;
        Ok(())
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash == pub_key_hash
    }
}

/// Unspent outputs of one transaction, keyed by their original index.
///
/// Keeping the original index means a partially spent transaction still
/// resolves `output_index` references correctly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct TxOutputs {
    pub outputs: BTreeMap<i64, TxOutput>,
}

impl TxOutputs {
    /// Every output of a transaction, all unspent
    pub fn from_outputs(outputs: &[TxOutput]) -> Self {
        Self {
            outputs: outputs
                .iter()
                .enumerate()
                .map(|(index, output)| (index as i64, output.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, StorageError> {
        codec::encode(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
        codec::decode(bytes)
    }
}

/// A single unspent output together with its location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub tx_id: Vec<u8>,
    pub output_index: i64,
    pub output: TxOutput,
}

// =============================================================================
// Transaction
// =============================================================================

/// A ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Transaction {
    /// Content hash, computed with the id and all signatures blanked
    pub id: Vec<u8>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn referenced_output<'a>(
    prev_txs: &'a HashMap<String, Transaction>,
    input: &TxInput,
) -> Option<&'a TxOutput> {
    let prev_tx = prev_txs.get(&hex::encode(&input.prev_tx_id))?;
    let index = usize::try_from(input.output_index).ok()?;
    prev_tx.outputs.get(index)
}

/// Digest signed for input `index`: the trimmed copy with that input's
/// public-key field set to the locking hash of the output it spends
fn signing_digest(trimmed: &mut Transaction, index: usize, locking_hash: &[u8]) -> Vec<u8> {
    trimmed.inputs[index].public_key = locking_hash.to_vec();
    let digest = trimmed.hash();
    trimmed.inputs[index].public_key.clear();
    digest
}

impl Transaction {
    /// Create a coinbase transaction paying `BLOCK_REWARD` to `to`.
    ///
    /// An empty `data` is replaced with random bytes so that repeated
    /// rewards to the same address get distinct ids.
    pub fn new_coinbase(to: &str, data: &str) -> Result<Self, AddressError> {
        let data = if data.is_empty() {
            let mut random = [0u8; COINBASE_RANDOM_DATA_LEN];
            rand::thread_rng().fill_bytes(&mut random);
            hex::encode(random)
        } else {
            data.to_string()
        };

        let input = TxInput {
            prev_tx_id: Vec::new(),
            output_index: COINBASE_OUTPUT_INDEX,
            signature: Vec::new(),
            public_key: data.into_bytes(),
        };
        let output = TxOutput::new(BLOCK_REWARD, to)?;

        let mut tx = Self {
            id: Vec::new(),
            inputs: vec![input],
            outputs: vec![output],
        };
        tx.id = tx.hash();
        Ok(tx)
    }

    /// Build, fund and sign a transfer of `amount` from `from` to `to`
    pub fn new_utxo_transaction(
        from: &Wallet,
        to: &str,
        amount: u64,
        utxo_set: &UtxoSet<'_>,
    ) -> Result<Self, BlockchainError> {
        let to_hash = decode_address(to).map_err(TransactionError::from)?;
        if amount == 0 {
            return Err(TransactionError::InvalidAmount(amount).into());
        }

        let from_hash = from.pub_key_hash();
        let (accumulated, spendable) = utxo_set.find_spendable_outputs(&from_hash, amount)?;
        if accumulated < amount {
            return Err(TransactionError::InsufficientFunds {
                have: accumulated,
                need: amount,
            }
            .into());
        }

        let inputs = spendable
            .into_iter()
            .map(|utxo| TxInput {
                prev_tx_id: utxo.tx_id,
                output_index: utxo.output_index,
                signature: Vec::new(),
                public_key: from.public_key(),
            })
            .collect();

        let mut outputs = vec![TxOutput::locked_to(amount, &to_hash)];
        if accumulated > amount {
            outputs.push(TxOutput::locked_to(accumulated - amount, &from_hash));
        }

        let mut tx = Self {
            id: Vec::new(),
            inputs,
            outputs,
        };
        tx.id = tx.hash();

        utxo_set
            .blockchain()
            .sign_transaction(&mut tx, from)?;
        Ok(tx)
    }

    /// True for the single synthetic-input reward transaction
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_tx_id.is_empty()
            && self.inputs[0].output_index == COINBASE_OUTPUT_INDEX
    }

    /// Deterministic byte layout hashed for ids and signatures
    fn preimage(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_bytes(&mut buf, &self.id);

        buf.extend_from_slice(&(self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            write_bytes(&mut buf, &input.prev_tx_id);
            buf.extend_from_slice(&input.output_index.to_le_bytes());
            write_bytes(&mut buf, &input.signature);
            write_bytes(&mut buf, &input.public_key);
        }

        buf.extend_from_slice(&(self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_bytes(&mut buf, &output.pub_key_hash);
        }
        buf
    }

    /// Content hash with the id and every signature blanked
    pub fn hash(&self) -> Vec<u8> {
        let mut copy = self.clone();
        copy.id.clear();
        for input in &mut copy.inputs {
            input.signature.clear();
        }
        sha256(&copy.preimage())
    }

    /// Copy with every input's signature and public key cleared
    pub fn trimmed_copy(&self) -> Self {
        Self {
            id: self.id.clone(),
            inputs: self
                .inputs
                .iter()
                .map(|input| TxInput {
                    prev_tx_id: input.prev_tx_id.clone(),
                    output_index: input.output_index,
                    signature: Vec::new(),
                    public_key: Vec::new(),
                })
                .collect(),
            outputs: self.outputs.clone(),
        }
    }

    /// Sign every input with `wallet`'s key.
    ///
    /// `prev_txs` maps hex transaction ids to the transactions referenced
    /// by this one's inputs. Coinbase transactions are left untouched.
    pub fn sign(
        &mut self,
        wallet: &Wallet,
        prev_txs: &HashMap<String, Transaction>,
    ) -> Result<(), TransactionError> {
        if self.is_coinbase() {
            return Ok(());
        }

        // Resolve every spent output before touching any input
        let locking_hashes = self
            .inputs
            .iter()
            .map(|input| {
                referenced_output(prev_txs, input)
                    .map(|output| output.pub_key_hash.clone())
                    .ok_or_else(|| {
                        TransactionError::MissingInput(format!(
                            "{}:{}",
                            hex::encode(&input.prev_tx_id),
                            input.output_index
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let public_key = wallet.public_key();
        let mut trimmed = self.trimmed_copy();

        for (index, locking_hash) in locking_hashes.iter().enumerate() {
            let digest = signing_digest(&mut trimmed, index, locking_hash);
            self.inputs[index].signature = wallet.sign_digest(&digest)?;
            self.inputs[index].public_key = public_key.clone();
        }

        self.id = self.hash();
        Ok(())
    }

    /// Check every input signature against the outputs it spends.
    ///
    /// Returns `false` when a referenced transaction or output is missing,
    /// when an input's key does not own the spent output, or when any
    /// signature fails. Coinbase transactions are always valid.
    pub fn verify(&self, prev_txs: &HashMap<String, Transaction>) -> bool {
        if self.is_coinbase() {
            return true;
        }

        let mut trimmed = self.trimmed_copy();
        for (index, input) in self.inputs.iter().enumerate() {
            let Some(prev_output) = referenced_output(prev_txs, input) else {
                return false;
            };
            if !input.uses_key(&prev_output.pub_key_hash) {
                return false;
            }

            let digest = signing_digest(&mut trimmed, index, &prev_output.pub_key_hash);
            if !verify_signature(&input.public_key, &digest, &input.signature) {
                return false;
            }
        }

        true
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Transaction {}:", hex::encode(&self.id))?;

        for (index, input) in self.inputs.iter().enumerate() {
            writeln!(f, "     Input {}:", index)?;
            writeln!(f, "       TXID:      {}", hex::encode(&input.prev_tx_id))?;
            writeln!(f, "       Out:       {}", input.output_index)?;
            writeln!(f, "       Signature: {}", hex::encode(&input.signature))?;
            writeln!(f, "       PubKey:    {}", hex::encode(&input.public_key))?;
        }

        for (index, output) in self.outputs.iter().enumerate() {
            writeln!(f, "     Output {}:", index)?;
            writeln!(f, "       Value:  {}", output.value)?;
            writeln!(f, "       Script: {}", hex::encode(&output.pub_key_hash))?;
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
