//! Transaction structure
//!
//! The subset of a transaction the stake kernel reads: outpoints, values,
//! the PoS transaction time and the Schnorr proof of input ownership.

use serde::{Deserialize, Serialize};

use crate::constants::SEQUENCE_FINAL;
use crate::crypto::{Hash, HashWriter, PublicKey, SchnorrSignature};

/// Reference to an output of a previous transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Hash of the transaction containing the output
    pub hash: Hash,
    /// Index of the output in that transaction
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash, index: u32) -> Self {
        Self { hash, index }
    }

    pub fn null() -> Self {
        Self {
            hash: Hash::zero(),
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.index == u32::MAX
    }
}

/// Purpose a zerocoin spend was created for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpendType {
    Spend,
    Stake,
    Mint,
    Signature,
}

/// Zerocoin spend as exposed by the external zerocoin layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZerocoinSpend {
    pub spend_type: SpendType,
    /// Hash of the coin's serial number
    pub serial_hash: Hash,
    /// Denomination in whole coins
    pub denomination: u64,
    /// Block the spend's accumulator checkpoint was taken from
    pub checkpoint_block: Hash,
}

/// A transaction input referencing a previous output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    pub prevout: OutPoint,
    /// Signature proving ownership
    pub signature: SchnorrSignature,
    /// Public key of the signer
    pub public_key: PublicKey,
    pub sequence: u32,
    /// Present when the input spends a zerocoin instead of an outpoint
    pub zerocoin: Option<ZerocoinSpend>,
}

impl TxInput {
    /// Unsigned input spending `prevout`
    pub fn new(prevout: OutPoint) -> Self {
        Self {
            prevout,
            signature: SchnorrSignature([0u8; 64]),
            public_key: PublicKey([0u8; 32]),
            sequence: SEQUENCE_FINAL,
            zerocoin: None,
        }
    }

    pub fn zerocoin_spend(spend: ZerocoinSpend) -> Self {
        Self {
            zerocoin: Some(spend),
            ..Self::new(OutPoint::null())
        }
    }

    pub fn is_final(&self) -> bool {
        self.sequence == SEQUENCE_FINAL
    }

    pub fn is_zerocoin_spend(&self) -> bool {
        self.zerocoin.is_some()
    }
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount in base units
    pub amount: u64,
    /// Public key hash of the recipient
    pub pubkey_hash: Hash,
}

impl TxOutput {
    /// The empty marker output that opens a coinstake
    pub fn empty() -> Self {
        Self {
            amount: 0,
            pubkey_hash: Hash::zero(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.amount == 0 && self.pubkey_hash.is_zero()
    }
}

/// A complete transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    /// Transaction timestamp, part of the legacy stake kernel
    pub time: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Lock time (block height or timestamp)
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(time: u32, inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: 1,
            time,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    /// Create a coinbase transaction paying `reward` to `owner`
    pub fn coinbase(reward: u64, owner: Hash, time: u32) -> Self {
        Self::new(
            time,
            vec![TxInput::new(OutPoint::null())],
            vec![TxOutput {
                amount: reward,
                pubkey_hash: owner,
            }],
        )
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null() && !self.inputs[0].is_zerocoin_spend()
    }

    /// First output empty, kernel input first, at least one paying output
    pub fn is_coinstake(&self) -> bool {
        match self.inputs.first() {
            Some(kernel) => {
                (!kernel.prevout.is_null() || kernel.is_zerocoin_spend())
                    && self.outputs.len() >= 2
                    && self.outputs[0].is_empty()
            }
            None => false,
        }
    }

    pub fn is_zerocoin_spend(&self) -> bool {
        self.inputs.first().map_or(false, TxInput::is_zerocoin_spend)
    }

    /// Transaction id; signatures are not committed so it doubles as the signing hash
    pub fn hash(&self) -> Hash {
        let mut writer = HashWriter::new()
            .write_u32(self.version)
            .write_u32(self.time)
            .write_u32(self.inputs.len() as u32);

        for input in &self.inputs {
            writer = writer
                .write_hash(&input.prevout.hash)
                .write_u32(input.prevout.index)
                .write_u32(input.sequence);
            if let Some(spend) = &input.zerocoin {
                writer = writer.write_hash(&spend.serial_hash);
            }
        }

        writer = writer.write_u32(self.outputs.len() as u32);
        for output in &self.outputs {
            writer = writer
                .write_u64(output.amount)
                .write_hash(&output.pubkey_hash);
        }

        writer.write_u32(self.lock_time).finish()
    }

    /// Check that input `index` is signed by the owner of `spent`
    pub fn verify_input_ownership(&self, index: usize, spent: &TxOutput) -> bool {
        self.inputs.get(index).map_or(false, |input| {
            input.public_key.owns(&spent.pubkey_hash)
                && input.public_key.verify(&self.hash(), &input.signature)
        })
    }

    /// Sum of outputs, `None` on u64 overflow
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.amount))
    }
}
