//! Coins that can be staked
//!
//! A kernel is built either from an ordinary previous output or from a
//! zerocoin spend. Both expose the same four things to the kernel: a
//! uniqueness fingerprint, the block the coin originates from, its value
//! and the modifier it hashes with.

use serde::{Deserialize, Serialize};

use super::{get_kernel_stake_modifier, ValidationError};
use crate::constants::COIN;
use crate::crypto::Hash;
use crate::params::NetworkProfile;
use crate::storage::{ChainIndex, NodeId};
use crate::validation::{OutPoint, Transaction, ZerocoinSpend};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StakeInput {
    /// Output `position` of `tx_from`, confirmed in `block_from`
    Plain {
        tx_from: Transaction,
        position: u32,
        block_from: Hash,
    },
    Zerocoin(ZerocoinSpend),
}

impl StakeInput {
    /// Stake output `position` of `tx_from`
    pub fn plain(tx_from: Transaction, position: u32, block_from: Hash) -> Result<Self, ValidationError> {
        if tx_from.outputs.get(position as usize).is_none() {
            return Err(ValidationError::MissingInputs(tx_from.hash()));
        }
        Ok(StakeInput::Plain {
            tx_from,
            position,
            block_from,
        })
    }

    pub fn is_zerocoin(&self) -> bool {
        matches!(self, StakeInput::Zerocoin(_))
    }

    /// Bytes distinguishing this coin from every other stakeable coin
    pub fn uniqueness(&self) -> Vec<u8> {
        match self {
            StakeInput::Plain {
                tx_from, position, ..
            } => {
                let mut bytes = Vec::with_capacity(36);
                bytes.extend_from_slice(&position.to_le_bytes());
                bytes.extend_from_slice(tx_from.hash().as_bytes());
                bytes
            }
            StakeInput::Zerocoin(spend) => spend.serial_hash.as_bytes().to_vec(),
        }
    }

    /// Hash of the block the coin originates from
    pub fn block_from(&self) -> Hash {
        match self {
            StakeInput::Plain { block_from, .. } => *block_from,
            StakeInput::Zerocoin(spend) => spend.checkpoint_block,
        }
    }

    pub fn index_from(&self, chain: &ChainIndex) -> Result<NodeId, ValidationError> {
        let hash = self.block_from();
        chain.lookup(&hash).ok_or(ValidationError::UnknownBlock(hash))
    }

    /// Value in base units
    pub fn value(&self) -> u64 {
        match self {
            StakeInput::Plain {
                tx_from, position, ..
            } => tx_from
                .outputs
                .get(*position as usize)
                .map_or(0, |output| output.amount),
            StakeInput::Zerocoin(spend) => spend.denomination.saturating_mul(COIN),
        }
    }

    /// Modifier of the current kernel protocol
    pub fn modifier(&self, chain: &ChainIndex, profile: &NetworkProfile) -> Result<u64, ValidationError> {
        match self {
            StakeInput::Plain { block_from, .. } => {
                Ok(get_kernel_stake_modifier(chain, block_from, profile)?.modifier)
            }
            StakeInput::Zerocoin(spend) => Ok(spend.checkpoint_block.low_u64()),
        }
    }

    /// Outpoint and previous transaction time used by the legacy kernel
    pub fn legacy_kernel(&self) -> Option<(OutPoint, u32)> {
        match self {
            StakeInput::Plain {
                tx_from, position, ..
            } => Some((OutPoint::new(tx_from.hash(), *position), tx_from.time)),
            StakeInput::Zerocoin(_) => None,
        }
    }
}
