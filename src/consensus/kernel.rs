//! Stake kernel hashing and proof-of-stake validation
//!
//! A coinstake's first input is its kernel. The kernel hash commits to the
//! stake modifier, the coin's origin and the coinstake time; the block is
//! valid proof-of-stake when that hash falls below the block target scaled
//! by the coin's value.

use log::{debug, warn};

use super::{set_compact, weighted_target, Block, StakeInput, ValidationError};
use crate::constants::COIN_WEIGHT_SCALE;
use crate::crypto::{Hash, HashWriter};
use crate::params::{NetworkProfile, ProtocolEpoch};
use crate::storage::{ChainIndex, NodeId};
use crate::validation::{OutPoint, SpendType, Transaction};
use crate::U256;

/// Lookup of confirmed transactions
pub trait TxSource {
    /// The transaction and the hash of the block containing it
    fn get_transaction(&self, txid: &Hash) -> Option<(Transaction, Hash)>;
}

/// A verified proof-of-stake kernel
#[derive(Debug, Clone)]
pub struct ProofOfStake {
    pub hash: Hash,
    pub stake: StakeInput,
}

/// Current-protocol hit test: `hash < (value / 100) * target`
pub fn stake_target_hit(hash: &Hash, value: u64, target: &U256) -> bool {
    let weight = U256::from(value / COIN_WEIGHT_SCALE);
    hash.to_u256() < weighted_target(target, &weight)
}

/// Current-protocol kernel
///
/// Returns the kernel hash and whether it meets the weighted target.
pub fn check_stake_v2(
    uniqueness: &[u8],
    value: u64,
    modifier: u64,
    target: &U256,
    from_time: u32,
    tx_time: u32,
) -> (Hash, bool) {
    let hash = HashWriter::new()
        .write_u64(modifier)
        .write_u32(from_time)
        .write_bytes(uniqueness)
        .write_u32(tx_time)
        .finish();
    let hit = stake_target_hit(&hash, value, target);
    (hash, hit)
}

/// Legacy kernel over the previous outpoint and the 256-bit modifier
///
/// Hits when `hash <= value * target`. A coinstake older than the
/// transaction it spends is rejected outright.
pub fn check_stake_v1(
    prev_tx_time: u32,
    prevout: &OutPoint,
    tx_time: u32,
    value: u64,
    modifier_v2: &Hash,
    bits: u32,
) -> Result<(Hash, bool), ValidationError> {
    if tx_time < prev_tx_time {
        return Err(ValidationError::TimestampViolation {
            from_time: prev_tx_time as i64,
            tx_time: tx_time as i64,
        });
    }

    let target = weighted_target(&set_compact(bits).value, &U256::from(value));
    let hash = HashWriter::new()
        .write_hash(modifier_v2)
        .write_u32(prev_tx_time)
        .write_hash(&prevout.hash)
        .write_u32(prevout.index)
        .write_u32(tx_time)
        .finish();

    debug!(
        "check_stake_v1: prev time {} prevout {}:{} tx time {} modifier v2 {} hash {}",
        prev_tx_time, prevout.hash, prevout.index, tx_time, modifier_v2, hash
    );
    Ok((hash, hash.to_u256() <= target))
}

/// Coinstake must not precede its coin and the coin must have aged enough
pub fn check_stake_timing(
    from_time: i64,
    tx_time: i64,
    profile: &NetworkProfile,
) -> Result<(), ValidationError> {
    if tx_time < from_time {
        return Err(ValidationError::TimestampViolation { from_time, tx_time });
    }
    if from_time + profile.stake_min_age > tx_time {
        return Err(ValidationError::MinStakeAge {
            from_time,
            min_age: profile.stake_min_age,
            tx_time,
        });
    }
    Ok(())
}

/// Block and coinstake times agree and sit on the timestamp grid
pub fn check_coinstake_timestamp(
    block_time: i64,
    tx_time: i64,
    profile: &NetworkProfile,
) -> Result<(), ValidationError> {
    if block_time != tx_time || (tx_time & profile.stake_timestamp_mask as i64) != 0 {
        return Err(ValidationError::CoinstakeTimestamp { block_time, tx_time });
    }
    Ok(())
}

/// Validate the kernel of a proof-of-stake block built on `prev`
///
/// Reads the chain and transaction store only; nothing is modified when the
/// check fails.
pub fn check_proof_of_stake<T: TxSource>(
    block: &Block,
    chain: &ChainIndex,
    prev: NodeId,
    txs: &T,
    profile: &NetworkProfile,
) -> Result<ProofOfStake, ValidationError> {
    let coinstake = block
        .transactions
        .get(1)
        .filter(|tx| tx.is_coinstake())
        .ok_or(ValidationError::NotCoinstake)?;
    let kernel_in = &coinstake.inputs[0];

    let stake = match &kernel_in.zerocoin {
        Some(spend) => {
            if spend.spend_type != SpendType::Stake {
                return Err(ValidationError::WrongSpendType);
            }
            StakeInput::Zerocoin(spend.clone())
        }
        None => {
            let (tx_prev, block_hash) = txs
                .get_transaction(&kernel_in.prevout.hash)
                .ok_or(ValidationError::MissingTransaction(kernel_in.prevout.hash))?;
            let spent = tx_prev
                .outputs
                .get(kernel_in.prevout.index as usize)
                .ok_or_else(|| ValidationError::MissingInputs(coinstake.hash()))?;
            if !coinstake.verify_input_ownership(0, spent) {
                return Err(ValidationError::InvalidStakeSignature);
            }
            StakeInput::plain(tx_prev, kernel_in.prevout.index, block_hash)?
        }
    };

    let from_id = stake.index_from(chain)?;
    let from = chain.node(from_id);
    // the coin must be confirmed on the branch being extended
    if chain.ancestor(prev, from.height) != Some(from_id) {
        return Err(ValidationError::MissingAncestor(from.height));
    }
    let height = chain.node(prev).height + 1;

    if stake.is_zerocoin() {
        let depth = height.saturating_sub(from.height);
        if depth < profile.zerocoin_required_stake_depth {
            return Err(ValidationError::InsufficientStakeDepth {
                depth,
                required: profile.zerocoin_required_stake_depth,
            });
        }
    }

    let bits = block.header.bits;
    let target = set_compact(bits);
    if !target.is_valid() {
        return Err(ValidationError::TargetOutOfRange(bits));
    }

    let hash = match profile.epoch_for_stake(from.height) {
        ProtocolEpoch::Current => {
            let tx_time = block.header.time;
            check_stake_timing(from.time, tx_time as i64, profile)?;
            let modifier = stake.modifier(chain, profile)?;
            let (hash, hit) = check_stake_v2(
                &stake.uniqueness(),
                stake.value(),
                modifier,
                &target.value,
                from.time as u32,
                tx_time,
            );
            if !hit {
                warn!(
                    "check_proof_of_stake: kernel failed on coinstake {}, hash {}",
                    coinstake.hash(),
                    hash
                );
                return Err(ValidationError::KernelTargetMiss(hash));
            }
            hash
        }
        ProtocolEpoch::Legacy => {
            let (prevout, prev_tx_time) = stake
                .legacy_kernel()
                .ok_or(ValidationError::ZerocoinStakeBeforeActivation)?;
            check_stake_timing(from.time, coinstake.time as i64, profile)?;
            let (hash, hit) = check_stake_v1(
                prev_tx_time,
                &prevout,
                coinstake.time,
                stake.value(),
                &chain.node(prev).stake_modifier_v2,
                bits,
            )?;
            if !hit {
                warn!(
                    "check_proof_of_stake: legacy kernel failed on coinstake {}, hash {}",
                    coinstake.hash(),
                    hash
                );
                return Err(ValidationError::KernelTargetMiss(hash));
            }
            hash
        }
    };

    Ok(ProofOfStake { hash, stake })
}
