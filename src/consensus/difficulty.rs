//! Difficulty adjustment algorithms
//!
//! Proof-of-stake blocks retarget every block with an exponential moving
//! average toward the target spacing. Proof-of-work blocks average the last
//! 24 targets (DarkGravity) until the last PoW height, after which the PoW
//! path falls back to the moving average against the PoS limit.

use log::warn;

use super::{get_compact, set_compact, weighted_target, ValidationError};
use crate::constants::DGW_PAST_BLOCKS;
use crate::crypto::Hash;
use crate::params::NetworkProfile;
use crate::storage::{ChainIndex, NodeId};
use crate::U256;

/// Most recent block at or before `id` of the requested kind
///
/// Stops at genesis when no such block exists.
pub fn get_last_block_index(chain: &ChainIndex, id: NodeId, proof_of_stake: bool) -> NodeId {
    let mut current = id;
    loop {
        let node = chain.node(current);
        match node.prev {
            Some(prev) if node.is_proof_of_stake() != proof_of_stake => current = prev,
            _ => return current,
        }
    }
}

/// `old * ((interval - 1) * spacing + 2 * actual) / ((interval + 1) * spacing)`
fn moving_average_retarget(old_bits: u32, actual_spacing: i64, limit: &U256, profile: &NetworkProfile) -> u32 {
    let spacing = profile.target_spacing;
    let interval = profile.retarget_interval();

    let numerator = (interval - 1) * spacing + 2 * actual_spacing;
    let denominator = (interval + 1) * spacing;
    let old = set_compact(old_bits).value;
    let new = weighted_target(&old, &U256::from(numerator.max(0) as u64)) / U256::from(denominator as u64);

    if new.is_zero() || new > *limit {
        return get_compact(limit);
    }
    get_compact(&new)
}

/// Target for the next block of the given kind after `last`
pub fn get_next_target_required(
    chain: &ChainIndex,
    last: Option<NodeId>,
    proof_of_stake: bool,
    profile: &NetworkProfile,
) -> u32 {
    let limit = if proof_of_stake {
        profile.pos_limit
    } else {
        profile.pow_limit
    };

    // genesis block
    let last = match last {
        Some(last) => last,
        None => return get_compact(&limit),
    };
    // first block
    let prev = get_last_block_index(chain, last, proof_of_stake);
    let prev_parent = match chain.prev(prev) {
        Some(parent) => parent,
        None => return get_compact(&limit),
    };
    // second block
    let prev_prev = get_last_block_index(chain, prev_parent, proof_of_stake);
    if chain.prev(prev_prev).is_none() {
        return get_compact(&limit);
    }

    let spacing = profile.target_spacing;
    let mut actual_spacing = chain.node(prev).time - chain.node(prev_prev).time;
    if actual_spacing < 0 {
        actual_spacing = spacing;
    }
    if actual_spacing > spacing * 10 {
        actual_spacing = spacing * 10;
    }

    moving_average_retarget(chain.node(prev).bits, actual_spacing, &limit, profile)
}

/// Target for the block after `last` on the proof-of-work schedule
pub fn get_next_work_required(chain: &ChainIndex, last: Option<NodeId>, profile: &NetworkProfile) -> u32 {
    let pow_limit = get_compact(&profile.pow_limit);
    let last_id = match last {
        Some(id) => id,
        None => return pow_limit,
    };
    let last = chain.node(last_id);
    if last.height == 0 || (last.height as i64) < DGW_PAST_BLOCKS {
        return pow_limit;
    }

    if last.height > profile.last_pow_block {
        let mut actual_spacing = match last.prev {
            Some(prev) => last.time - chain.node(prev).time,
            None => 0,
        };
        if actual_spacing < 0 {
            actual_spacing = 1;
        }
        return moving_average_retarget(last.bits, actual_spacing, &profile.pos_limit, profile);
    }

    let mut count: i64 = 0;
    let mut average = U256::zero();
    let mut actual_timespan: i64 = 0;
    let mut last_time = None;
    let mut reading = Some(last_id);

    while let Some(id) = reading {
        let node = chain.node(id);
        if node.height == 0 || count >= DGW_PAST_BLOCKS {
            break;
        }
        count += 1;

        let target = set_compact(node.bits).value;
        average = if count == 1 {
            target
        } else {
            (weighted_target(&average, &U256::from(count as u64)).saturating_add(target))
                / U256::from((count + 1) as u64)
        };

        if let Some(time) = last_time {
            actual_timespan += time - node.time;
        }
        last_time = Some(node.time);
        reading = node.prev;
    }

    let expected = count * profile.target_spacing;
    let actual_timespan = actual_timespan.clamp(expected / 3, expected * 3);

    let new = weighted_target(&average, &U256::from(actual_timespan as u64)) / U256::from(expected as u64);
    if new > profile.pow_limit {
        return pow_limit;
    }
    get_compact(&new)
}

/// Check that `hash` meets the target encoded in `bits`
pub fn check_proof_of_work(hash: &Hash, bits: u32, profile: &NetworkProfile) -> Result<(), ValidationError> {
    if profile.skip_pow_check {
        return Ok(());
    }

    let target = set_compact(bits);
    if !target.is_valid() || target.value > profile.pow_limit {
        warn!("check_proof_of_work: bits {:#010x} below minimum work", bits);
        return Err(ValidationError::TargetOutOfRange(bits));
    }

    if hash.to_u256() > target.value {
        return Err(ValidationError::HighHash(*hash));
    }
    Ok(())
}
