//! Stake modifier computation
//!
//! The 64-bit stake modifier is rebuilt at most once per modifier interval
//! from the entropy bits of 64 blocks picked out of a trailing window of the
//! chain. Each pick hashes the candidate's proof with the previous modifier,
//! so the owner of a coin cannot predict the modifier their coin will hash
//! with at the time the coin confirms.

use log::{debug, log_enabled, Level};
use std::collections::{BTreeMap, HashSet};

use super::ValidationError;
use crate::constants::MODIFIER_ROUNDS;
use crate::crypto::{Hash, HashWriter};
use crate::params::{NetworkProfile, ProtocolEpoch};
use crate::storage::{BlockIndexNode, ChainIndex, NodeId};

/// A block considered for one modifier computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateBlock {
    pub time: i64,
    pub hash: Hash,
}

/// Output of [`compute_next_stake_modifier`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextModifier {
    pub modifier: u64,
    /// A new modifier was generated at this block
    pub generated: bool,
}

/// Modifier a kernel hashes with, plus where it was generated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelModifier {
    pub modifier: u64,
    pub height: u64,
    pub time: i64,
}

/// Length in seconds of selection round `section`
///
/// Early rounds are shorter so the oldest blocks weigh less.
pub fn selection_interval_section(section: usize, profile: &NetworkProfile) -> i64 {
    debug_assert!(section < MODIFIER_ROUNDS);
    let remaining = (MODIFIER_ROUNDS - 1 - section) as i64;
    profile.modifier_interval * 63 / (63 + remaining * (profile.modifier_interval_ratio - 1))
}

/// Total length of the selection window in seconds
pub fn selection_interval(profile: &NetworkProfile) -> i64 {
    (0..MODIFIER_ROUNDS)
        .map(|section| selection_interval_section(section, profile))
        .sum()
}

/// Pick the candidate with the smallest selection hash up to `stop`
///
/// Candidates must be sorted by `(time, hash)`. Proof-of-stake candidates
/// have their hash divided by 2^32 so they win over proof-of-work blocks.
/// Returns `Ok(None)` when every candidate was already selected.
pub fn select_block_from_candidates(
    chain: &ChainIndex,
    candidates: &[CandidateBlock],
    selected: &HashSet<Hash>,
    stop: i64,
    prev_modifier: u64,
    profile: &NetworkProfile,
) -> Result<Option<NodeId>, ValidationError> {
    let mut first_epoch = None;
    let mut best = None;

    for candidate in candidates {
        let id = chain
            .lookup(&candidate.hash)
            .ok_or(ValidationError::UnknownBlock(candidate.hash))?;
        let node = chain.node(id);

        if best.is_some() && node.time > stop {
            break;
        }

        // decided once, by the oldest candidate
        let epoch = *first_epoch.get_or_insert_with(|| profile.epoch_for_selection(node.height));

        if selected.contains(&node.hash) {
            continue;
        }

        let proof = match epoch {
            ProtocolEpoch::Current => node.hash,
            ProtocolEpoch::Legacy => node.hash_proof_of_stake,
        };
        let mut selection = HashWriter::new()
            .write_hash(&proof)
            .write_u64(prev_modifier)
            .finish()
            .to_u256();
        if node.is_proof_of_stake() {
            selection = selection >> 32u32;
        }

        match best {
            Some((_, best_hash)) if selection >= best_hash => {}
            _ => best = Some((id, selection)),
        }
    }

    if let Some((_, best_hash)) = best {
        debug!("select_block_from_candidates: selection hash={:x}", best_hash);
    }
    Ok(best.map(|(id, _)| id))
}

/// Most recent modifier generated at or before `id`, with its block time
fn get_last_stake_modifier(
    chain: &ChainIndex,
    id: NodeId,
) -> Result<(u64, i64), ValidationError> {
    let mut node = chain.node(id);
    while let Some(prev) = node.prev {
        if node.generated_stake_modifier {
            break;
        }
        node = chain.node(prev);
    }
    if !node.generated_stake_modifier {
        return Err(ValidationError::NoModifierGeneration);
    }
    Ok((node.stake_modifier, node.time))
}

/// Stake modifier of the block that follows `prev`
pub fn compute_next_stake_modifier(
    chain: &ChainIndex,
    prev: Option<NodeId>,
    profile: &NetworkProfile,
) -> Result<NextModifier, ValidationError> {
    let prev_id = match prev {
        Some(id) => id,
        None => {
            return Ok(NextModifier {
                modifier: 0,
                generated: true,
            })
        }
    };
    let prev_node = chain.node(prev_id);

    match prev_node.height {
        0 => {
            return Ok(NextModifier {
                modifier: 0,
                generated: false,
            })
        }
        1 => {
            return Ok(NextModifier {
                modifier: prev_node.stake_entropy_bit() << 1,
                generated: true,
            })
        }
        _ => {}
    }

    let (last_modifier, last_time) = get_last_stake_modifier(chain, prev_id)?;
    let interval = profile.modifier_interval;
    if last_time / interval >= prev_node.time / interval {
        return Ok(NextModifier {
            modifier: last_modifier,
            generated: false,
        });
    }

    let start = (prev_node.time / interval) * interval - selection_interval(profile);
    let mut candidates = Vec::new();
    let mut cursor = Some(prev_id);
    while let Some(id) = cursor {
        let node = chain.node(id);
        if node.time < start {
            break;
        }
        candidates.push(CandidateBlock {
            time: node.time,
            hash: node.hash,
        });
        cursor = node.prev;
    }
    let first_candidate_height = cursor.map_or(0, |id| chain.node(id).height + 1);
    candidates.sort_by(|a, b| (a.time, a.hash.to_u256()).cmp(&(b.time, b.hash.to_u256())));

    let mut modifier = 0u64;
    let mut stop = start;
    let mut selected = HashSet::new();
    let mut picks = Vec::new();
    for round in 0..MODIFIER_ROUNDS.min(candidates.len()) {
        stop += selection_interval_section(round, profile);
        let id = select_block_from_candidates(
            chain,
            &candidates,
            &selected,
            stop,
            last_modifier,
            profile,
        )?
        .ok_or(ValidationError::ModifierSelectionFailed(round))?;

        let node = chain.node(id);
        modifier |= node.stake_entropy_bit() << round;
        selected.insert(node.hash);
        picks.push(id);
    }

    if log_enabled!(Level::Debug) {
        debug!(
            "compute_next_stake_modifier: selection height [{}, {}] map {}",
            first_candidate_height,
            prev_node.height,
            selection_map(chain, prev_id, first_candidate_height, &picks)
        );
    }

    Ok(NextModifier {
        modifier,
        generated: true,
    })
}

/// `-` unselected PoW, `=` unselected PoS, `W`/`S` selected PoW/PoS
fn selection_map(chain: &ChainIndex, tip: NodeId, first_height: u64, picks: &[NodeId]) -> String {
    let mut marks = BTreeMap::new();
    let mut cursor = Some(tip);
    while let Some(id) = cursor {
        let node = chain.node(id);
        if node.height < first_height {
            break;
        }
        marks.insert(node.height, if node.is_proof_of_stake() { '=' } else { '-' });
        cursor = node.prev;
    }
    for &id in picks {
        let node = chain.node(id);
        marks.insert(node.height, if node.is_proof_of_stake() { 'S' } else { 'W' });
    }
    marks.values().collect()
}

/// Legacy 256-bit modifier: hash of the kernel with the parent's modifier
pub fn compute_stake_modifier_v2(prev: Option<&BlockIndexNode>, kernel: &Hash) -> Hash {
    match prev {
        None => Hash::zero(),
        Some(prev) => HashWriter::new()
            .write_hash(kernel)
            .write_hash(&prev.stake_modifier_v2)
            .finish(),
    }
}

/// Modifier a coin from block `from_hash` hashes with
///
/// The first modifier generated a full selection interval after the coin's
/// block, searched along the active chain and bounded by the tip.
pub fn get_kernel_stake_modifier(
    chain: &ChainIndex,
    from_hash: &Hash,
    profile: &NetworkProfile,
) -> Result<KernelModifier, ValidationError> {
    let from_id = chain
        .lookup(from_hash)
        .ok_or(ValidationError::UnknownBlock(*from_hash))?;
    let from = chain.node(from_id);
    let tip_height = chain.tip_height().unwrap_or(0);
    let horizon = from.time + selection_interval(profile);

    let mut height = from.height;
    let mut time = from.time;
    let mut current = from_id;
    let mut next = chain.active_at(from.height + 1);

    while time < horizon {
        let next_id = next.ok_or(ValidationError::StakeModifierUnavailable(*from_hash))?;
        let next_node = chain.node(next_id);
        if next_node.height + 1 >= tip_height {
            break;
        }
        current = next_id;
        next = chain.active_at(next_node.height + 1);
        if next_node.generated_stake_modifier {
            height = next_node.height;
            time = next_node.time;
        }
    }

    Ok(KernelModifier {
        modifier: chain.node(current).stake_modifier,
        height,
        time,
    })
}

/// Rolling checksum over modifier history
///
/// Top 32 bits of the hash of the parent's checksum, the node's flags, its
/// proof hash and its modifier.
pub fn get_stake_modifier_checksum(
    chain: &ChainIndex,
    node: &BlockIndexNode,
    profile: &NetworkProfile,
) -> Result<u32, ValidationError> {
    let mut writer = HashWriter::new();
    match node.prev {
        Some(prev) => writer = writer.write_u32(chain.node(prev).stake_modifier_checksum),
        None if node.hash == profile.genesis_hash => {}
        None => return Err(ValidationError::OrphanNode(node.hash)),
    }

    let checksum = writer
        .write_u32(node.flags())
        .write_hash(&node.hash_proof_of_stake)
        .write_u64(node.stake_modifier)
        .finish()
        .to_u256()
        >> 224u32;
    Ok(checksum.low_u32())
}

/// Compare a checksum against the profile's hard checkpoints
pub fn check_stake_modifier_checkpoints(
    height: u64,
    checksum: u32,
    profile: &NetworkProfile,
) -> Result<(), ValidationError> {
    if profile.network.is_test_network() {
        return Ok(());
    }
    match profile.modifier_checkpoints.get(&height) {
        Some(&expected) if expected != checksum => {
            Err(ValidationError::ModifierCheckpointMismatch { height, checksum })
        }
        _ => Ok(()),
    }
}
