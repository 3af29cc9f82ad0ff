//! Block index arena
//!
//! Nodes live in a `Vec` and refer to their parent by [`NodeId`]. A node's
//! stake modifier, legacy modifier, proof hash and checksum are computed once
//! when it is added and never change afterwards.

use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::consensus::{
    block_proof, check_stake_modifier_checkpoints, compute_next_stake_modifier,
    compute_stake_modifier_v2, get_stake_modifier_checksum, Block, TxSource, ValidationError,
};
use crate::constants::{BLOCK_PROOF_OF_STAKE, BLOCK_STAKE_ENTROPY, BLOCK_STAKE_MODIFIER};
use crate::crypto::Hash;
use crate::params::NetworkProfile;
use crate::validation::Transaction;
use crate::U256;

/// Chain index shared between the validating writer and stakers
pub type SharedChain = Arc<RwLock<ChainIndex>>;

/// Key of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Per-block consensus record
#[derive(Debug, Clone)]
pub struct BlockIndexNode {
    pub hash: Hash,
    pub prev: Option<NodeId>,
    pub height: u64,
    pub time: i64,
    pub bits: u32,
    pub proof_of_stake: bool,
    pub stake_modifier: u64,
    pub generated_stake_modifier: bool,
    /// Rolling 256-bit modifier of the legacy kernel
    pub stake_modifier_v2: Hash,
    /// Zero for proof-of-work blocks
    pub hash_proof_of_stake: Hash,
    pub stake_modifier_checksum: u32,
    pub chain_work: U256,
}

impl BlockIndexNode {
    pub fn is_proof_of_stake(&self) -> bool {
        self.proof_of_stake
    }

    /// Lowest bit of the block hash
    pub fn stake_entropy_bit(&self) -> u64 {
        self.hash.low_u64() & 1
    }

    /// Flag word committed to by the modifier checksum
    pub fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.proof_of_stake {
            flags |= BLOCK_PROOF_OF_STAKE;
        }
        if self.stake_entropy_bit() == 1 {
            flags |= BLOCK_STAKE_ENTROPY;
        }
        if self.generated_stake_modifier {
            flags |= BLOCK_STAKE_MODIFIER;
        }
        flags
    }
}

/// Arena of block index nodes plus the active chain
#[derive(Debug, Default)]
pub struct ChainIndex {
    nodes: Vec<BlockIndexNode>,
    by_hash: HashMap<Hash, NodeId>,
    /// Active chain, indexed by height
    active: Vec<NodeId>,
    /// Transaction id -> (transaction, containing block)
    transactions: HashMap<Hash, (Transaction, Hash)>,
}

impl ChainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedChain {
        Arc::new(RwLock::new(self))
    }

    pub fn node(&self, id: NodeId) -> &BlockIndexNode {
        &self.nodes[id.0]
    }

    #[cfg(test)]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut BlockIndexNode {
        &mut self.nodes[id.0]
    }

    pub fn lookup(&self, hash: &Hash) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev
    }

    pub fn tip(&self) -> Option<NodeId> {
        self.active.last().copied()
    }

    /// Height of the active tip, `None` while empty
    pub fn tip_height(&self) -> Option<u64> {
        self.tip().map(|id| self.node(id).height)
    }

    /// Node at `height` on the active chain
    pub fn active_at(&self, height: u64) -> Option<NodeId> {
        usize::try_from(height)
            .ok()
            .and_then(|h| self.active.get(h))
            .copied()
    }

    pub fn is_active(&self, id: NodeId) -> bool {
        self.active_at(self.node(id).height) == Some(id)
    }

    /// Ancestor of `id` at `height`, walking parent links
    pub fn ancestor(&self, id: NodeId, height: u64) -> Option<NodeId> {
        if self.is_active(id) {
            return self.active_at(height).filter(|_| height <= self.node(id).height);
        }
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node(current);
            if node.height == height {
                return Some(current);
            }
            if node.height < height {
                return None;
            }
            cursor = node.prev;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index a block whose kernel (if any) has already been checked
    ///
    /// `hash_proof_of_stake` is the proof hash returned by the kernel check,
    /// zero for proof-of-work blocks. Adding a known block returns its id.
    pub fn add_block(
        &mut self,
        block: &Block,
        hash_proof_of_stake: Hash,
        profile: &NetworkProfile,
    ) -> Result<NodeId, ValidationError> {
        let hash = block.hash();
        if let Some(id) = self.lookup(&hash) {
            return Ok(id);
        }

        let prev = if block.is_genesis() {
            None
        } else {
            Some(
                self.lookup(&block.header.prev_hash)
                    .ok_or(ValidationError::UnknownBlock(block.header.prev_hash))?,
            )
        };
        let prev_node = prev.map(|id| self.node(id));

        let proof_of_stake = block.is_proof_of_stake();
        let kernel = match block.coinstake() {
            Some(coinstake) => coinstake.inputs[0].prevout.hash,
            None => hash,
        };

        let next = compute_next_stake_modifier(self, prev, profile)?;
        let mut node = BlockIndexNode {
            hash,
            prev,
            height: prev_node.map_or(0, |p| p.height + 1),
            time: block.header.time as i64,
            bits: block.header.bits,
            proof_of_stake,
            stake_modifier: next.modifier,
            generated_stake_modifier: next.generated,
            stake_modifier_v2: compute_stake_modifier_v2(prev_node, &kernel),
            hash_proof_of_stake: if proof_of_stake { hash_proof_of_stake } else { Hash::zero() },
            stake_modifier_checksum: 0,
            chain_work: prev_node.map_or(U256::zero(), |p| p.chain_work)
                .saturating_add(block_proof(block.header.bits)),
        };
        node.stake_modifier_checksum = get_stake_modifier_checksum(self, &node, profile)?;
        check_stake_modifier_checkpoints(node.height, node.stake_modifier_checksum, profile)?;

        if next.generated {
            debug!(
                "add_block: height {} generated modifier {:#018x}",
                node.height, node.stake_modifier
            );
        }

        let id = NodeId(self.nodes.len());
        self.by_hash.insert(hash, id);
        self.nodes.push(node);

        for tx in &block.transactions {
            self.transactions.insert(tx.hash(), (tx.clone(), hash));
        }

        self.maybe_activate(id);
        Ok(id)
    }

    /// Make `id` the tip when it carries more work than the current tip
    fn maybe_activate(&mut self, id: NodeId) {
        let better = match self.tip() {
            None => true,
            Some(tip) => self.node(id).chain_work > self.node(tip).chain_work,
        };
        if !better {
            return;
        }

        let mut branch = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if self.is_active(current) {
                break;
            }
            branch.push(current);
            cursor = self.node(current).prev;
        }

        let fork_len = cursor.map_or(0, |fork| self.node(fork).height as usize + 1);
        if fork_len < self.active.len() {
            info!(
                "Reorganizing: disconnecting {} blocks above height {}",
                self.active.len() - fork_len,
                fork_len.saturating_sub(1)
            );
        }
        self.active.truncate(fork_len);
        self.active.extend(branch.into_iter().rev());
    }
}

impl TxSource for ChainIndex {
    fn get_transaction(&self, txid: &Hash) -> Option<(Transaction, Hash)> {
        self.transactions.get(txid).cloned()
    }
}
