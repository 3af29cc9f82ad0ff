//! Proof-of-stake consensus kernel
//!
//! Decides whether a coinstake's kernel hash meets the coin-weighted target,
//! evolves the chain-wide stake modifier and retargets PoW/PoS difficulty.
//! Every function here is deterministic over a snapshot of the block index
//! plus an explicit [`params::NetworkProfile`].

use uint::construct_uint;

construct_uint! {
    /// 256-bit unsigned integer used for targets, weights and chain work
    pub struct U256(4);
}

pub mod consensus;
pub mod crypto;
pub mod validation;
pub mod storage;
pub mod mining;
pub mod params;

/// Protocol constants shared by every network profile
pub mod constants {
    /// Base units per coin
    pub const COIN: u64 = 100_000_000;

    /// Number of rounds (and bits) in a stake modifier
    pub const MODIFIER_ROUNDS: usize = 64;

    /// Block-index flag: block is proof-of-stake
    pub const BLOCK_PROOF_OF_STAKE: u32 = 1 << 0;

    /// Block-index flag: stake entropy bit
    pub const BLOCK_STAKE_ENTROPY: u32 = 1 << 1;

    /// Block-index flag: block generated a new stake modifier
    pub const BLOCK_STAKE_MODIFIER: u32 = 1 << 2;

    /// Coin-day weight divisor of the current kernel protocol
    pub const COIN_WEIGHT_SCALE: u64 = 100;

    /// Blocks averaged by the DarkGravity PoW retarget
    pub const DGW_PAST_BLOCKS: i64 = 24;

    /// Lock times below this are block heights, above are unix timestamps
    pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

    /// Sequence value marking an input as final
    pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;
}
