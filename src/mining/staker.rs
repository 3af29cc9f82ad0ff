//! Stake searcher
//!
//! Hashes one stakeable coin across a short window of future timestamps,
//! giving up as soon as a new block arrives on the shared chain.

use log::{debug, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::consensus::{
    check_stake_timing, check_stake_v1, check_stake_v2, set_compact, StakeInput, ValidationError,
};
use crate::crypto::Hash;
use crate::params::{NetworkProfile, ProtocolEpoch};
use crate::storage::SharedChain;
use crate::validation::OutPoint;

/// A kernel hash that met the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeHit {
    /// Coinstake time that produced the hit
    pub time: u32,
    pub hash: Hash,
}

/// Everything the kernel needs that stays fixed for one search
enum KernelContext {
    Current {
        uniqueness: Vec<u8>,
        modifier: u64,
    },
    Legacy {
        prevout: OutPoint,
        prev_tx_time: u32,
        modifier_v2: Hash,
    },
}

/// Searches for proof-of-stake hits on top of the shared chain
pub struct StakeSearcher {
    chain: SharedChain,
    profile: NetworkProfile,
    /// Tip height -> unix time it was last hashed on
    hashed_blocks: HashMap<u64, i64>,
    stop_signal: Arc<AtomicBool>,
}

impl StakeSearcher {
    pub fn new(chain: SharedChain, profile: NetworkProfile) -> Self {
        Self {
            chain,
            profile,
            hashed_blocks: HashMap::new(),
            stop_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a stop signal handle
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.stop_signal.store(false, Ordering::SeqCst);
    }

    /// When the tip at `height` was last hashed on, if it was the latest search
    pub fn recently_hashed(&self, height: u64) -> Option<i64> {
        self.hashed_blocks.get(&height).copied()
    }

    /// Try `tx_time + drift - i` for each `i` in `0..drift`
    ///
    /// Returns `Ok(None)` when no timestamp hit or the tip moved.
    pub fn search(
        &mut self,
        stake: &StakeInput,
        bits: u32,
        tx_time: u32,
    ) -> Result<Option<StakeHit>, ValidationError> {
        self.search_with(stake, bits, tx_time, |_| {})
    }

    /// Like [`search`](Self::search), calling `on_attempt` with each try time
    /// after it was hashed
    pub fn search_with<F>(
        &mut self,
        stake: &StakeInput,
        bits: u32,
        tx_time: u32,
        mut on_attempt: F,
    ) -> Result<Option<StakeHit>, ValidationError>
    where
        F: FnMut(u32),
    {
        let target = set_compact(bits).value;
        let value = stake.value();

        let (start_height, from_time, kernel) = {
            let chain = self.chain.read();
            let tip = chain.tip().ok_or(ValidationError::MissingAncestor(0))?;
            let from_id = stake.index_from(&chain)?;
            let from = chain.node(from_id);
            if chain.ancestor(tip, from.height) != Some(from_id) {
                return Err(ValidationError::MissingAncestor(from.height));
            }
            check_stake_timing(from.time, tx_time as i64, &self.profile)?;
            debug!("StakeSearcher: stake input height {}", from.height);

            let kernel = match self.profile.epoch_for_stake(from.height) {
                ProtocolEpoch::Current => KernelContext::Current {
                    uniqueness: stake.uniqueness(),
                    modifier: stake.modifier(&chain, &self.profile)?,
                },
                ProtocolEpoch::Legacy => {
                    let (prevout, prev_tx_time) = stake
                        .legacy_kernel()
                        .ok_or(ValidationError::ZerocoinStakeBeforeActivation)?;
                    KernelContext::Legacy {
                        prevout,
                        prev_tx_time,
                        modifier_v2: chain.node(tip).stake_modifier_v2,
                    }
                }
            };
            (chain.node(tip).height, from.time as u32, kernel)
        };

        let drift = self.profile.stake_hash_drift;
        let mut found = None;
        for i in 0..drift {
            if self.stop_signal.load(Ordering::SeqCst) {
                break;
            }
            // new block came in, move on
            if self.chain.read().tip_height() != Some(start_height) {
                debug!("StakeSearcher: tip moved past height {}", start_height);
                break;
            }

            let try_time = tx_time.saturating_add(drift - i);
            let (hash, hit) = match &kernel {
                KernelContext::Current {
                    uniqueness,
                    modifier,
                } => check_stake_v2(uniqueness, value, *modifier, &target, from_time, try_time),
                KernelContext::Legacy {
                    prevout,
                    prev_tx_time,
                    modifier_v2,
                } => check_stake_v1(*prev_tx_time, prevout, try_time, value, modifier_v2, bits)?,
            };
            on_attempt(try_time);

            if hit {
                info!("StakeSearcher: found stake at time {} hashproof={}", try_time, hash);
                found = Some(StakeHit {
                    time: try_time,
                    hash,
                });
                break;
            }
        }

        let tip_height = self.chain.read().tip_height();
        self.hashed_blocks.clear();
        if let Some(height) = tip_height {
            self.hashed_blocks.insert(height, unix_time());
        }
        Ok(found)
    }
}

fn unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;
    use crate::consensus::{Block, BlockHeader};
    use crate::crypto::hash_bytes;
    use crate::storage::ChainIndex;
    use crate::validation::{SpendType, Transaction, TxInput, TxOutput, ZerocoinSpend};

    const GENESIS_TIME: u32 = 1_600_000_000;
    const EASY_BITS: u32 = 0x207fffff;

    struct Fixture {
        searcher: StakeSearcher,
        chain: SharedChain,
        tip: Hash,
        funding: Transaction,
        origin: Hash,
        origin_time: u32,
    }

    /// 120 blocks a minute apart; block 1 confirms a 1000 coin output
    fn fixture(new_protocols_start_height: u64) -> Fixture {
        let funding = Transaction::new(
            GENESIS_TIME + 60,
            vec![TxInput::new(OutPoint::new(hash_bytes(b"coinbase"), 0))],
            vec![TxOutput { amount: 1_000 * COIN, pubkey_hash: hash_bytes(b"staker") }],
        );

        let genesis = Block::new(
            BlockHeader::new(Hash::zero(), GENESIS_TIME, EASY_BITS),
            vec![Transaction::coinbase(0, Hash::zero(), GENESIS_TIME)],
        );
        let profile = NetworkProfile {
            genesis_hash: genesis.hash(),
            new_protocols_start_height,
            ..NetworkProfile::unittest()
        };

        let mut chain = ChainIndex::new();
        chain.add_block(&genesis, Hash::zero(), &profile).unwrap();
        let mut prev = genesis.hash();
        let mut origin = Hash::zero();
        for height in 1..=120u32 {
            let time = GENESIS_TIME + height * 60;
            let mut transactions = vec![Transaction::coinbase(0, Hash::zero(), time)];
            if height == 1 {
                transactions.push(funding.clone());
            }
            let mut header = BlockHeader::new(prev, time, EASY_BITS);
            header.nonce = height;
            let block = Block::new(header, transactions);
            prev = block.hash();
            if height == 1 {
                origin = prev;
            }
            chain.add_block(&block, Hash::zero(), &profile).unwrap();
        }

        let chain = chain.into_shared();
        Fixture {
            searcher: StakeSearcher::new(Arc::clone(&chain), profile),
            chain,
            tip: prev,
            funding,
            origin,
            origin_time: GENESIS_TIME + 60,
        }
    }

    #[test]
    fn test_easy_target_hits_first_try() {
        let mut fx = fixture(0);
        let stake = StakeInput::plain(fx.funding.clone(), 0, fx.origin).unwrap();
        let tx_time = fx.origin_time + 7_000;

        let hit = fx.searcher.search(&stake, EASY_BITS, tx_time).unwrap().unwrap();
        assert_eq!(hit.time, tx_time + 30);
        assert!(fx.searcher.recently_hashed(120).is_some());
    }

    #[test]
    fn test_impossible_target_misses() {
        let mut fx = fixture(0);
        let stake = StakeInput::plain(fx.funding.clone(), 0, fx.origin).unwrap();
        let tx_time = fx.origin_time + 7_000;

        let result = fx.searcher.search(&stake, 0x03000001, tx_time).unwrap();
        assert_eq!(result, None);
        assert!(fx.searcher.recently_hashed(120).is_some());
        assert!(fx.searcher.recently_hashed(119).is_none());
    }

    #[test]
    fn test_legacy_kernel_search() {
        let mut fx = fixture(1_000_000);
        let stake = StakeInput::plain(fx.funding.clone(), 0, fx.origin).unwrap();
        let tx_time = fx.origin_time + 7_000;

        let hit = fx.searcher.search(&stake, EASY_BITS, tx_time).unwrap();
        assert!(hit.is_some());
    }

    #[test]
    fn test_young_coin_rejected() {
        let mut fx = fixture(0);
        let stake = StakeInput::plain(fx.funding.clone(), 0, fx.origin).unwrap();
        let err = fx
            .searcher
            .search(&stake, EASY_BITS, fx.origin_time + 10)
            .unwrap_err();
        assert!(matches!(err, ValidationError::MinStakeAge { .. }));
    }

    #[test]
    fn test_legacy_zerocoin_rejected() {
        let mut fx = fixture(1_000_000);
        let stake = StakeInput::Zerocoin(ZerocoinSpend {
            spend_type: SpendType::Stake,
            serial_hash: hash_bytes(b"serial"),
            denomination: 100,
            checkpoint_block: fx.origin,
        });
        assert_eq!(
            fx.searcher.search(&stake, EASY_BITS, fx.origin_time + 7_000),
            Err(ValidationError::ZerocoinStakeBeforeActivation)
        );
    }

    #[test]
    fn test_stop_signal_aborts() {
        let mut fx = fixture(0);
        let stake = StakeInput::plain(fx.funding.clone(), 0, fx.origin).unwrap();
        let signal = fx.searcher.stop_signal();

        fx.searcher.stop();
        assert!(signal.load(Ordering::SeqCst));
        let result = fx.searcher.search(&stake, EASY_BITS, fx.origin_time + 7_000).unwrap();
        assert_eq!(result, None);

        fx.searcher.reset();
        assert!(!signal.load(Ordering::SeqCst));
    }

    #[test]
    fn test_new_tip_aborts_search() {
        let mut fx = fixture(0);
        let stake = StakeInput::plain(fx.funding.clone(), 0, fx.origin).unwrap();
        let chain = Arc::clone(&fx.chain);
        let next_time = GENESIS_TIME + 121 * 60;
        let mut header = BlockHeader::new(fx.tip, next_time, EASY_BITS);
        header.nonce = 121;
        let next = Block::new(header, vec![Transaction::coinbase(0, Hash::zero(), next_time)]);
        let profile = fx.searcher.profile.clone();

        let mut attempts = 0;
        let result = fx
            .searcher
            .search_with(&stake, 0x03000001, fx.origin_time + 7_000, |_| {
                attempts += 1;
                if attempts == 1 {
                    chain.write().add_block(&next, Hash::zero(), &profile).unwrap();
                }
            })
            .unwrap();

        assert_eq!(result, None);
        assert_eq!(attempts, 1);
        assert!(fx.searcher.recently_hashed(121).is_some());
        assert!(fx.searcher.recently_hashed(120).is_none());
    }

    #[test]
    fn test_coin_on_stale_branch_rejected() {
        let fx = fixture(0);
        let fork_time = GENESIS_TIME + 60;
        let genesis = {
            let chain = fx.chain.read();
            chain.node(chain.active_at(0).unwrap()).hash
        };
        let mut header = BlockHeader::new(genesis, fork_time, EASY_BITS);
        header.nonce = 999;
        let fork = Block::new(
            header,
            vec![Transaction::coinbase(0, Hash::zero(), fork_time), fx.funding.clone()],
        );
        let profile = fx.searcher.profile.clone();
        let fork_id = fx.chain.write().add_block(&fork, Hash::zero(), &profile).unwrap();
        assert!(!fx.chain.read().is_active(fork_id));

        let mut searcher = fx.searcher;
        let stake = StakeInput::plain(fx.funding.clone(), 0, fork.hash()).unwrap();
        assert_eq!(
            searcher.search(&stake, EASY_BITS, fx.origin_time + 7_000),
            Err(ValidationError::MissingAncestor(1))
        );
    }
}
