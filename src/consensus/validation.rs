//! Rejection taxonomy and context-free transaction checks
//!
//! Every rejection carries a reason string and a misbehaviour score so the
//! caller can account peers, not just a boolean.

use std::collections::HashSet;
use thiserror::Error;

use crate::constants::LOCKTIME_THRESHOLD;
use crate::crypto::Hash;
use crate::params::NetworkProfile;
use crate::storage::CoinsView;
use crate::validation::Transaction;

/// Broad class of a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Chain index or storage does not hold what it must; abort the attempt
    Consistency,
    /// The block or transaction breaks a consensus rule
    Policy,
    /// A compact target decodes to an unusable value
    TargetRange,
}

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Block {0} not found in chain index")]
    UnknownBlock(Hash),
    #[error("No block at height {0} on the active chain")]
    MissingAncestor(u64),
    #[error("Transaction {0} not found")]
    MissingTransaction(Hash),
    #[error("Inputs of transaction {0} unavailable")]
    MissingInputs(Hash),
    #[error("No stake modifier generation found back to genesis")]
    NoModifierGeneration,
    #[error("Unable to select a block at modifier round {0}")]
    ModifierSelectionFailed(usize),
    #[error("Block {0} has no parent and is not the genesis block")]
    OrphanNode(Hash),
    #[error("Stake modifier for block {0} is not yet available")]
    StakeModifierUnavailable(Hash),

    #[error("Block's second transaction is not a coinstake")]
    NotCoinstake,
    #[error("Coinstake time {tx_time} precedes stake origin time {from_time}")]
    TimestampViolation { from_time: i64, tx_time: i64 },
    #[error("Stake from time {from_time} younger than minimum age {min_age} at {tx_time}")]
    MinStakeAge { from_time: i64, min_age: i64, tx_time: i64 },
    #[error("Kernel hash {0} does not meet the weighted target")]
    KernelTargetMiss(Hash),
    #[error("Zerocoin spend used for staking has the wrong spend type")]
    WrongSpendType,
    #[error("Zerocoin stake is only {depth} blocks deep, {required} required")]
    InsufficientStakeDepth { depth: u64, required: u64 },
    #[error("Zerocoin stakes are not valid before the new protocols")]
    ZerocoinStakeBeforeActivation,
    #[error("Coinstake input signature does not prove ownership")]
    InvalidStakeSignature,
    #[error("Coinstake timestamp {tx_time} invalid for block time {block_time}")]
    CoinstakeTimestamp { block_time: i64, tx_time: i64 },
    #[error("Stake modifier checksum {checksum:#010x} fails checkpoint at height {height}")]
    ModifierCheckpointMismatch { height: u64, checksum: u32 },
    #[error("Block hash {0} does not meet its target")]
    HighHash(Hash),

    #[error("Transaction has no inputs")]
    VinEmpty,
    #[error("Transaction has no outputs")]
    VoutEmpty,
    #[error("Empty output in a transaction that is neither coinbase nor coinstake")]
    EmptyUserOutput,
    #[error("Output value above money supply")]
    VoutTooLarge,
    #[error("Output total out of range")]
    OutputTotalTooLarge,
    #[error("{0} zerocoin spends exceed the per-transaction limit")]
    TooManyZerocoinSpends(usize),
    #[error("Zerocoin spend has {0} inputs")]
    ZerocoinSpendInputCount(usize),
    #[error("Zerocoin spend contains non-zerocoin inputs")]
    MixedZerocoinInputs,
    #[error("Duplicate inputs")]
    DuplicateInputs,
    #[error("Input spends a null prevout")]
    NullPrevout,
    #[error("Coinbase spent at depth {0}")]
    PrematureCoinbaseSpend(u64),
    #[error("Input values out of range")]
    InputValuesOutOfRange,
    #[error("Value in {value_in} below value out {value_out}")]
    ValueInBelowOut { value_in: u64, value_out: u64 },
    #[error("Fees out of range")]
    FeeOutOfRange,

    #[error("Compact target {0:#010x} is negative, zero, overflowed or above the limit")]
    TargetOutOfRange(u32),
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        use ValidationError::*;
        match self {
            UnknownBlock(_)
            | MissingAncestor(_)
            | MissingTransaction(_)
            | MissingInputs(_)
            | NoModifierGeneration
            | ModifierSelectionFailed(_)
            | OrphanNode(_) => ErrorKind::Consistency,
            TargetOutOfRange(_) => ErrorKind::TargetRange,
            _ => ErrorKind::Policy,
        }
    }

    /// Short reject reason relayed to peers
    pub fn reject_reason(&self) -> &'static str {
        use ValidationError::*;
        match self {
            UnknownBlock(_) | MissingAncestor(_) => "bad-prevblk",
            MissingTransaction(_) => "bad-cs-txprev",
            MissingInputs(_) => "bad-txns-inputs-missing",
            NoModifierGeneration | ModifierSelectionFailed(_) | StakeModifierUnavailable(_) => {
                "bad-stake-modifier"
            }
            OrphanNode(_) => "bad-prevblk",
            NotCoinstake => "bad-cs-missing",
            TimestampViolation { .. } => "bad-cs-time",
            MinStakeAge { .. } => "bad-cs-age",
            KernelTargetMiss(_) => "bad-cs-kernel",
            WrongSpendType => "bad-zc-spendtype",
            InsufficientStakeDepth { .. } => "bad-zc-depth",
            ZerocoinStakeBeforeActivation => "bad-zc-inactive",
            InvalidStakeSignature => "bad-cs-signature",
            CoinstakeTimestamp { .. } => "bad-cs-timestamp",
            ModifierCheckpointMismatch { .. } => "bad-modifier-checkpoint",
            HighHash(_) => "high-hash",
            VinEmpty => "bad-txns-vin-empty",
            VoutEmpty => "bad-txns-vout-empty",
            EmptyUserOutput => "bad-txns-vout-empty-user",
            VoutTooLarge => "bad-txns-vout-toolarge",
            OutputTotalTooLarge => "bad-txns-txouttotal-toolarge",
            TooManyZerocoinSpends(_) | ZerocoinSpendInputCount(_) => "bad-zerocoinspend",
            MixedZerocoinInputs => "bad-zerocoinspend-inputs",
            DuplicateInputs => "bad-txns-inputs-duplicate",
            NullPrevout => "bad-txns-prevout-null",
            PrematureCoinbaseSpend(_) => "bad-txns-premature-spend-of-coinbase",
            InputValuesOutOfRange => "bad-txns-inputvalues-outofrange",
            ValueInBelowOut { .. } => "bad-txns-in-belowout",
            FeeOutOfRange => "bad-txns-fee-outofrange",
            TargetOutOfRange(_) => "bad-diffbits",
        }
    }

    /// Misbehaviour score charged to the peer that relayed the object
    pub fn dos_score(&self) -> u32 {
        use ValidationError::*;
        match self.kind() {
            ErrorKind::Consistency => 0,
            ErrorKind::TargetRange => 100,
            ErrorKind::Policy => match self {
                VinEmpty | VoutEmpty | NullPrevout | ZerocoinSpendInputCount(_) => 10,
                PrematureCoinbaseSpend(_) | StakeModifierUnavailable(_) => 0,
                HighHash(_) => 50,
                _ => 100,
            },
        }
    }
}

/// Context-free transaction checks for a transaction in a block at `height`
pub fn check_transaction(
    tx: &Transaction,
    height: u64,
    profile: &NetworkProfile,
) -> Result<(), ValidationError> {
    if tx.inputs.is_empty() {
        return Err(ValidationError::VinEmpty);
    }
    if tx.outputs.is_empty() {
        return Err(ValidationError::VoutEmpty);
    }

    let user_tx = !tx.is_coinbase() && !tx.is_coinstake();
    let mut value_out: u64 = 0;
    for output in &tx.outputs {
        if user_tx && output.is_empty() {
            return Err(ValidationError::EmptyUserOutput);
        }
        if output.amount > profile.max_money {
            return Err(ValidationError::VoutTooLarge);
        }
        value_out = value_out
            .checked_add(output.amount)
            .filter(|total| *total <= profile.max_money)
            .ok_or(ValidationError::OutputTotalTooLarge)?;
    }

    let zerocoin_active = profile.is_zerocoin_active(height);
    if zerocoin_active {
        let spends = tx.inputs.iter().filter(|input| input.is_zerocoin_spend()).count();
        if tx.is_zerocoin_spend() {
            if spends != tx.inputs.len() {
                return Err(ValidationError::MixedZerocoinInputs);
            }
        } else if spends > profile.max_zerocoin_spends_per_tx {
            return Err(ValidationError::TooManyZerocoinSpends(spends));
        }
    }

    // duplicate serials are the zerocoin layer's concern
    let mut seen = HashSet::new();
    for input in tx.inputs.iter().filter(|input| !input.is_zerocoin_spend()) {
        if !seen.insert(input.prevout) {
            return Err(ValidationError::DuplicateInputs);
        }
    }

    if tx.is_coinbase() {
        return Ok(());
    }
    if tx.is_zerocoin_spend() {
        if zerocoin_active && !(1..=profile.max_zerocoin_spends_per_tx).contains(&tx.inputs.len()) {
            return Err(ValidationError::ZerocoinSpendInputCount(tx.inputs.len()));
        }
    } else if tx.inputs.iter().any(|input| input.prevout.is_null()) {
        return Err(ValidationError::NullPrevout);
    }

    Ok(())
}

/// Checks against the coins being spent
pub fn check_tx_inputs<C: CoinsView>(
    tx: &Transaction,
    coins: &C,
    spend_height: u64,
    profile: &NetworkProfile,
) -> Result<u64, ValidationError> {
    let mut value_in: u64 = 0;

    for input in &tx.inputs {
        let coin = coins
            .coin(&input.prevout)
            .ok_or_else(|| ValidationError::MissingInputs(tx.hash()))?;

        if coin.is_coinbase {
            let depth = spend_height.saturating_sub(coin.height);
            if depth < profile.coinbase_maturity {
                return Err(ValidationError::PrematureCoinbaseSpend(depth));
            }
        }

        if coin.output.amount > profile.max_money {
            return Err(ValidationError::InputValuesOutOfRange);
        }
        value_in = value_in
            .checked_add(coin.output.amount)
            .filter(|total| *total <= profile.max_money)
            .ok_or(ValidationError::InputValuesOutOfRange)?;
    }

    let value_out = tx
        .total_output_value()
        .ok_or(ValidationError::OutputTotalTooLarge)?;
    if value_in < value_out {
        return Err(ValidationError::ValueInBelowOut { value_in, value_out });
    }

    let fee = value_in - value_out;
    if fee > profile.max_money {
        return Err(ValidationError::FeeOutOfRange);
    }
    Ok(fee)
}

/// Lock-time finality at the given block height and time
pub fn is_final_tx(tx: &Transaction, block_height: u64, block_time: i64) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let threshold = if tx.lock_time < LOCKTIME_THRESHOLD {
        block_height as i64
    } else {
        block_time
    };
    if (tx.lock_time as i64) < threshold {
        return true;
    }
    tx.inputs.iter().all(|input| input.is_final())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;
    use crate::crypto::hash_bytes;
    use crate::storage::{Coin, UTXOSet};
    use crate::validation::{OutPoint, SpendType, TxInput, TxOutput, ZerocoinSpend};

    fn output(amount: u64) -> TxOutput {
        TxOutput {
            amount,
            pubkey_hash: hash_bytes(b"owner"),
        }
    }

    fn spend_of(label: &[u8], index: u32) -> TxInput {
        TxInput::new(OutPoint::new(hash_bytes(label), index))
    }

    fn zerocoin_input() -> TxInput {
        TxInput::zerocoin_spend(ZerocoinSpend {
            spend_type: SpendType::Spend,
            serial_hash: hash_bytes(b"serial"),
            denomination: 10,
            checkpoint_block: Hash::zero(),
        })
    }

    #[test]
    fn test_error_taxonomy() {
        assert_eq!(ValidationError::UnknownBlock(Hash::zero()).kind(), ErrorKind::Consistency);
        assert_eq!(ValidationError::UnknownBlock(Hash::zero()).dos_score(), 0);
        assert_eq!(ValidationError::TargetOutOfRange(0).kind(), ErrorKind::TargetRange);
        assert_eq!(ValidationError::VinEmpty.dos_score(), 10);
        assert_eq!(ValidationError::DuplicateInputs.dos_score(), 100);
        assert_eq!(ValidationError::DuplicateInputs.reject_reason(), "bad-txns-inputs-duplicate");
    }

    #[test]
    fn test_empty_vin_and_vout() {
        let profile = NetworkProfile::unittest();
        let no_inputs = Transaction::new(0, vec![], vec![output(1)]);
        assert_eq!(check_transaction(&no_inputs, 1, &profile), Err(ValidationError::VinEmpty));

        let no_outputs = Transaction::new(0, vec![spend_of(b"a", 0)], vec![]);
        assert_eq!(check_transaction(&no_outputs, 1, &profile), Err(ValidationError::VoutEmpty));
    }

    #[test]
    fn test_value_ranges() {
        let profile = NetworkProfile::unittest();
        let too_large = Transaction::new(0, vec![spend_of(b"a", 0)], vec![output(profile.max_money + 1)]);
        assert_eq!(check_transaction(&too_large, 1, &profile), Err(ValidationError::VoutTooLarge));

        let total_too_large = Transaction::new(
            0,
            vec![spend_of(b"a", 0)],
            vec![output(profile.max_money), output(1)],
        );
        assert_eq!(
            check_transaction(&total_too_large, 1, &profile),
            Err(ValidationError::OutputTotalTooLarge)
        );
    }

    #[test]
    fn test_duplicate_inputs() {
        let profile = NetworkProfile::unittest();
        let tx = Transaction::new(0, vec![spend_of(b"a", 0), spend_of(b"a", 0)], vec![output(1)]);
        assert_eq!(check_transaction(&tx, 1, &profile), Err(ValidationError::DuplicateInputs));

        let ok = Transaction::new(0, vec![spend_of(b"a", 0), spend_of(b"a", 1)], vec![output(1)]);
        assert!(check_transaction(&ok, 1, &profile).is_ok());
    }

    #[test]
    fn test_null_prevout_rejected() {
        let profile = NetworkProfile::unittest();
        let tx = Transaction::new(
            0,
            vec![spend_of(b"a", 0), TxInput::new(OutPoint::null())],
            vec![output(1)],
        );
        assert_eq!(check_transaction(&tx, 1, &profile), Err(ValidationError::NullPrevout));

        let coinbase = Transaction::coinbase(50, Hash::zero(), 0);
        assert!(check_transaction(&coinbase, 1, &profile).is_ok());
    }

    #[test]
    fn test_zerocoin_spend_limits() {
        let profile = NetworkProfile::unittest();
        let active = profile.zerocoin_start_height;
        let max = profile.max_zerocoin_spends_per_tx;

        let oversized = Transaction::new(0, vec![zerocoin_input(); max + 1], vec![output(1)]);
        let err = check_transaction(&oversized, active, &profile).unwrap_err();
        assert_eq!(err, ValidationError::ZerocoinSpendInputCount(max + 1));
        assert_eq!(err.reject_reason(), "bad-zerocoinspend");
        assert_eq!(err.dos_score(), 10);
        // before activation the count is not limited
        assert!(check_transaction(&oversized, active - 1, &profile).is_ok());

        let mut smuggled = vec![spend_of(b"a", 0)];
        smuggled.extend(vec![zerocoin_input(); max + 1]);
        let smuggled = Transaction::new(0, smuggled, vec![output(1)]);
        assert_eq!(
            check_transaction(&smuggled, active, &profile),
            Err(ValidationError::TooManyZerocoinSpends(max + 1))
        );

        let mixed = Transaction::new(0, vec![zerocoin_input(), spend_of(b"a", 0)], vec![output(1)]);
        assert_eq!(check_transaction(&mixed, active, &profile), Err(ValidationError::MixedZerocoinInputs));

        let within = Transaction::new(0, vec![zerocoin_input(); max], vec![output(1)]);
        assert!(check_transaction(&within, active, &profile).is_ok());
    }

    #[test]
    fn test_empty_output_only_in_coinbase_or_coinstake() {
        let profile = NetworkProfile::unittest();
        let user = Transaction::new(0, vec![spend_of(b"a", 0)], vec![TxOutput::empty()]);
        assert!(!user.is_coinstake());
        let err = check_transaction(&user, 1, &profile).unwrap_err();
        assert_eq!(err, ValidationError::EmptyUserOutput);
        assert_eq!(err.dos_score(), 100);

        let marker_last = Transaction::new(0, vec![spend_of(b"a", 0)], vec![output(1), TxOutput::empty()]);
        assert_eq!(check_transaction(&marker_last, 1, &profile), Err(ValidationError::EmptyUserOutput));

        let coinstake = Transaction::new(0, vec![spend_of(b"a", 0)], vec![TxOutput::empty(), output(1), output(2)]);
        assert!(coinstake.is_coinstake());
        assert!(check_transaction(&coinstake, 1, &profile).is_ok());

        let coinbase = Transaction::coinbase(0, Hash::zero(), 0);
        assert!(check_transaction(&coinbase, 1, &profile).is_ok());
    }

    #[test]
    fn test_tx_inputs_value_and_maturity() {
        let profile = NetworkProfile::unittest();
        let mut coins = UTXOSet::new();
        let funding = OutPoint::new(hash_bytes(b"funding"), 0);
        coins.add(funding, Coin { output: output(10 * COIN), height: 5, is_coinbase: true });

        let tx = Transaction::new(0, vec![TxInput::new(funding)], vec![output(9 * COIN)]);

        assert_eq!(
            check_tx_inputs(&tx, &coins, 50, &profile),
            Err(ValidationError::PrematureCoinbaseSpend(45))
        );
        assert_eq!(check_tx_inputs(&tx, &coins, 105, &profile), Ok(COIN));

        let overspend = Transaction::new(0, vec![TxInput::new(funding)], vec![output(11 * COIN)]);
        assert_eq!(
            check_tx_inputs(&overspend, &coins, 105, &profile),
            Err(ValidationError::ValueInBelowOut { value_in: 10 * COIN, value_out: 11 * COIN })
        );
    }

    #[test]
    fn test_tx_inputs_missing() {
        let profile = NetworkProfile::unittest();
        let coins = UTXOSet::new();
        let tx = Transaction::new(0, vec![spend_of(b"nowhere", 0)], vec![output(1)]);
        let err = check_tx_inputs(&tx, &coins, 10, &profile).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
    }

    #[test]
    fn test_final_tx() {
        let mut tx = Transaction::new(0, vec![spend_of(b"a", 0)], vec![output(1)]);
        assert!(is_final_tx(&tx, 10, 0));

        tx.lock_time = 20;
        assert!(is_final_tx(&tx, 21, 0));

        tx.inputs[0].sequence = 0;
        assert!(!is_final_tx(&tx, 20, 0));

        tx.lock_time = LOCKTIME_THRESHOLD + 100;
        assert!(is_final_tx(&tx, 0, (LOCKTIME_THRESHOLD + 101) as i64));
        assert!(!is_final_tx(&tx, 0, (LOCKTIME_THRESHOLD + 50) as i64));
    }
}
