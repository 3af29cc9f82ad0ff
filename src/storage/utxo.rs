//! UTXO set implementation
//!
//! In-memory view of unspent outputs, enough to run input checks against.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::validation::{OutPoint, Transaction, TxOutput};

/// Unspent output with the context input checks need
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub output: TxOutput,
    /// Height of the block that created the output
    pub height: u64,
    pub is_coinbase: bool,
}

/// Read access to unspent outputs
pub trait CoinsView {
    fn coin(&self, outpoint: &OutPoint) -> Option<&Coin>;

    fn have_inputs(&self, tx: &Transaction) -> bool {
        tx.inputs.iter().all(|input| self.coin(&input.prevout).is_some())
    }
}

/// Set of all unspent transaction outputs
#[derive(Debug, Default)]
pub struct UTXOSet {
    coins: HashMap<OutPoint, Coin>,
}

impl UTXOSet {
    pub fn new() -> Self {
        Self {
            coins: HashMap::new(),
        }
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.coins.contains_key(outpoint)
    }

    pub fn add(&mut self, outpoint: OutPoint, coin: Coin) {
        self.coins.insert(outpoint, coin);
    }

    /// Remove a coin (when spent)
    pub fn remove(&mut self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.remove(outpoint)
    }

    /// Spend the inputs of `tx` and add its outputs
    ///
    /// Returns the spent coins for a later revert. The empty marker output of
    /// a coinstake is not added. Zerocoin inputs have no outpoint to spend.
    pub fn apply_transaction(&mut self, tx: &Transaction, height: u64) -> Vec<(OutPoint, Coin)> {
        let mut spent = Vec::new();
        if !tx.is_coinbase() {
            for input in tx.inputs.iter().filter(|input| !input.is_zerocoin_spend()) {
                if let Some(coin) = self.remove(&input.prevout) {
                    spent.push((input.prevout, coin));
                }
            }
        }

        let tx_hash = tx.hash();
        let is_coinbase = tx.is_coinbase();
        for (index, output) in tx.outputs.iter().enumerate() {
            if output.is_empty() {
                continue;
            }
            self.add(
                OutPoint::new(tx_hash, index as u32),
                Coin {
                    output: output.clone(),
                    height,
                    is_coinbase,
                },
            );
        }
        spent
    }

    /// Remove the outputs of `tx` and restore the coins it spent
    pub fn revert_transaction(&mut self, tx: &Transaction, spent: Vec<(OutPoint, Coin)>) {
        let tx_hash = tx.hash();
        for index in 0..tx.outputs.len() {
            self.remove(&OutPoint::new(tx_hash, index as u32));
        }
        for (outpoint, coin) in spent {
            self.add(outpoint, coin);
        }
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}

impl CoinsView for UTXOSet {
    fn coin(&self, outpoint: &OutPoint) -> Option<&Coin> {
        self.coins.get(outpoint)
    }
}
