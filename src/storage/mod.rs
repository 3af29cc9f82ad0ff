//! Storage module - block index arena and UTXO view

mod chain_index;
mod utxo;

pub use chain_index::*;
pub use utxo::*;
