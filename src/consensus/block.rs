//! Block and header structures
//!
//! The header is the 80-byte Bitcoin-style layout; its double SHA-256 is
//! both the block id and the proof-of-work hash.

use serde::{Deserialize, Serialize};

use crate::crypto::{Hash, HashWriter};
use crate::validation::Transaction;

/// Block header containing all metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Protocol version
    pub version: i32,
    /// Hash of the previous block
    pub prev_hash: Hash,
    /// Merkle root of all transactions
    pub merkle_root: Hash,
    /// Block timestamp (seconds since Unix epoch)
    pub time: u32,
    /// Difficulty target (compact representation)
    pub bits: u32,
    /// Nonce used for PoW
    pub nonce: u32,
}

impl BlockHeader {
    pub fn new(prev_hash: Hash, time: u32, bits: u32) -> Self {
        Self {
            version: 1,
            prev_hash,
            merkle_root: Hash::zero(),
            time,
            bits,
            nonce: 0,
        }
    }

    /// Serialized header, 80 bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(80);
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(&self.prev_hash.0);
        bytes.extend_from_slice(&self.merkle_root.0);
        bytes.extend_from_slice(&self.time.to_le_bytes());
        bytes.extend_from_slice(&self.bits.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    pub fn hash(&self) -> Hash {
        HashWriter::new().write_bytes(&self.to_bytes()).finish()
    }
}

/// A complete block containing header and transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self { header, transactions }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn is_genesis(&self) -> bool {
        self.header.prev_hash.is_zero()
    }

    /// Second transaction is a coinstake
    pub fn is_proof_of_stake(&self) -> bool {
        self.transactions.len() > 1 && self.transactions[1].is_coinstake()
    }

    pub fn coinstake(&self) -> Option<&Transaction> {
        if self.is_proof_of_stake() {
            self.transactions.get(1)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_bytes;
    use crate::validation::{OutPoint, TxInput, TxOutput};

    #[test]
    fn test_block_header_serialization() {
        let header = BlockHeader::new(Hash::zero(), 1234567890, 0x1d00ffff);
        assert_eq!(header.to_bytes().len(), 80);
    }

    #[test]
    fn test_header_hash_commits_to_nonce() {
        let mut header = BlockHeader::new(Hash::zero(), 1234567890, 0x1d00ffff);
        let first = header.hash();
        header.nonce += 1;
        assert_ne!(first, header.hash());
    }

    #[test]
    fn test_genesis_block_detection() {
        let header = BlockHeader::new(Hash::zero(), 1234567890, 0x1d00ffff);
        let block = Block::new(header, vec![]);
        assert!(block.is_genesis());
        assert!(!block.is_proof_of_stake());
    }

    #[test]
    fn test_proof_of_stake_detection() {
        let coinbase = Transaction::coinbase(0, Hash::zero(), 100);
        let coinstake = Transaction::new(
            100,
            vec![TxInput::new(OutPoint::new(hash_bytes(b"stake"), 0))],
            vec![TxOutput::empty(), TxOutput { amount: 1, pubkey_hash: Hash::zero() }],
        );
        let header = BlockHeader::new(hash_bytes(b"parent"), 100, 0x1d00ffff);
        let block = Block::new(header, vec![coinbase, coinstake]);
        assert!(block.is_proof_of_stake());
        assert!(block.coinstake().is_some());
    }
}
