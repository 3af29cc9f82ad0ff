//! Double-SHA256 hashing
//!
//! Every consensus hash (block hashes, kernel hashes, selection hashes,
//! modifier checksums) is SHA256 applied twice. Preimages are written as a
//! little-endian fixed-width stream, one field after another.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::U256;

/// 32-byte hash output, stored in digest byte order
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Create a zero hash (used for genesis previous hash)
    pub const fn zero() -> Self {
        Hash([0u8; 32])
    }

    /// Create hash from bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Parse a hash from its display form (most significant byte first)
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        for (dst, src) in arr.iter_mut().zip(bytes.iter().rev()) {
            *dst = *src;
        }
        Ok(Hash(arr))
    }

    /// Display form: the hash read as a 256-bit number, most significant byte first
    pub fn to_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        hex::encode(reversed)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Interpret the digest as a little-endian 256-bit integer
    pub fn to_u256(&self) -> U256 {
        U256::from_little_endian(&self.0)
    }

    pub fn from_u256(value: &U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_little_endian(&mut bytes);
        Hash(bytes)
    }

    /// Lowest 64 bits of the hash read as a number
    pub fn low_u64(&self) -> u64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.0[0..8]);
        u64::from_le_bytes(word)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

/// Double-SHA256 of arbitrary bytes
pub fn hash_bytes(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    Hash(second.into())
}

/// Incremental writer for hash preimages
#[derive(Clone, Default)]
pub struct HashWriter {
    hasher: Sha256,
}

impl HashWriter {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn write_u32(mut self, value: u32) -> Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn write_u64(mut self, value: u64) -> Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn write_hash(mut self, hash: &Hash) -> Self {
        self.hasher.update(hash.0);
        self
    }

    /// Append raw bytes with no length prefix
    pub fn write_bytes(mut self, bytes: &[u8]) -> Self {
        self.hasher.update(bytes);
        self
    }

    /// Finish the double hash
    pub fn finish(self) -> Hash {
        let first = self.hasher.finalize();
        let second = Sha256::digest(first);
        Hash(second.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let data = b"hello world";
        let hash1 = hash_bytes(data);
        let hash2 = hash_bytes(data);
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_inputs() {
        let hash1 = hash_bytes(b"hello");
        let hash2 = hash_bytes(b"world");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_double_sha256_known_vector() {
        // sha256d("") as shown by bitcoin tooling
        let hash = hash_bytes(b"");
        assert_eq!(
            hex::encode(hash.0),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn test_writer_matches_concatenation() {
        let a = hash_bytes(b"a");
        let mut data = Vec::new();
        data.extend_from_slice(&7u32.to_le_bytes());
        data.extend_from_slice(&a.0);
        data.extend_from_slice(&9u64.to_le_bytes());
        data.extend_from_slice(b"xyz");

        let written = HashWriter::new()
            .write_u32(7)
            .write_hash(&a)
            .write_u64(9)
            .write_bytes(b"xyz")
            .finish();
        assert_eq!(written, hash_bytes(&data));
    }

    #[test]
    fn test_hex_roundtrip_display_order() {
        let hash = Hash::from_hex(
            "0x0000ec93e0a3fe0aafa3be7dafe1290f5fca039a4037dd5174bc3dd7a35d67f0",
        )
        .unwrap();
        assert_eq!(hash.0[31], 0x00);
        assert_eq!(hash.0[0], 0xf0);
        assert_eq!(
            hash.to_hex(),
            "0000ec93e0a3fe0aafa3be7dafe1290f5fca039a4037dd5174bc3dd7a35d67f0"
        );
    }

    #[test]
    fn test_u256_roundtrip() {
        let hash = hash_bytes(b"number");
        assert_eq!(Hash::from_u256(&hash.to_u256()), hash);
        assert_eq!(hash.to_u256().low_u64(), hash.low_u64());
    }
}
