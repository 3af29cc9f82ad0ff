//! Compact target encoding and target arithmetic
//!
//! Targets travel in headers as a 32-bit "compact" float: one size byte
//! followed by a 23-bit mantissa and a sign bit. Everything else works on
//! the decoded [`U256`].

use crate::U256;

/// Result of decoding a compact target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedTarget {
    pub value: U256,
    /// Sign bit set on a non-zero mantissa
    pub negative: bool,
    /// Mantissa shifted past 256 bits
    pub overflow: bool,
}

impl DecodedTarget {
    /// Usable as a target: not negative, not zero, not overflowed
    pub fn is_valid(&self) -> bool {
        !self.negative && !self.overflow && !self.value.is_zero()
    }
}

/// Decode a compact target
pub fn set_compact(bits: u32) -> DecodedTarget {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;

    let value = if size <= 3 {
        word >>= 8 * (3 - size);
        U256::from(word)
    } else {
        U256::from(word) << (8 * (size - 3)) as usize
    };

    let negative = word != 0 && (bits & 0x0080_0000) != 0;
    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

    DecodedTarget {
        value,
        negative,
        overflow,
    }
}

/// Encode a target in compact form, rounding down to 23 bits of mantissa
pub fn get_compact(value: &U256) -> u32 {
    let mut size = ((value.bits() + 7) / 8) as u32;
    let mut compact = if size <= 3 {
        (value.low_u64() << (8 * (3 - size))) as u32
    } else {
        (*value >> (8 * (size - 3)) as usize).low_u32()
    };

    // sign bit would be set, move the mantissa down a byte
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | (size << 24)
}

/// Expected number of hashes to meet `bits`
///
/// Zero for targets that decode negative, zero or overflowed.
pub fn block_proof(bits: u32) -> U256 {
    let target = set_compact(bits);
    if !target.is_valid() {
        return U256::zero();
    }
    // 2^256 / (target + 1) without a 257-bit intermediate
    (!target.value / (target.value + U256::one())) + U256::one()
}

/// `target * weight`, saturating at the maximum value
pub fn weighted_target(target: &U256, weight: &U256) -> U256 {
    target.checked_mul(*weight).unwrap_or_else(U256::max_value)
}
