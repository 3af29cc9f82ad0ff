//! Cryptography module - double-SHA256 hashing and Schnorr ownership proofs

mod hash;
mod schnorr;

pub use hash::*;
pub use schnorr::*;
