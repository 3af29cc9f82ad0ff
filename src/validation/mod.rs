//! Transaction model read by the stake kernel

mod transaction;

pub use transaction::*;
