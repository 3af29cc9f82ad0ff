mod staker;

pub use staker::*;
