//! Consensus module - targets, stake modifiers, kernels and retargeting

mod block;
mod difficulty;
mod kernel;
mod modifier;
mod stake_input;
mod target;
mod validation;

pub use block::*;
pub use difficulty::*;
pub use kernel::*;
pub use modifier::*;
pub use stake_input::*;
pub use target::*;
pub use validation::*;
