//! Primitive consensus types shared across the fork-choice workspace.
//!
//! This crate deliberately contains only what the fork choice itself needs to speak about:
//! identifiers, time units, balances and FFG checkpoints. Everything block-shaped is carried by
//! the caller as an opaque payload.

mod chain_spec;
mod checkpoint;
mod slot_epoch;

pub use crate::chain_spec::ChainSpec;
pub use crate::checkpoint::Checkpoint;
pub use crate::slot_epoch::{Epoch, Slot};

/// The 32-byte identifier of a block. `H256` compares as unsigned big-endian bytes, which is
/// exactly the total order the fork-choice tie-break requires.
pub type Hash256 = ethereum_types::H256;

/// Unsigned balance unit (10^-9 of the base denomination).
pub type Gwei = u64;
