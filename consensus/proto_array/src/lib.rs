//! An arena-backed ("proto-array") fork choice.
//!
//! Two layers make up the engine:
//!
//! - [`ProtoArray`]: the block tree itself. An append-mostly arena where parents always precede
//!   children, with cached best-child/best-descendant links maintained under the FFG viability
//!   filter. Pruned nodes are handed to a caller-supplied [`BlockSink`].
//! - [`ProtoArrayForkChoice`]: vote accounting on top of the tree. Tracks each validator's
//!   latest message and the validator balance vector, and folds both into tree weights whenever
//!   justification advances.
//!
//! The caller drives the engine: blocks and attestations flow in as they are verified, the
//! justified/finalized checkpoints and balances arrive from epoch processing, and
//! `find_head` answers with the canonical tip.

mod error;
mod proto_array;
mod proto_array_fork_choice;

pub use crate::error::Error;
pub use crate::proto_array::{BlockNode, BlockSink, CanonicalChainIter, ProtoArray, ProtoNode};
pub use crate::proto_array_fork_choice::{ElasticList, ProtoArrayForkChoice, VoteTracker};
