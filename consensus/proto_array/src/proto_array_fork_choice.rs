use crate::error::Error;
use crate::proto_array::{BlockNode, BlockSink, ProtoArray};
use parking_lot::RwLock;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use types::{Checkpoint, Epoch, Gwei, Hash256};

/// The latest message of a single validator.
///
/// `current_root` is the vote already reflected in the tree weights; `(next_root, next_epoch)`
/// is the most recent attestation target, waiting for the next score pass to replace it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteTracker {
    current_root: Hash256,
    next_root: Hash256,
    next_epoch: Epoch,
}

/// A `Vec`-wrapper which will grow to match any request.
///
/// E.g., a `get(10)` on a list of length 4 will grow the list to 10 first. The fork choice
/// learns about validators lazily, as their first attestations arrive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElasticList<T>(pub Vec<T>);

impl<T: Default> ElasticList<T> {
    fn ensure(&mut self, i: usize) {
        if self.0.len() <= i {
            self.0.resize_with(i + 1, Default::default);
        }
    }

    pub fn get_mut(&mut self, i: usize) -> &mut T {
        self.ensure(i);
        &mut self.0[i]
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        self.0.get(i)
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.0.iter_mut()
    }
}

/// The justified and finalized checkpoints the fork choice last applied, updated together.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Checkpoints {
    justified: Checkpoint,
    finalized: Checkpoint,
}

/// Vote accounting on top of a [`ProtoArray`].
///
/// Owns the block tree, the per-validator latest-message table and the last-applied balance
/// vector. Attestations and blocks are buffered cheaply as they arrive;
/// `Self::update_justified` is the single point where votes and balance changes are folded into
/// tree weights.
///
/// Individual fields are behind `RwLock`s so that queries take `&self`; callers still provide
/// mutual exclusion across calls (the engine assumes a serial order of mutations).
pub struct ProtoArrayForkChoice<T, S> {
    proto_array: RwLock<ProtoArray<T, S>>,
    votes: RwLock<ElasticList<VoteTracker>>,
    balances: RwLock<Vec<Gwei>>,
    checkpoints: RwLock<Checkpoints>,
}

impl<T: PartialEq, S> PartialEq for ProtoArrayForkChoice<T, S> {
    fn eq(&self, other: &Self) -> bool {
        *self.proto_array.read() == *other.proto_array.read()
            && *self.votes.read() == *other.votes.read()
            && *self.balances.read() == *other.balances.read()
            && *self.checkpoints.read() == *other.checkpoints.read()
    }
}

impl<T: Clone, S: BlockSink<T>> ProtoArrayForkChoice<T, S> {
    /// Instantiate the fork choice from the finalized anchor block.
    ///
    /// Both checkpoints are initialized here: `justified` as supplied, `finalized` derived from
    /// the anchor block itself.
    pub fn new(
        justified: Checkpoint,
        finalized_block: BlockNode<T>,
        block_sink: S,
        slots_per_epoch: u64,
    ) -> Self {
        let finalized = Checkpoint {
            epoch: finalized_block.slot.epoch(slots_per_epoch),
            root: finalized_block.root,
        };

        let proto_array = ProtoArray::new(
            justified.epoch,
            finalized_block,
            block_sink,
            slots_per_epoch,
        );

        Self {
            proto_array: RwLock::new(proto_array),
            votes: RwLock::new(ElasticList::default()),
            balances: RwLock::new(vec![]),
            checkpoints: RwLock::new(Checkpoints {
                justified,
                finalized,
            }),
        }
    }

    /// Record the latest message of `validator_index`.
    ///
    /// Attestations with a target epoch at or below the recorded one are dropped; a validator's
    /// latest message never regresses. The tree is not touched here — the vote takes effect at
    /// the next `Self::update_justified`.
    pub fn process_attestation(
        &self,
        validator_index: usize,
        block_root: Hash256,
        target_epoch: Epoch,
    ) {
        let mut votes = self.votes.write();
        let vote = votes.get_mut(validator_index);

        // A fresh tracker is all zeros; the first real vote must land even at target epoch zero.
        if target_epoch > vote.next_epoch || *vote == VoteTracker::default() {
            vote.next_root = block_root;
            vote.next_epoch = target_epoch;
        }
    }

    /// Register a block with the underlying tree. See [`ProtoArray::on_block`].
    pub fn process_block(
        &self,
        block: BlockNode<T>,
        parent_root: Option<Hash256>,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<(), Error> {
        self.proto_array
            .write()
            .on_block(block, parent_root, justified_epoch, finalized_epoch)
    }

    /// Fold pending votes and balance changes into tree weights, then adopt the supplied
    /// checkpoints.
    ///
    /// This is the only operation that changes node weights. `new_balances` is the effective
    /// balance vector of the newly justified state, indexed by validator index.
    pub fn update_justified(
        &self,
        justified: Checkpoint,
        finalized: Checkpoint,
        new_balances: Vec<Gwei>,
    ) -> Result<(), Error> {
        let mut proto_array = self.proto_array.write();
        let mut votes = self.votes.write();
        let mut balances = self.balances.write();

        let deltas = compute_deltas(
            proto_array.index_offset(),
            proto_array.len(),
            proto_array.indices(),
            &mut votes,
            &balances,
            &new_balances,
        )?;

        proto_array.apply_score_changes(deltas, justified.epoch, finalized.epoch)?;

        *balances = new_balances;
        *self.checkpoints.write() = Checkpoints {
            justified,
            finalized,
        };

        Ok(())
    }

    /// Run the fork choice rule from the stored justified checkpoint.
    pub fn find_head(&self) -> Result<BlockNode<T>, Error> {
        let justified_root = self.checkpoints.read().justified.root;
        self.proto_array
            .read()
            .find_head(&justified_root)
            .map(Clone::clone)
    }

    /// The canonical chain from the current head back to `anchor_root`, head first.
    pub fn canonical_chain(&self, anchor_root: Hash256) -> Result<Vec<BlockNode<T>>, Error> {
        let proto_array = self.proto_array.read();
        Ok(proto_array.canonical_chain(anchor_root)?.cloned().collect())
    }

    /// Prune the underlying tree to `anchor_root`. See [`ProtoArray::on_prune`].
    pub fn prune(&self, anchor_root: Hash256) -> Result<(), Error> {
        self.proto_array.write().on_prune(anchor_root)
    }

    /// Returns `true` if the block is known.
    pub fn contains_block(&self, block_root: &Hash256) -> bool {
        self.proto_array.read().contains_block(block_root)
    }

    /// Returns the block for the given root, if known.
    pub fn get_block(&self, block_root: &Hash256) -> Option<BlockNode<T>> {
        self.proto_array.read().get_block(block_root).cloned()
    }

    /// Returns the latest message for a given validator, if any.
    ///
    /// Returns `(block_root, target_epoch)` of the most recent attestation, whether or not it
    /// has been folded into the tree weights yet.
    pub fn latest_message(&self, validator_index: usize) -> Option<(Hash256, Epoch)> {
        let votes = self.votes.read();

        match votes.get(validator_index) {
            Some(vote) if *vote != VoteTracker::default() => {
                Some((vote.next_root, vote.next_epoch))
            }
            _ => None,
        }
    }

    pub fn justified_checkpoint(&self) -> Checkpoint {
        self.checkpoints.read().justified
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.checkpoints.read().finalized
    }
}

/// Returns a list of `deltas`, one per live arena node, reflecting every vote movement and
/// balance change since the previous call.
///
/// ## Errors
///
/// - If a vote targets a node below the arena offset (pruning must have removed the root from
///   `indices` first, so this indicates corruption).
/// - If accumulating a balance over- or underflows a delta.
fn compute_deltas(
    index_offset: usize,
    num_nodes: usize,
    indices: &HashMap<Hash256, usize>,
    votes: &mut ElasticList<VoteTracker>,
    old_balances: &[Gwei],
    new_balances: &[Gwei],
) -> Result<Vec<i64>, Error> {
    let mut deltas = vec![0_i64; num_nodes];

    for (val_index, vote) in votes.iter_mut().enumerate() {
        // There is no need to create a score change if the validator has never voted (may not
        // exist yet) or both their votes are for the zero hash (genesis).
        if vote.current_root == Hash256::zero() && vote.next_root == Hash256::zero() {
            continue;
        }

        // Validator sets may grow between updates; an index past either balance list is simply a
        // zero balance.
        let old_balance = old_balances.get(val_index).copied().unwrap_or(0);
        let new_balance = new_balances.get(val_index).copied().unwrap_or(0);

        if vote.current_root != vote.next_root || old_balance != new_balance {
            // Votes for roots the tree does not know are ignored here; they become effective
            // once the block arrives and a later pass promotes them.
            if let Some(current_index) = indices.get(&vote.current_root).copied() {
                let i = current_index
                    .checked_sub(index_offset)
                    .ok_or_else(|| Error::StaleNodeIndex {
                        index: current_index,
                        index_offset,
                    })?;

                let delta = deltas
                    .get(i)
                    .copied()
                    .ok_or_else(|| Error::InvalidNodeDelta(current_index))?
                    .checked_sub(old_balance as i64)
                    .ok_or_else(|| Error::DeltaOverflow(current_index))?;

                // Array access safe due to check on previous line.
                deltas[i] = delta;
            }

            if let Some(next_index) = indices.get(&vote.next_root).copied() {
                let i = next_index
                    .checked_sub(index_offset)
                    .ok_or_else(|| Error::StaleNodeIndex {
                        index: next_index,
                        index_offset,
                    })?;

                let delta = deltas
                    .get(i)
                    .copied()
                    .ok_or_else(|| Error::InvalidNodeDelta(next_index))?
                    .checked_add(new_balance as i64)
                    .ok_or_else(|| Error::DeltaOverflow(next_index))?;

                // Array access safe due to check on previous line.
                deltas[i] = delta;
            }

            vote.current_root = vote.next_root;
        }
    }

    Ok(deltas)
}
