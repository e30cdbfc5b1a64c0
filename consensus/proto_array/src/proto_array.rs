use crate::error::Error;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use types::{Epoch, Hash256, Slot};

/// A block as the fork choice sees it: its position in time, its identity, and an opaque payload
/// carried for the caller's benefit. The engine never inspects `data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockNode<T> {
    pub slot: Slot,
    pub root: Hash256,
    pub data: T,
}

/// An element of the proto-array.
///
/// All link fields hold *logical* arena indices: they remain valid across prunes and are only
/// meaningful to the `ProtoArray` that issued them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtoNode<T> {
    pub block: BlockNode<T>,
    parent: Option<usize>,
    justified_epoch: Epoch,
    finalized_epoch: Epoch,
    weight: i64,
    best_child: Option<usize>,
    best_descendant: Option<usize>,
}

impl<T> ProtoNode<T> {
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn justified_epoch(&self) -> Epoch {
        self.justified_epoch
    }

    pub fn finalized_epoch(&self) -> Epoch {
        self.finalized_epoch
    }

    pub fn weight(&self) -> i64 {
        self.weight
    }

    pub fn best_child(&self) -> Option<usize> {
        self.best_child
    }

    pub fn best_descendant(&self) -> Option<usize> {
        self.best_descendant
    }
}

/// Receives every node evicted by a prune, synchronously, while the prune runs.
///
/// `canonical` is `true` when the node lay on the canonical chain below the new anchor (i.e., it
/// was finalized rather than orphaned). Implementations must not reenter the engine.
pub trait BlockSink<T> {
    fn on_pruned_block(&mut self, node: ProtoNode<T>, canonical: bool);
}

/// An append-mostly arena of block-tree nodes with cached best-child/best-descendant links.
///
/// Parents always precede children in the arena, so a single backward pass over the nodes can
/// aggregate subtree weights and refresh the cached links (see `Self::apply_score_changes`).
///
/// Pruning drops a prefix of the arena. Logical indices stay stable: `index_offset` records how
/// many nodes have been dropped so far and all stored links are offset by it.
pub struct ProtoArray<T, S> {
    block_sink: S,
    index_offset: usize,
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
    nodes: Vec<ProtoNode<T>>,
    indices: HashMap<Hash256, usize>,
}

impl<T: PartialEq, S> PartialEq for ProtoArray<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.index_offset == other.index_offset
            && self.justified_epoch == other.justified_epoch
            && self.finalized_epoch == other.finalized_epoch
            && self.nodes == other.nodes
            && self.indices == other.indices
    }
}

impl<T, S: BlockSink<T>> ProtoArray<T, S> {
    /// Instantiate an arena containing only the finalized anchor block.
    ///
    /// The anchor's finalized epoch is derived from its slot; its justified epoch is the one
    /// supplied by the caller.
    pub fn new(
        justified_epoch: Epoch,
        finalized_block: BlockNode<T>,
        block_sink: S,
        slots_per_epoch: u64,
    ) -> Self {
        let finalized_epoch = finalized_block.slot.epoch(slots_per_epoch);

        let finalized_node = ProtoNode {
            block: finalized_block,
            parent: None,
            justified_epoch,
            finalized_epoch,
            weight: 0,
            best_child: None,
            best_descendant: None,
        };

        let mut indices = HashMap::new();
        indices.insert(finalized_node.block.root, 0);

        Self {
            block_sink,
            index_offset: 0,
            justified_epoch,
            finalized_epoch,
            nodes: vec![finalized_node],
            indices,
        }
    }

    /// Register a new block with the fork choice.
    ///
    /// A block that is already known is ignored. A block whose parent is unknown is stored as an
    /// orphan; it can still become an anchor or gain children of its own.
    ///
    /// It is only sane to supply a `None` parent for the genesis block.
    pub fn on_block(
        &mut self,
        block: BlockNode<T>,
        parent_root: Option<Hash256>,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<(), Error> {
        if self.indices.contains_key(&block.root) {
            return Ok(());
        }

        let node_index = self.index_offset + self.nodes.len();

        let node = ProtoNode {
            parent: parent_root.and_then(|root| self.indices.get(&root).copied()),
            block,
            justified_epoch,
            finalized_epoch,
            weight: 0,
            best_child: None,
            best_descendant: None,
        };

        self.indices.insert(node.block.root, node_index);
        let parent_index = node.parent;
        self.nodes.push(node);

        if let Some(parent_index) = parent_index {
            self.maybe_update_best_child_and_descendant(parent_index, node_index)?;
        }

        Ok(())
    }

    /// Iterate backwards through the arena, touching all nodes and their parents and potentially
    /// the best-child of each parent.
    ///
    /// The structure of the `self.nodes` array ensures that the child of each node is always
    /// touched before its parent.
    ///
    /// For each node, the following is done:
    ///
    /// - Update the node's weight with the corresponding delta (may be negative).
    /// - Back-propagate the node's delta to its parent's delta.
    /// - Compare the current node with the parent's best-child, updating it if the current node
    ///   should become the best child.
    /// - Update the parent's best-descendant with the current node or its best-descendant, if
    ///   required.
    pub fn apply_score_changes(
        &mut self,
        mut deltas: Vec<i64>,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<(), Error> {
        if deltas.len() != self.nodes.len() {
            return Err(Error::InvalidDeltaLen {
                deltas: deltas.len(),
                nodes: self.nodes.len(),
            });
        }

        if justified_epoch != self.justified_epoch || finalized_epoch != self.finalized_epoch {
            self.justified_epoch = justified_epoch;
            self.finalized_epoch = finalized_epoch;
        }

        for i in (0..self.nodes.len()).rev() {
            let node_index = self.index_offset + i;

            let node_delta = deltas
                .get(i)
                .copied()
                .ok_or_else(|| Error::InvalidNodeDelta(node_index))?;

            let node = self
                .nodes
                .get_mut(i)
                .ok_or_else(|| Error::InvalidNodeIndex(node_index))?;

            node.weight = node
                .weight
                .checked_add(node_delta)
                .ok_or_else(|| Error::DeltaOverflow(node_index))?;

            if let Some(parent_index) = node.parent {
                // The anchor's own parent (and the parents of orphan side-branches) were pruned
                // away; there is nothing left to propagate into.
                if let Some(parent_i) = parent_index.checked_sub(self.index_offset) {
                    let parent_delta = deltas
                        .get_mut(parent_i)
                        .ok_or_else(|| Error::InvalidParentDelta(parent_index))?;

                    // Back-propagate the node's delta to its parent.
                    *parent_delta += node_delta;

                    // Always reconsider the link, even on a zero delta: the child may have become
                    // viable (or not) through the epoch change alone.
                    self.maybe_update_best_child_and_descendant(parent_index, node_index)?;
                }
            }
        }

        Ok(())
    }

    /// Follows the best-descendant links to find the best-block (i.e., head-block).
    ///
    /// ## Notes
    ///
    /// The result of this function is not guaranteed to be accurate if `Self::on_block` has
    /// been called without a subsequent `Self::apply_score_changes` call. This is because
    /// `on_block` does not attempt to walk backwards through the tree and update the
    /// best-child/best-descendant links.
    pub fn find_head(&self, anchor_root: &Hash256) -> Result<&BlockNode<T>, Error> {
        let anchor_index = self
            .indices
            .get(anchor_root)
            .copied()
            .ok_or_else(|| Error::AnchorNodeUnknown(*anchor_root))?;

        let anchor_node = self.node(anchor_index)?;

        let best_descendant_index = anchor_node.best_descendant.unwrap_or(anchor_index);

        let best_node = self.node(best_descendant_index)?;

        // It is a logic error to try and find the head starting from a block that does not match
        // the filter.
        if !self.node_is_viable_for_head(best_node) {
            return Err(Error::InvalidBestNode {
                justified_epoch: self.justified_epoch,
                finalized_epoch: self.finalized_epoch,
                node_justified_epoch: best_node.justified_epoch,
                node_finalized_epoch: best_node.finalized_epoch,
            });
        }

        Ok(&best_node.block)
    }

    /// Iterate the canonical chain from the current head back towards `anchor_root`, the anchor
    /// included.
    ///
    /// The iterator is lazy and restartable; it stops early if it reaches a node whose parent
    /// was pruned away.
    pub fn canonical_chain(
        &self,
        anchor_root: Hash256,
    ) -> Result<CanonicalChainIter<'_, T, S>, Error> {
        let head_root = self.find_head(&anchor_root)?.root;
        let head_index = self
            .indices
            .get(&head_root)
            .copied()
            .ok_or_else(|| Error::NodeUnknown(head_root))?;

        Ok(CanonicalChainIter {
            proto_array: self,
            anchor_root,
            next: Some(head_index),
        })
    }

    /// Drop every node below `anchor_root` from the arena, handing each to the block sink.
    ///
    /// A pruned node is flagged canonical when its best-descendant is the head computed under
    /// the anchor at prune time: those nodes formed the finalized chain, the rest were orphaned.
    ///
    /// Logical indices of surviving nodes are unchanged; `index_offset` advances to the anchor's
    /// index. Pruning to the current anchor is a no-op.
    pub fn on_prune(&mut self, anchor_root: Hash256) -> Result<(), Error> {
        let anchor_index = self
            .indices
            .get(&anchor_root)
            .copied()
            .ok_or_else(|| Error::AnchorNodeUnknown(anchor_root))?;

        if anchor_index == self.index_offset {
            return Ok(());
        }

        let num_pruned = anchor_index
            .checked_sub(self.index_offset)
            .ok_or_else(|| Error::StaleNodeIndex {
                index: anchor_index,
                index_offset: self.index_offset,
            })?;

        let head_root = self.find_head(&anchor_root)?.root;
        let head_index = self
            .indices
            .get(&head_root)
            .copied()
            .ok_or_else(|| Error::NodeUnknown(head_root))?;

        for node in self.nodes.drain(0..num_pruned) {
            self.indices.remove(&node.block.root);
            let canonical = node.best_descendant == Some(head_index);
            self.block_sink.on_pruned_block(node, canonical);
        }

        self.index_offset = anchor_index;

        Ok(())
    }

    /// Returns `true` if the block is known to the arena.
    pub fn contains_block(&self, block_root: &Hash256) -> bool {
        self.indices.contains_key(block_root)
    }

    /// Returns the block for the given root, if known.
    pub fn get_block(&self, block_root: &Hash256) -> Option<&BlockNode<T>> {
        let index = self.indices.get(block_root).copied()?;
        self.node(index).ok().map(|node| &node.block)
    }

    /// The number of live nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The logical index of the first live node. Monotonically non-decreasing.
    pub fn index_offset(&self) -> usize {
        self.index_offset
    }

    pub(crate) fn indices(&self) -> &HashMap<Hash256, usize> {
        &self.indices
    }

    fn node(&self, index: usize) -> Result<&ProtoNode<T>, Error> {
        let i = index
            .checked_sub(self.index_offset)
            .ok_or_else(|| Error::StaleNodeIndex {
                index,
                index_offset: self.index_offset,
            })?;

        self.nodes.get(i).ok_or_else(|| Error::InvalidNodeIndex(index))
    }

    fn node_mut(&mut self, index: usize) -> Result<&mut ProtoNode<T>, Error> {
        let i = index
            .checked_sub(self.index_offset)
            .ok_or_else(|| Error::StaleNodeIndex {
                index,
                index_offset: self.index_offset,
            })?;

        self.nodes
            .get_mut(i)
            .ok_or_else(|| Error::InvalidNodeIndex(index))
    }

    /// Observe the parent at `parent_index` with respect to the child at `child_index` and
    /// potentially modify the `parent.best_child` and `parent.best_descendant` values.
    ///
    /// ## Detail
    ///
    /// There are four outcomes:
    ///
    /// - The child is already the best child but it's now invalid due to a FFG change and should
    ///   be removed.
    /// - The child is already the best child and the parent is updated with the new
    ///   best-descendant.
    /// - The child is not the best child but becomes the best child.
    /// - The child is not the best child and does not become the best child.
    fn maybe_update_best_child_and_descendant(
        &mut self,
        parent_index: usize,
        child_index: usize,
    ) -> Result<(), Error> {
        let child = self.node(child_index)?;
        let parent = self.node(parent_index)?;

        let child_leads_to_viable_head = self.node_leads_to_viable_head(child)?;

        // These three variables are aliases to the three options that we may set the
        // `parent.best_child` and `parent.best_descendant` to.
        let change_to_none = (None, None);
        let change_to_child = (
            Some(child_index),
            child.best_descendant.or(Some(child_index)),
        );
        let no_change = (parent.best_child, parent.best_descendant);

        let (new_best_child, new_best_descendant) =
            if let Some(best_child_index) = parent.best_child {
                if best_child_index == child_index && !child_leads_to_viable_head {
                    // If the child is already the best-child of the parent but it's not viable
                    // for the head, remove it.
                    change_to_none
                } else if best_child_index == child_index {
                    // If the child is the best-child already, set it again to ensure that the
                    // best-descendant of the parent is updated.
                    change_to_child
                } else {
                    let best_child = self.node(best_child_index)?;
                    let best_child_leads_to_viable_head =
                        self.node_leads_to_viable_head(best_child)?;

                    if child_leads_to_viable_head && !best_child_leads_to_viable_head {
                        // The child leads to a viable head, but the current best-child doesn't.
                        change_to_child
                    } else if !child_leads_to_viable_head && best_child_leads_to_viable_head {
                        // The best child leads to a viable head, but the child doesn't.
                        no_change
                    } else if child.weight == best_child.weight {
                        // Tie-breaker of equal weights by root.
                        if child.block.root >= best_child.block.root {
                            change_to_child
                        } else {
                            no_change
                        }
                    } else {
                        // Choose the winner by weight.
                        if child.weight >= best_child.weight {
                            change_to_child
                        } else {
                            no_change
                        }
                    }
                }
            } else if child_leads_to_viable_head {
                // There is no current best-child and the child is viable.
                change_to_child
            } else {
                // There is no current best-child but the child is not viable.
                no_change
            };

        let parent = self.node_mut(parent_index)?;
        parent.best_child = new_best_child;
        parent.best_descendant = new_best_descendant;

        Ok(())
    }

    /// Indicates if the node itself is viable for the head, or if its best descendant is viable
    /// for the head.
    fn node_leads_to_viable_head(&self, node: &ProtoNode<T>) -> Result<bool, Error> {
        let best_descendant_is_viable_for_head =
            if let Some(best_descendant_index) = node.best_descendant {
                let best_descendant = self.node(best_descendant_index)?;
                self.node_is_viable_for_head(best_descendant)
            } else {
                false
            };

        Ok(best_descendant_is_viable_for_head || self.node_is_viable_for_head(node))
    }

    /// Any node that has a different finalized or justified epoch should not be viable for the
    /// head.
    ///
    /// Epoch zero is treated as "any": before the first justification (or finalization) has
    /// happened, every node passes the corresponding half of the filter.
    fn node_is_viable_for_head(&self, node: &ProtoNode<T>) -> bool {
        (node.justified_epoch == self.justified_epoch || self.justified_epoch == Epoch::new(0))
            && (node.finalized_epoch == self.finalized_epoch
                || self.finalized_epoch == Epoch::new(0))
    }
}

/// Lazily walks parent links from the head towards an anchor. See
/// [`ProtoArray::canonical_chain`].
pub struct CanonicalChainIter<'a, T, S> {
    proto_array: &'a ProtoArray<T, S>,
    anchor_root: Hash256,
    next: Option<usize>,
}

impl<'a, T, S> Iterator for CanonicalChainIter<'a, T, S> {
    type Item = &'a BlockNode<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        let i = index.checked_sub(self.proto_array.index_offset)?;
        let node = self.proto_array.nodes.get(i)?;

        self.next = if node.block.root == self.anchor_root {
            None
        } else {
            node.parent
        };

        Some(&node.block)
    }
}
