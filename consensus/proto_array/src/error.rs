use types::{Epoch, Hash256};

#[derive(Clone, PartialEq, Debug)]
pub enum Error {
    /// The anchor root supplied to `find_head` or `on_prune` is not in the index map.
    AnchorNodeUnknown(Hash256),
    /// A root that must resolve (e.g., a freshly computed head) is not in the index map.
    NodeUnknown(Hash256),
    /// An arena index below the current offset was dereferenced; the node it named has been
    /// pruned away.
    StaleNodeIndex { index: usize, index_offset: usize },
    /// An arena index at or above `index_offset + len` was dereferenced.
    InvalidNodeIndex(usize),
    /// The delta list had no entry for the node at the given index.
    InvalidNodeDelta(usize),
    /// The delta list had no entry for the parent at the given index.
    InvalidParentDelta(usize),
    /// `apply_score_changes` requires exactly one delta per live node.
    InvalidDeltaLen { deltas: usize, nodes: usize },
    /// Accumulating a delta into a weight over- or underflowed.
    DeltaOverflow(usize),
    /// The node at the tip of the best-descendant chain fails the FFG viability filter. Finding
    /// a head from this anchor is a logic error.
    InvalidBestNode {
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
        node_justified_epoch: Epoch,
        node_finalized_epoch: Epoch,
    },
}
