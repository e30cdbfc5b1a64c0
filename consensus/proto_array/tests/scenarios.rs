//! End-to-end scenarios driving `ProtoArrayForkChoice` through its public interface only.

use proto_array::{BlockNode, BlockSink, ProtoArrayForkChoice, ProtoNode};
use std::cell::RefCell;
use std::rc::Rc;
use types::{ChainSpec, Checkpoint, Epoch, Gwei, Hash256, Slot};

const BALANCE: Gwei = 32_000_000_000;

fn root(i: u64) -> Hash256 {
    Hash256::from_low_u64_be(i)
}

fn block(slot: u64, root_index: u64) -> BlockNode<u64> {
    BlockNode {
        slot: Slot::new(slot),
        root: root(root_index),
        data: root_index,
    }
}

fn checkpoint(epoch: u64, root: Hash256) -> Checkpoint {
    Checkpoint {
        epoch: Epoch::new(epoch),
        root,
    }
}

#[derive(Clone, Default)]
struct RecordingSink(Rc<RefCell<Vec<(Hash256, bool)>>>);

impl<T> BlockSink<T> for RecordingSink {
    fn on_pruned_block(&mut self, node: ProtoNode<T>, canonical: bool) {
        self.0.borrow_mut().push((node.block.root, canonical));
    }
}

/// `b0 (anchor) <- b1 <- b2`, justified and finalized at `b0`, no votes yet.
fn linear_chain() -> (ProtoArrayForkChoice<u64, RecordingSink>, RecordingSink) {
    let sink = RecordingSink::default();
    let fc = ProtoArrayForkChoice::new(
        checkpoint(0, root(1)),
        block(0, 1),
        sink.clone(),
        ChainSpec::mainnet().slots_per_epoch,
    );

    fc.process_block(block(1, 2), Some(root(1)), Epoch::new(0), Epoch::new(0))
        .unwrap();
    fc.process_block(block(2, 3), Some(root(2)), Epoch::new(0), Epoch::new(0))
        .unwrap();

    (fc, sink)
}

/// The linear chain plus the competing `b2'` (root 4) at the same slot as `b2`.
fn forked_chain() -> (ProtoArrayForkChoice<u64, RecordingSink>, RecordingSink) {
    let (fc, sink) = linear_chain();
    fc.process_block(block(2, 4), Some(root(2)), Epoch::new(0), Epoch::new(0))
        .unwrap();
    (fc, sink)
}

#[test]
fn linear_chain_without_votes_heads_at_the_tip() {
    let (fc, _sink) = linear_chain();

    fc.update_justified(checkpoint(0, root(1)), checkpoint(0, root(1)), vec![])
        .unwrap();

    assert_eq!(fc.find_head().unwrap().root, root(3));
    // Idempotent between mutations.
    assert_eq!(fc.find_head().unwrap().root, root(3));
}

#[test]
fn fork_is_broken_by_weight() {
    let (fc, _sink) = forked_chain();

    // One validator backs b2'.
    fc.process_attestation(0, root(4), Epoch::new(1));
    fc.update_justified(
        checkpoint(0, root(1)),
        checkpoint(0, root(1)),
        vec![BALANCE],
    )
    .unwrap();
    assert_eq!(fc.find_head().unwrap().root, root(4));

    // The validator flips to b2.
    fc.process_attestation(0, root(3), Epoch::new(2));
    fc.update_justified(
        checkpoint(0, root(1)),
        checkpoint(0, root(1)),
        vec![BALANCE],
    )
    .unwrap();
    assert_eq!(fc.find_head().unwrap().root, root(3));
}

#[test]
fn equal_weight_fork_is_broken_by_root() {
    let (fc, _sink) = forked_chain();

    fc.process_attestation(0, root(3), Epoch::new(1));
    fc.process_attestation(1, root(4), Epoch::new(1));
    fc.update_justified(
        checkpoint(0, root(1)),
        checkpoint(0, root(1)),
        vec![BALANCE, BALANCE],
    )
    .unwrap();

    // 0x..04 > 0x..03 bytewise.
    assert_eq!(fc.find_head().unwrap().root, root(4));
}

#[test]
fn nodes_outside_the_justified_epoch_are_filtered() {
    let sink = RecordingSink::default();
    let fc = ProtoArrayForkChoice::new(
        checkpoint(0, root(1)),
        block(0, 1),
        sink,
        ChainSpec::mainnet().slots_per_epoch,
    );

    // b1 carries the new justification; b2 predates it.
    fc.process_block(block(1, 2), Some(root(1)), Epoch::new(1), Epoch::new(0))
        .unwrap();
    fc.process_block(block(2, 3), Some(root(2)), Epoch::new(0), Epoch::new(0))
        .unwrap();

    fc.update_justified(checkpoint(1, root(2)), checkpoint(0, root(1)), vec![])
        .unwrap();

    assert_eq!(fc.find_head().unwrap().root, root(2));
}

#[test]
fn prune_reports_the_finalized_chain_and_keeps_the_head() {
    let (fc, sink) = forked_chain();

    fc.process_attestation(0, root(4), Epoch::new(1));
    fc.update_justified(
        checkpoint(0, root(1)),
        checkpoint(0, root(1)),
        vec![BALANCE],
    )
    .unwrap();
    assert_eq!(fc.find_head().unwrap().root, root(4));

    // Justification moves to b1; everything below it can go.
    fc.update_justified(
        checkpoint(0, root(2)),
        checkpoint(0, root(2)),
        vec![BALANCE],
    )
    .unwrap();
    fc.prune(root(2)).unwrap();

    // b0 was on the path to the head, so it was finalized rather than orphaned.
    assert_eq!(*sink.0.borrow(), vec![(root(1), true)]);
    assert!(!fc.contains_block(&root(1)));
    assert_eq!(fc.find_head().unwrap().root, root(4));

    // Pruning again to the same anchor changes nothing.
    fc.prune(root(2)).unwrap();
    assert_eq!(sink.0.borrow().len(), 1);
}

#[test]
fn older_attestations_do_not_regress_the_vote() {
    let (fc, _sink) = forked_chain();

    fc.process_attestation(0, root(3), Epoch::new(5));
    fc.process_attestation(0, root(4), Epoch::new(4));

    assert_eq!(fc.latest_message(0), Some((root(3), Epoch::new(5))));

    fc.update_justified(
        checkpoint(0, root(1)),
        checkpoint(0, root(1)),
        vec![BALANCE],
    )
    .unwrap();
    assert_eq!(fc.find_head().unwrap().root, root(3));
}

#[test]
fn canonical_chain_round_trips_inserted_blocks() {
    let (fc, _sink) = linear_chain();

    fc.update_justified(checkpoint(0, root(1)), checkpoint(0, root(1)), vec![])
        .unwrap();

    let chain: Vec<_> = fc
        .canonical_chain(root(1))
        .unwrap()
        .into_iter()
        .map(|b| (b.root, b.data))
        .collect();

    assert_eq!(
        chain,
        vec![(root(3), 3), (root(2), 2), (root(1), 1)]
    );

    // Anchoring mid-chain includes the anchor and nothing below it.
    let chain: Vec<_> = fc
        .canonical_chain(root(2))
        .unwrap()
        .into_iter()
        .map(|b| b.root)
        .collect();
    assert_eq!(chain, vec![root(3), root(2)]);
}

#[test]
fn duplicate_blocks_are_ignored() {
    let (fc, _sink) = linear_chain();

    // Same root, different payload: the original insert wins.
    fc.process_block(
        BlockNode {
            slot: Slot::new(9),
            root: root(2),
            data: 999,
        },
        Some(root(1)),
        Epoch::new(0),
        Epoch::new(0),
    )
    .unwrap();

    let b1 = fc.get_block(&root(2)).unwrap();
    assert_eq!(b1.slot, Slot::new(1));
    assert_eq!(b1.data, 2);
}

#[test]
fn blocks_with_unknown_parents_are_retained() {
    let (fc, _sink) = linear_chain();

    fc.process_block(block(7, 9), Some(root(42)), Epoch::new(0), Epoch::new(0))
        .unwrap();

    assert!(fc.contains_block(&root(9)));
    // The orphan does not disturb the canonical chain.
    fc.update_justified(checkpoint(0, root(1)), checkpoint(0, root(1)), vec![])
        .unwrap();
    assert_eq!(fc.find_head().unwrap().root, root(3));
}

#[test]
fn votes_for_late_blocks_count_once_the_block_arrives() {
    let (fc, _sink) = linear_chain();

    // The attestation references a block the tree has not seen. It is accepted.
    fc.process_attestation(0, root(4), Epoch::new(1));
    assert_eq!(fc.latest_message(0), Some((root(4), Epoch::new(1))));

    // The block arrives before the next update; the vote lands with it.
    fc.process_block(block(2, 4), Some(root(2)), Epoch::new(0), Epoch::new(0))
        .unwrap();
    fc.update_justified(
        checkpoint(0, root(1)),
        checkpoint(0, root(1)),
        vec![BALANCE],
    )
    .unwrap();

    assert_eq!(fc.find_head().unwrap().root, root(4));
}

#[test]
fn balance_changes_shift_the_head_without_new_votes() {
    let (fc, _sink) = forked_chain();

    fc.process_attestation(0, root(3), Epoch::new(1));
    fc.process_attestation(1, root(4), Epoch::new(1));
    fc.update_justified(
        checkpoint(0, root(1)),
        checkpoint(0, root(1)),
        vec![BALANCE, BALANCE],
    )
    .unwrap();
    // Equal stake: the tie-break picks b2'.
    assert_eq!(fc.find_head().unwrap().root, root(4));

    // Validator 0 gains stake; no vote moved.
    fc.update_justified(
        checkpoint(0, root(1)),
        checkpoint(0, root(1)),
        vec![BALANCE * 2, BALANCE],
    )
    .unwrap();
    assert_eq!(fc.find_head().unwrap().root, root(3));
}

#[test]
fn checkpoints_are_initialized_and_updated() {
    let (fc, _sink) = linear_chain();

    assert_eq!(fc.justified_checkpoint(), checkpoint(0, root(1)));
    assert_eq!(fc.finalized_checkpoint(), checkpoint(0, root(1)));

    fc.process_block(block(64, 5), Some(root(3)), Epoch::new(1), Epoch::new(0))
        .unwrap();
    fc.update_justified(checkpoint(1, root(5)), checkpoint(0, root(1)), vec![])
        .unwrap();

    assert_eq!(fc.justified_checkpoint(), checkpoint(1, root(5)));
    assert_eq!(fc.finalized_checkpoint(), checkpoint(0, root(1)));
}
