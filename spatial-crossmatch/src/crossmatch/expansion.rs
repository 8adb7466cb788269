//! Expansion of one page pair into results or further page pairs.

use std::cmp::Ordering;

use crate::crossmatch_config::PairingStrategy;
use crate::extent::{overlaps, Extent};

use super::page_accessor::{ChildItem, FetchedNode, LeafItem, NodeContents};
use super::queues::{PendingPair, ResultPair};

/// Which sides of a pair are leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpansionCase {
    LeafLeaf,
    LeafInternal,
    InternalLeaf,
    InternalInternal,
}

/// Output of expanding one pair.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expansion {
    Results(Vec<ResultPair>),
    Pending(Vec<PendingPair>),
}

impl Expansion {
    pub(crate) fn len(&self) -> usize {
        match self {
            Expansion::Results(results) => results.len(),
            Expansion::Pending(pending) => pending.len(),
        }
    }
}

pub(crate) trait HasExtent {
    fn extent(&self) -> &Extent;
}

impl HasExtent for LeafItem {
    fn extent(&self) -> &Extent {
        &self.extent
    }
}

impl HasExtent for ChildItem {
    fn extent(&self) -> &Extent {
        &self.extent
    }
}

impl HasExtent for Extent {
    fn extent(&self) -> &Extent {
        self
    }
}

pub(crate) fn classify(left: &FetchedNode, right: &FetchedNode) -> ExpansionCase {
    match (left.is_leaf(), right.is_leaf()) {
        (true, true) => ExpansionCase::LeafLeaf,
        (true, false) => ExpansionCase::LeafInternal,
        (false, true) => ExpansionCase::InternalLeaf,
        (false, false) => ExpansionCase::InternalInternal,
    }
}

/// Expands the pair (`left` from the outer tree, `right` from the inner tree).
///
/// Two leaves produce results. Two internal nodes produce a pending pair per
/// overlapping pair of children. A leaf against an internal node stays fixed
/// and is paired with every child overlapping the union of its entries, so
/// descent continues on the internal side only.
pub(crate) fn expand(
    left: &FetchedNode,
    right: &FetchedNode,
    strategy: PairingStrategy,
) -> Expansion {
    match (&left.contents, &right.contents) {
        (NodeContents::Leaf(outer), NodeContents::Leaf(inner)) => Expansion::Results(
            overlapping_pairs(outer, inner, strategy)
                .into_iter()
                .map(|(i, j)| ResultPair::new(outer[i].locator, inner[j].locator))
                .collect(),
        ),
        (NodeContents::Internal(outer), NodeContents::Internal(inner)) => Expansion::Pending(
            overlapping_pairs(outer, inner, strategy)
                .into_iter()
                .map(|(i, j)| PendingPair {
                    left_page: outer[i].page_id,
                    right_page: inner[j].page_id,
                    left_seq: outer[i].parent_seq,
                    right_seq: inner[j].parent_seq,
                    left_level: child_level(left),
                    right_level: child_level(right),
                })
                .collect(),
        ),
        (NodeContents::Leaf(leaf), NodeContents::Internal(children)) => Expansion::Pending(
            overlapping_children(leaf, children)
                .map(|child| PendingPair {
                    left_page: left.page_id,
                    right_page: child.page_id,
                    left_seq: left.expected_seq,
                    right_seq: child.parent_seq,
                    left_level: left.level,
                    right_level: child_level(right),
                })
                .collect(),
        ),
        (NodeContents::Internal(children), NodeContents::Leaf(leaf)) => Expansion::Pending(
            overlapping_children(leaf, children)
                .map(|child| PendingPair {
                    left_page: child.page_id,
                    right_page: right.page_id,
                    left_seq: child.parent_seq,
                    right_seq: right.expected_seq,
                    left_level: child_level(left),
                    right_level: right.level,
                })
                .collect(),
        ),
    }
}

/// Level the children of an internal node must sit at.
fn child_level(node: &FetchedNode) -> u32 {
    node.level.saturating_sub(1)
}

fn overlapping_children<'a>(
    leaf: &[LeafItem],
    children: &'a [ChildItem],
) -> impl Iterator<Item = &'a ChildItem> {
    let bounds = Extent::union_all(leaf.iter().map(|item| &item.extent));
    children
        .iter()
        .filter(move |child| bounds.as_ref().is_some_and(|b| overlaps(b, &child.extent)))
}

/// Returns the index pairs `(i, j)` whose extents overlap. Both strategies
/// return the same set, in different orders.
pub(crate) fn overlapping_pairs<A: HasExtent, B: HasExtent>(
    left: &[A],
    right: &[B],
    strategy: PairingStrategy,
) -> Vec<(usize, usize)> {
    match strategy {
        PairingStrategy::NestedLoop => nested_loop(left, right),
        PairingStrategy::PlaneSweep => plane_sweep(left, right),
    }
}

fn nested_loop<A: HasExtent, B: HasExtent>(left: &[A], right: &[B]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (i, a) in left.iter().enumerate() {
        for (j, b) in right.iter().enumerate() {
            if overlaps(a.extent(), b.extent()) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

fn sorted_by_lower<T: HasExtent>(items: &[T]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| cmp_lower(items[a].extent(), items[b].extent()));
    order
}

fn cmp_lower(a: &Extent, b: &Extent) -> Ordering {
    a.min(0).total_cmp(&b.min(0))
}

fn plane_sweep<A: HasExtent, B: HasExtent>(left: &[A], right: &[B]) -> Vec<(usize, usize)> {
    let left_order = sorted_by_lower(left);
    let right_order = sorted_by_lower(right);
    let mut pairs = Vec::new();

    let (mut i, mut j) = (0, 0);
    while i < left_order.len() && j < right_order.len() {
        let a = left[left_order[i]].extent();
        let b = right[right_order[j]].extent();

        if cmp_lower(a, b) != Ordering::Greater {
            // a opens first: pair it with every right extent starting within it
            for &k in &right_order[j..] {
                let candidate = right[k].extent();
                if candidate.min(0) > a.max(0) {
                    break;
                }
                if overlaps(a, candidate) {
                    pairs.push((left_order[i], k));
                }
            }
            i += 1;
        } else {
            for &k in &left_order[i..] {
                let candidate = left[k].extent();
                if candidate.min(0) > b.max(0) {
                    break;
                }
                if overlaps(candidate, b) {
                    pairs.push((k, right_order[j]));
                }
            }
            j += 1;
        }
    }
    pairs
}
