//! Work and output queues of a session.

use std::collections::VecDeque;

use crate::crossmatch_config::FrontierOrder;
use crate::index::{PageId, RecordLocator, SplitSeq};

/// Unit of traversal work: compare the subtree at `left_page` of the outer
/// tree against the subtree at `right_page` of the inner tree.
///
/// The sequences are the generations of the parent pages the ids were read
/// from, used to detect splits that happened since. The levels are where
/// each page must sit in its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingPair {
    pub left_page: PageId,
    pub right_page: PageId,
    pub left_seq: SplitSeq,
    pub right_seq: SplitSeq,
    pub left_level: u32,
    pub right_level: u32,
}

/// One matched pair: `left` from the outer tree, `right` from the inner tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultPair {
    pub left: RecordLocator,
    pub right: RecordLocator,
}

impl ResultPair {
    pub fn new(left: RecordLocator, right: RecordLocator) -> Self {
        Self { left, right }
    }
}

impl std::fmt::Display for ResultPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.left, self.right)
    }
}

/// Pending pairs awaiting expansion. Unbounded.
#[derive(Debug)]
pub(crate) struct Frontier {
    pending: VecDeque<PendingPair>,
    order: FrontierOrder,
    peak: usize,
}

impl Frontier {
    pub(crate) fn new(order: FrontierOrder) -> Self {
        Self {
            pending: VecDeque::new(),
            order,
            peak: 0,
        }
    }

    pub(crate) fn push_all(&mut self, pairs: impl IntoIterator<Item = PendingPair>) {
        self.pending.extend(pairs);
        self.peak = self.peak.max(self.pending.len());
    }

    pub(crate) fn pop(&mut self) -> Option<PendingPair> {
        match self.order {
            FrontierOrder::DepthFirst => self.pending.pop_back(),
            FrontierOrder::BreadthFirst => self.pending.pop_front(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak
    }

    pub(crate) fn clear(&mut self) {
        self.pending = VecDeque::new();
    }
}

/// Matched pairs ready for the consumer, oldest first.
#[derive(Debug, Default)]
pub(crate) struct ResultQueue {
    results: VecDeque<ResultPair>,
    peak: usize,
}

impl ResultQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_all(&mut self, pairs: impl IntoIterator<Item = ResultPair>) {
        self.results.extend(pairs);
        self.peak = self.peak.max(self.results.len());
    }

    pub(crate) fn pop(&mut self) -> Option<ResultPair> {
        self.results.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.results.len()
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak
    }

    pub(crate) fn clear(&mut self) {
        self.results = VecDeque::new();
    }
}
