//! Reads one logical node of a tree, walking the right-sibling chain left
//! behind by splits that happened after the node's parent was read.

use std::collections::HashSet;

use crate::errors::{CrossmatchError, CrossmatchResult};
use crate::extent::Extent;
use crate::index::{
    Node, Page, PageId, RecordLocator, SpatialIndexStore, SplitSeq, TreeHandle, INVALID_SPLIT_SEQ,
};

use super::session::CrossmatchStats;

/// A leaf entry with geometry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LeafItem {
    pub extent: Extent,
    pub locator: RecordLocator,
}

/// A child reference with geometry, tagged with the generation of the page
/// it was read from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChildItem {
    pub extent: Extent,
    pub page_id: PageId,
    pub parent_seq: SplitSeq,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeContents {
    Leaf(Vec<LeafItem>),
    Internal(Vec<ChildItem>),
}

/// Everything a logical node held at the time it was read.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FetchedNode {
    /// Head of the sibling chain
    pub page_id: PageId,
    /// Sequence the node was requested with
    pub expected_seq: SplitSeq,
    pub level: u32,
    pub contents: NodeContents,
}

impl FetchedNode {
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.contents, NodeContents::Leaf(_))
    }

    pub(crate) fn len(&self) -> usize {
        match &self.contents {
            NodeContents::Leaf(items) => items.len(),
            NodeContents::Internal(items) => items.len(),
        }
    }
}

/// Outcome of comparing a page against the sequence it was requested with.
/// Never leaves this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitCheck {
    Stable,
    ConcurrentSplit { right_sibling: PageId },
}

/// A page was split after `expected` was observed on its parent if it still
/// carries an unfinished split marker or its split became visible later than
/// `expected`. The root pair carries the invalid sequence and never follows.
fn split_check(page: &Page, expected: SplitSeq) -> SplitCheck {
    if expected == INVALID_SPLIT_SEQ {
        return SplitCheck::Stable;
    }
    match page.right_sibling {
        Some(right_sibling) if page.follow_right || expected < page.split_seq => {
            SplitCheck::ConcurrentSplit { right_sibling }
        }
        _ => SplitCheck::Stable,
    }
}

pub(crate) struct PageAccessor<'a> {
    store: &'a dyn SpatialIndexStore,
    dimensions: usize,
    max_sibling_chain: usize,
}

impl<'a> PageAccessor<'a> {
    pub(crate) fn new(
        store: &'a dyn SpatialIndexStore,
        dimensions: usize,
        max_sibling_chain: usize,
    ) -> Self {
        Self {
            store,
            dimensions,
            max_sibling_chain,
        }
    }

    /// Reads the node at `page_id`, which was referenced by a parent whose
    /// generation was `expected_seq` and must sit at `expected_level`.
    ///
    /// Every page is read-locked by the host only while it is copied out.
    /// Entries without an extent are dropped here and counted in `stats`.
    pub(crate) fn fetch(
        &self,
        tree: &TreeHandle,
        page_id: PageId,
        expected_seq: SplitSeq,
        expected_level: u32,
        stats: &mut CrossmatchStats,
    ) -> CrossmatchResult<FetchedNode> {
        let mut visited = HashSet::new();
        let mut current = page_id;
        let mut fetched: Option<FetchedNode> = None;

        loop {
            if !visited.insert(current) {
                return Err(CrossmatchError::corrupt(
                    current,
                    format!("right-sibling chain from page {} loops", page_id),
                ));
            }
            if visited.len() > self.max_sibling_chain + 1 {
                return Err(CrossmatchError::corrupt(
                    current,
                    format!(
                        "right-sibling chain from page {} exceeds {} pages",
                        page_id, self.max_sibling_chain
                    ),
                ));
            }

            let page = self.store.fetch_page(tree, current)?;
            stats.pages_fetched += 1;
            if page.page_id != current {
                return Err(CrossmatchError::corrupt(
                    current,
                    format!("host returned page {}", page.page_id),
                ));
            }

            if fetched.is_none() && page.node.level() != expected_level {
                return Err(CrossmatchError::corrupt(
                    current,
                    format!(
                        "level {} where {} expected",
                        page.node.level(),
                        expected_level
                    ),
                ));
            }

            let node = fetched.get_or_insert_with(|| FetchedNode {
                page_id,
                expected_seq,
                level: page.node.level(),
                contents: if page.is_leaf() {
                    NodeContents::Leaf(Vec::new())
                } else {
                    NodeContents::Internal(Vec::new())
                },
            });
            self.collect(&page, node, stats)?;

            match split_check(&page, expected_seq) {
                SplitCheck::Stable => break,
                SplitCheck::ConcurrentSplit { right_sibling } => {
                    log::trace!(
                        "Page {} of {} split after sequence {}, following right link to {}",
                        current,
                        tree.name(),
                        expected_seq,
                        right_sibling
                    );
                    stats.siblings_followed += 1;
                    current = right_sibling;
                }
            }
        }

        fetched.ok_or_else(|| CrossmatchError::corrupt(page_id, "no page read"))
    }

    /// Appends the entries of `page` to `node`, checking that the page fits
    /// the chain it was reached through.
    fn collect(
        &self,
        page: &Page,
        node: &mut FetchedNode,
        stats: &mut CrossmatchStats,
    ) -> CrossmatchResult<()> {
        let page_id = page.page_id;
        match (&page.node, &mut node.contents) {
            (Node::Leaf { entries }, NodeContents::Leaf(items)) => {
                for entry in entries {
                    let Some(extent) = &entry.extent else {
                        stats.null_extents_skipped += 1;
                        continue;
                    };
                    self.check_dimensions(page_id, extent)?;
                    items.push(LeafItem {
                        extent: extent.clone(),
                        locator: entry.locator,
                    });
                }
                Ok(())
            }
            (Node::Internal { children, level }, NodeContents::Internal(items)) => {
                if *level == 0 {
                    return Err(CrossmatchError::corrupt(page_id, "internal page at level 0"));
                }
                if *level != node.level {
                    return Err(CrossmatchError::corrupt(
                        page_id,
                        format!("level {} in a chain of level {}", level, node.level),
                    ));
                }
                for child in children {
                    let Some(extent) = &child.extent else {
                        log::warn!(
                            "Child {} of page {} has no extent, its subtree is excluded",
                            child.page_id,
                            page_id
                        );
                        stats.null_extents_skipped += 1;
                        continue;
                    };
                    self.check_dimensions(page_id, extent)?;
                    items.push(ChildItem {
                        extent: extent.clone(),
                        page_id: child.page_id,
                        parent_seq: page.generation,
                    });
                }
                Ok(())
            }
            (Node::Leaf { .. }, NodeContents::Internal(_)) => Err(CrossmatchError::corrupt(
                page_id,
                "leaf page chained behind an internal page",
            )),
            (Node::Internal { .. }, NodeContents::Leaf(_)) => Err(CrossmatchError::corrupt(
                page_id,
                "internal page chained behind a leaf page",
            )),
        }
    }

    fn check_dimensions(&self, page_id: PageId, extent: &Extent) -> CrossmatchResult<()> {
        if extent.dimensions() != self.dimensions {
            return Err(CrossmatchError::corrupt(
                page_id,
                format!(
                    "extent {} has {} dimensions, tree has {}",
                    extent,
                    extent.dimensions(),
                    self.dimensions
                ),
            ));
        }
        Ok(())
    }
}
