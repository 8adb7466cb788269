//! Packs a set of entries into a balanced tree of pages.
//!
//! The builder sorts entries by the Hilbert index of their centers, fills
//! leaves to the node capacity and repeats the process one level up until a
//! single root remains. The root always gets [`ROOT_PAGE_ID`].

use crate::errors::{CrossmatchError, CrossmatchResult};
use crate::extent::Extent;
use crate::hilbert::{hilbert_key, DEFAULT_HILBERT_ORDER};

use super::index_constants::{INITIAL_GENERATION, MIN_NODE_CAPACITY, ROOT_PAGE_ID};
use super::index_types::{ChildRef, KeyDomain, LeafEntry, Node, Page, PageId, RecordLocator};

/// Result of a bulk build.
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub pages: Vec<Page>,
    pub root_page: PageId,
    /// Number of levels, a lone leaf root counts as one
    pub height: u32,
    pub entry_count: u64,
    pub next_page_id: PageId,
}

/// Bulk builder for spatial trees.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    domain: KeyDomain,
    node_capacity: usize,
}

impl IndexBuilder {
    pub fn new(domain: KeyDomain, node_capacity: usize) -> CrossmatchResult<Self> {
        if node_capacity < MIN_NODE_CAPACITY {
            return Err(CrossmatchError::InvalidOperation(format!(
                "node capacity must be at least {}, got {}",
                MIN_NODE_CAPACITY, node_capacity
            )));
        }
        if domain.dimensions == 0 {
            return Err(CrossmatchError::InvalidOperation(
                "key domain must have at least one dimension".into(),
            ));
        }
        Ok(Self {
            domain,
            node_capacity,
        })
    }

    pub fn domain(&self) -> KeyDomain {
        self.domain
    }

    pub fn node_capacity(&self) -> usize {
        self.node_capacity
    }

    /// Builds the pages of a tree holding `entries`.
    pub fn build<I>(&self, entries: I) -> CrossmatchResult<BuiltIndex>
    where
        I: IntoIterator<Item = (Option<Extent>, RecordLocator)>,
    {
        let mut entries: Vec<LeafEntry> = entries
            .into_iter()
            .map(|(extent, locator)| LeafEntry::new(extent, locator))
            .collect();

        for entry in &entries {
            if let Some(extent) = &entry.extent {
                if extent.dimensions() != self.domain.dimensions {
                    return Err(CrossmatchError::InvalidOperation(format!(
                        "entry {} has {} dimensions, index expects {}",
                        entry.locator,
                        extent.dimensions(),
                        self.domain.dimensions
                    )));
                }
            }
        }
        let entry_count = entries.len() as u64;

        // Sort by Hilbert index for spatial locality; null extents go last
        if let Some(bounds) = Extent::union_all(entries.iter().filter_map(|e| e.extent.as_ref())) {
            entries.sort_by_cached_key(|entry| match &entry.extent {
                Some(extent) => (0u8, hilbert_key(extent, &bounds, DEFAULT_HILBERT_ORDER)),
                None => (1u8, 0),
            });
        }

        let mut level: Vec<Node> = if entries.is_empty() {
            vec![Node::Leaf {
                entries: Vec::new(),
            }]
        } else {
            chunk(entries, self.node_capacity)
                .into_iter()
                .map(|entries| Node::Leaf { entries })
                .collect()
        };

        let mut pages = Vec::new();
        let mut next_page_id = ROOT_PAGE_ID + 1;
        let mut height = 1u32;

        while level.len() > 1 {
            let mut children = Vec::with_capacity(level.len());
            for node in level {
                let page_id = next_page_id;
                next_page_id += 1;
                children.push(ChildRef {
                    extent: node.compute_extent(),
                    page_id,
                });
                pages.push(Page::new(page_id, INITIAL_GENERATION, node));
            }

            level = chunk(children, self.node_capacity)
                .into_iter()
                .map(|children| Node::Internal {
                    children,
                    level: height,
                })
                .collect();
            height += 1;
        }

        for root in level {
            pages.push(Page::new(ROOT_PAGE_ID, INITIAL_GENERATION, root));
        }

        log::debug!(
            "Packed {} entries into {} pages (height {})",
            entry_count,
            pages.len(),
            height
        );

        Ok(BuiltIndex {
            pages,
            root_page: ROOT_PAGE_ID,
            height,
            entry_count,
            next_page_id,
        })
    }
}

fn chunk<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size);
    for item in items {
        current.push(item);
        if current.len() == size {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
