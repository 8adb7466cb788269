//! Page and tree metadata types exchanged between the index hosts and the
//! cross-match core.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extent::Extent;

/// Page ID - unique identifier for a page within one tree
pub type PageId = u64;

/// Split sequence / generation value. Zero is never a valid generation.
pub type SplitSeq = u64;

/// Opaque identifier of the record an index entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordLocator(pub u64);

impl RecordLocator {
    pub fn new(value: u64) -> Self {
        RecordLocator(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RecordLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An entry in a leaf page. A missing extent means the record has no geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafEntry {
    pub extent: Option<Extent>,
    pub locator: RecordLocator,
}

impl LeafEntry {
    pub fn new(extent: Option<Extent>, locator: RecordLocator) -> Self {
        Self { extent, locator }
    }
}

/// A child reference in an internal page. The extent bounds the whole subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRef {
    pub extent: Option<Extent>,
    pub page_id: PageId,
}

/// Page body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Leaf node containing actual entries
    Leaf { entries: Vec<LeafEntry> },
    /// Internal node containing child references
    Internal {
        children: Vec<ChildRef>,
        level: u32, // Height from leaf level (leaves are 0)
    },
}

impl Node {
    /// Union of every non-null extent on the node.
    pub fn compute_extent(&self) -> Option<Extent> {
        match self {
            Node::Leaf { entries } => {
                Extent::union_all(entries.iter().filter_map(|e| e.extent.as_ref()))
            }
            Node::Internal { children, .. } => {
                Extent::union_all(children.iter().filter_map(|c| c.extent.as_ref()))
            }
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn level(&self) -> u32 {
        match self {
            Node::Leaf { .. } => 0,
            Node::Internal { level, .. } => *level,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Leaf { entries } => entries.len(),
            Node::Internal { children, .. } => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves the entries from `at` onwards into a new node of the same kind.
    pub(crate) fn split_off(&mut self, at: usize) -> Node {
        match self {
            Node::Leaf { entries } => Node::Leaf {
                entries: entries.split_off(at),
            },
            Node::Internal { children, level } => Node::Internal {
                children: children.split_off(at),
                level: *level,
            },
        }
    }
}

/// A fetched page of a tree.
///
/// `generation` is the tree-wide change counter at the page's last
/// modification; children read from this page inherit it as their expected
/// split sequence. `split_seq` is the generation at which the page's latest
/// split became visible through its parent. `follow_right` marks a split whose
/// parent downlink is still missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub page_id: PageId,
    pub generation: SplitSeq,
    pub split_seq: SplitSeq,
    pub right_sibling: Option<PageId>,
    pub follow_right: bool,
    pub node: Node,
}

impl Page {
    pub fn new(page_id: PageId, generation: SplitSeq, node: Node) -> Self {
        Self {
            page_id,
            generation,
            split_seq: 0,
            right_sibling: None,
            follow_right: false,
            node,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.node.is_leaf()
    }

    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }
}

/// Kind of index stored under a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Balanced tree of bounding extents; the only kind the cross-match reads
    SpatialTree,
    /// Ordered key index
    Ordered,
    /// Hash index
    Hash,
    Other(String),
}

impl IndexKind {
    pub fn is_spatial(&self) -> bool {
        matches!(self, IndexKind::SpatialTree)
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::SpatialTree => write!(f, "spatial"),
            IndexKind::Ordered => write!(f, "ordered"),
            IndexKind::Hash => write!(f, "hash"),
            IndexKind::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Key domain of a spatial index: what its extents mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyDomain {
    pub dimensions: usize,
    /// Spatial reference id, if the keys are tied to one
    pub srid: Option<u32>,
}

impl KeyDomain {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            srid: None,
        }
    }

    pub fn with_srid(mut self, srid: u32) -> Self {
        self.srid = Some(srid);
        self
    }

    /// Returns why two domains cannot be compared, or `None` if they can.
    pub fn incompatibility(&self, other: &KeyDomain) -> Option<String> {
        if self.dimensions != other.dimensions {
            return Some(format!(
                "{} vs {} dimensions",
                self.dimensions, other.dimensions
            ));
        }
        if self.srid != other.srid {
            return Some(format!("srid {:?} vs {:?}", self.srid, other.srid));
        }
        None
    }
}

/// Identifier of an underlying tree, stable for the tree's lifetime
pub type TreeId = Uuid;

/// Metadata describing an opened tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeInfo {
    pub tree_id: TreeId,
    pub name: String,
    pub kind: IndexKind,
    pub domain: KeyDomain,
    pub root_page: PageId,
    pub height: u32,
    pub entry_count: u64,
}
