//! Boundary contract between the cross-match core and the storage layer that
//! owns the trees.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::CrossmatchResult;

use super::index_types::{Page, PageId, TreeId, TreeInfo};

/// Host side of a cross-match: resolves tree names and serves pages.
///
/// Implementations must be safe to call while other threads modify the trees.
/// `fetch_page` read-locks the page only for the duration of the call and
/// returns a snapshot of it.
pub trait SpatialIndexStore: Send + Sync {
    /// Opens a tree by name, taking a read intent on it for the lifetime of
    /// the returned handle.
    ///
    /// Fails with `NotFound` for unknown names and `WrongIndexType` for
    /// indexes that are not spatial trees.
    fn open_tree(&self, name: &str) -> CrossmatchResult<TreeHandle>;

    /// Reads one page of an opened tree.
    fn fetch_page(&self, tree: &TreeHandle, page_id: PageId) -> CrossmatchResult<Page>;

    /// Releases a handle and its read intent.
    fn close_tree(&self, tree: TreeHandle) {
        drop(tree);
    }
}

/// Counts the read intents held on one tree.
#[derive(Debug, Clone, Default)]
pub struct IntentTracker {
    readers: Arc<AtomicUsize>,
}

impl IntentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a new read intent, released when the lease is dropped.
    pub fn acquire(&self) -> IntentLease {
        self.readers.fetch_add(1, Ordering::AcqRel);
        IntentLease {
            readers: self.readers.clone(),
        }
    }

    /// Number of intents currently held.
    pub fn active(&self) -> usize {
        self.readers.load(Ordering::Acquire)
    }
}

/// A held read intent on a tree.
#[derive(Debug)]
pub struct IntentLease {
    readers: Arc<AtomicUsize>,
}

impl Drop for IntentLease {
    fn drop(&mut self) {
        self.readers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An opened tree.
///
/// Dropping the handle releases its read intent.
#[derive(Debug)]
pub struct TreeHandle {
    info: TreeInfo,
    _lease: IntentLease,
}

impl TreeHandle {
    pub fn new(info: TreeInfo, lease: IntentLease) -> Self {
        Self {
            info,
            _lease: lease,
        }
    }

    pub fn info(&self) -> &TreeInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn tree_id(&self) -> TreeId {
        self.info.tree_id
    }

    pub fn root_page(&self) -> PageId {
        self.info.root_page
    }

    /// Checks if both handles refer to the same underlying tree.
    pub fn is_same_tree(&self, other: &TreeHandle) -> bool {
        self.info.tree_id == other.info.tree_id
    }
}
