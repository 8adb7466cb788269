//! In-memory index host.
//!
//! Trees live in a map of individually locked pages. Besides serving reads it
//! acts as a concurrent writer that can split pages the way a live index
//! does: either completely (right sibling plus parent downlink) or
//! incompletely (right sibling reachable only through the `follow_right`
//! marker until the split is finished). Splits can also be scripted to fire
//! after a given number of page fetches, which makes mid-scan splits
//! reproducible in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::errors::{CrossmatchError, CrossmatchResult};
use crate::extent::Extent;

use super::index_builder::IndexBuilder;
use super::index_constants::{DEFAULT_NODE_CAPACITY, INITIAL_GENERATION, ROOT_PAGE_ID};
use super::index_store::{IntentTracker, SpatialIndexStore, TreeHandle};
use super::index_types::{
    ChildRef, IndexKind, KeyDomain, Node, Page, PageId, RecordLocator, SplitSeq, TreeInfo,
};

/// How a split is published to readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Right sibling created and its downlink installed in the parent
    Complete,
    /// Right sibling created, parent untouched, `follow_right` set
    Incomplete,
}

/// A split applied just before the fetch following the `after_fetches`-th one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedSplit {
    pub after_fetches: u64,
    pub page_id: PageId,
    pub mode: SplitMode,
}

/// In-memory host for spatial trees.
/// Uses Pimpl pattern for cheap cloning and encapsulation.
#[derive(Clone)]
pub struct MemoryIndexStore {
    inner: Arc<MemoryIndexStoreInner>,
}

struct MemoryIndexStoreInner {
    trees: RwLock<HashMap<String, Arc<MemoryTree>>>,
    node_capacity: usize,
}

struct MemoryTree {
    info: TreeInfo,
    pages: RwLock<HashMap<PageId, Arc<RwLock<Page>>>>,
    generation: AtomicU64,
    next_page_id: AtomicU64,
    intents: IntentTracker,
    fetches: AtomicU64,
    scripted: Mutex<Vec<ScriptedSplit>>,
    /// Serializes structural changes
    writer: Mutex<()>,
}

impl Default for MemoryIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::with_node_capacity(DEFAULT_NODE_CAPACITY)
    }

    /// Creates a store whose trees are packed with `node_capacity` entries
    /// per page.
    pub fn with_node_capacity(node_capacity: usize) -> Self {
        Self {
            inner: Arc::new(MemoryIndexStoreInner {
                trees: RwLock::new(HashMap::new()),
                node_capacity,
            }),
        }
    }

    /// Builds a spatial tree from `entries` and registers it under `name`.
    pub fn create_tree<I>(
        &self,
        name: &str,
        domain: KeyDomain,
        entries: I,
    ) -> CrossmatchResult<TreeInfo>
    where
        I: IntoIterator<Item = (Option<Extent>, RecordLocator)>,
    {
        let built = IndexBuilder::new(domain, self.inner.node_capacity)?.build(entries)?;
        let info = TreeInfo {
            tree_id: Uuid::new_v4(),
            name: name.to_string(),
            kind: IndexKind::SpatialTree,
            domain,
            root_page: built.root_page,
            height: built.height,
            entry_count: built.entry_count,
        };
        let pages = built
            .pages
            .into_iter()
            .map(|page| (page.page_id, Arc::new(RwLock::new(page))))
            .collect();

        self.register(MemoryTree::new(info.clone(), pages, built.next_page_id))?;
        log::debug!(
            "Created in-memory spatial index {} ({} entries, height {})",
            name,
            info.entry_count,
            info.height
        );
        Ok(info)
    }

    /// Registers an index of another kind, holding no pages.
    pub fn create_foreign_index(&self, name: &str, kind: IndexKind) -> CrossmatchResult<TreeInfo> {
        if kind.is_spatial() {
            return Err(CrossmatchError::InvalidOperation(
                "spatial indexes must be built with create_tree".into(),
            ));
        }
        let info = TreeInfo {
            tree_id: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            domain: KeyDomain::new(1),
            root_page: ROOT_PAGE_ID,
            height: 0,
            entry_count: 0,
        };
        self.register(MemoryTree::new(info.clone(), HashMap::new(), ROOT_PAGE_ID + 1))?;
        Ok(info)
    }

    fn register(&self, tree: MemoryTree) -> CrossmatchResult<()> {
        let mut trees = self.inner.trees.write();
        if trees.contains_key(&tree.info.name) {
            return Err(CrossmatchError::InvalidOperation(format!(
                "index {} already exists",
                tree.info.name
            )));
        }
        trees.insert(tree.info.name.clone(), Arc::new(tree));
        Ok(())
    }

    /// Removes a tree. Fails while any handle on it is open.
    pub fn drop_tree(&self, name: &str) -> CrossmatchResult<()> {
        let mut trees = self.inner.trees.write();
        let tree = trees
            .get(name)
            .ok_or_else(|| CrossmatchError::NotFound(name.to_string()))?;
        if tree.intents.active() > 0 {
            return Err(CrossmatchError::InvalidOperation(format!(
                "index {} is in use by {} reader(s)",
                name,
                tree.intents.active()
            )));
        }
        trees.remove(name);
        log::debug!("Dropped in-memory index {}", name);
        Ok(())
    }

    /// Number of open handles on a tree.
    pub fn active_intents(&self, name: &str) -> CrossmatchResult<usize> {
        Ok(self.tree(name)?.intents.active())
    }

    /// Number of pages served so far for a tree.
    pub fn fetch_count(&self, name: &str) -> CrossmatchResult<u64> {
        Ok(self.tree(name)?.fetches.load(Ordering::Acquire))
    }

    /// Ids of all pages at `level`, leaves being level 0.
    pub fn page_ids_at_level(&self, name: &str, level: u32) -> CrossmatchResult<Vec<PageId>> {
        let tree = self.tree(name)?;
        let pages: Vec<_> = tree.pages.read().values().cloned().collect();
        let mut ids: Vec<PageId> = pages
            .iter()
            .map(|page| page.read())
            .filter(|page| page.node.level() == level)
            .map(|page| page.page_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Snapshot of a page without opening the tree.
    pub fn read_page(&self, name: &str, page_id: PageId) -> CrossmatchResult<Page> {
        self.tree(name)?.read(page_id)
    }

    /// Overwrites (or adds) a page verbatim.
    pub fn put_page(&self, name: &str, page: Page) -> CrossmatchResult<()> {
        let tree = self.tree(name)?;
        let _writer = tree.writer.lock();
        tree.pages
            .write()
            .insert(page.page_id, Arc::new(RwLock::new(page)));
        Ok(())
    }

    /// Splits a non-root page, moving its upper half to a new right sibling.
    /// Returns the id of the new page.
    pub fn split_page(
        &self,
        name: &str,
        page_id: PageId,
        mode: SplitMode,
    ) -> CrossmatchResult<PageId> {
        let tree = self.tree(name)?;
        let _writer = tree.writer.lock();
        tree.split_locked(page_id, mode)
    }

    /// Installs the missing parent downlink of an incomplete split.
    pub fn finish_split(&self, name: &str, page_id: PageId) -> CrossmatchResult<()> {
        let tree = self.tree(name)?;
        let _writer = tree.writer.lock();
        tree.finish_split_locked(page_id)
    }

    /// Queues a split to happen in the middle of later reads.
    pub fn script_split(&self, name: &str, split: ScriptedSplit) -> CrossmatchResult<()> {
        self.tree(name)?.scripted.lock().push(split);
        Ok(())
    }

    fn tree(&self, name: &str) -> CrossmatchResult<Arc<MemoryTree>> {
        self.inner
            .trees
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CrossmatchError::NotFound(name.to_string()))
    }
}

impl SpatialIndexStore for MemoryIndexStore {
    fn open_tree(&self, name: &str) -> CrossmatchResult<TreeHandle> {
        let trees = self.inner.trees.read();
        let tree = trees
            .get(name)
            .ok_or_else(|| CrossmatchError::NotFound(name.to_string()))?;
        if !tree.info.kind.is_spatial() {
            return Err(CrossmatchError::WrongIndexType {
                name: name.to_string(),
                kind: tree.info.kind.to_string(),
            });
        }
        Ok(TreeHandle::new(tree.info.clone(), tree.intents.acquire()))
    }

    fn fetch_page(&self, handle: &TreeHandle, page_id: PageId) -> CrossmatchResult<Page> {
        let tree = self.tree(handle.name())?;
        if tree.info.tree_id != handle.tree_id() {
            return Err(CrossmatchError::NotFound(handle.name().to_string()));
        }

        let served = tree.fetches.fetch_add(1, Ordering::AcqRel);
        tree.run_scripted(served);
        tree.read(page_id)
    }
}

impl MemoryTree {
    fn new(
        info: TreeInfo,
        pages: HashMap<PageId, Arc<RwLock<Page>>>,
        next_page_id: PageId,
    ) -> Self {
        Self {
            info,
            pages: RwLock::new(pages),
            generation: AtomicU64::new(INITIAL_GENERATION),
            next_page_id: AtomicU64::new(next_page_id),
            intents: IntentTracker::new(),
            fetches: AtomicU64::new(0),
            scripted: Mutex::new(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    fn page(&self, page_id: PageId) -> Option<Arc<RwLock<Page>>> {
        self.pages.read().get(&page_id).cloned()
    }

    fn read(&self, page_id: PageId) -> CrossmatchResult<Page> {
        let page = self
            .page(page_id)
            .ok_or_else(|| CrossmatchError::corrupt(page_id, "page does not exist"))?;
        let snapshot = page.read().clone();
        Ok(snapshot)
    }

    fn bump(&self) -> SplitSeq {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn run_scripted(&self, served: u64) {
        let due: Vec<ScriptedSplit> = {
            let mut scripted = self.scripted.lock();
            let (due, later): (Vec<_>, Vec<_>) = scripted
                .drain(..)
                .partition(|split| split.after_fetches <= served);
            *scripted = later;
            due
        };

        for split in due {
            log::trace!(
                "Applying scripted split of page {} in {} after {} fetches",
                split.page_id,
                self.info.name,
                served
            );
            let _writer = self.writer.lock();
            if let Err(e) = self.split_locked(split.page_id, split.mode) {
                log::warn!(
                    "Scripted split of page {} in {} failed: {}",
                    split.page_id,
                    self.info.name,
                    e
                );
            }
        }
    }

    fn split_locked(&self, page_id: PageId, mode: SplitMode) -> CrossmatchResult<PageId> {
        if page_id == self.info.root_page {
            return Err(CrossmatchError::InvalidOperation(
                "root page cannot be split".into(),
            ));
        }
        let page_lock = self.page(page_id).ok_or_else(|| {
            CrossmatchError::InvalidOperation(format!("no page {} to split", page_id))
        })?;
        if page_lock.read().len() < 2 {
            return Err(CrossmatchError::InvalidOperation(format!(
                "page {} has too few entries to split",
                page_id
            )));
        }

        // an unfinished split must be completed before the page splits again
        self.ensure_downlinked(page_id)?;
        if page_lock.read().follow_right {
            self.finish_split_locked(page_id)?;
        }

        let generation = self.bump();
        let new_page_id = self.next_page_id.fetch_add(1, Ordering::AcqRel);

        let moved_extent = {
            let mut page = page_lock.write();
            let mid = page.len() / 2;
            let moved = page.node.split_off(mid);
            let moved_extent = moved.compute_extent();

            let sibling = Page {
                page_id: new_page_id,
                generation,
                split_seq: page.split_seq,
                right_sibling: page.right_sibling,
                follow_right: false,
                node: moved,
            };
            // the sibling must be readable before anything links to it
            self.pages
                .write()
                .insert(new_page_id, Arc::new(RwLock::new(sibling)));

            page.right_sibling = Some(new_page_id);
            page.generation = generation;
            match mode {
                SplitMode::Complete => page.split_seq = generation,
                SplitMode::Incomplete => page.follow_right = true,
            }
            moved_extent
        };

        if mode == SplitMode::Complete {
            self.install_downlink(page_id, new_page_id, moved_extent, generation)?;
        }

        log::debug!(
            "Split page {} of {} into {} ({:?}, generation {})",
            page_id,
            self.info.name,
            new_page_id,
            mode,
            generation
        );
        Ok(new_page_id)
    }

    fn finish_split_locked(&self, page_id: PageId) -> CrossmatchResult<()> {
        self.ensure_downlinked(page_id)?;

        let page_lock = self.page(page_id).ok_or_else(|| {
            CrossmatchError::InvalidOperation(format!("no page {} to finish", page_id))
        })?;
        let right_id = {
            let page = page_lock.read();
            if !page.follow_right {
                return Err(CrossmatchError::InvalidOperation(format!(
                    "page {} has no pending split",
                    page_id
                )));
            }
            page.right_sibling
                .ok_or_else(|| CrossmatchError::corrupt(page_id, "split marker without right link"))?
        };
        let right_extent = self.read(right_id)?.node.compute_extent();

        // publish on the page first so readers of the old parent keep following
        let generation = self.bump();
        {
            let mut page = page_lock.write();
            page.split_seq = generation;
            page.generation = generation;
            page.follow_right = false;
        }
        self.install_downlink(page_id, right_id, right_extent, generation)
    }

    /// Makes sure `page_id` has a parent downlink, finishing the incomplete
    /// split that created it if needed.
    fn ensure_downlinked(&self, page_id: PageId) -> CrossmatchResult<()> {
        if page_id == self.info.root_page || self.find_parent(page_id).is_some() {
            return Ok(());
        }

        let left = self.find_page(|page| page.follow_right && page.right_sibling == Some(page_id));
        match left {
            Some(left_id) => self.finish_split_locked(left_id),
            None => Err(CrossmatchError::InvalidOperation(format!(
                "page {} is not reachable from a parent",
                page_id
            ))),
        }
    }

    fn install_downlink(
        &self,
        child_id: PageId,
        new_child_id: PageId,
        extent: Option<Extent>,
        generation: SplitSeq,
    ) -> CrossmatchResult<()> {
        let parent_lock = self
            .find_parent(child_id)
            .ok_or_else(|| {
                CrossmatchError::InvalidOperation(format!("page {} has no parent", child_id))
            })?;

        let mut parent = parent_lock.write();
        let parent_id = parent.page_id;
        match &mut parent.node {
            Node::Internal { children, .. } => {
                let position = children
                    .iter()
                    .position(|c| c.page_id == child_id)
                    .ok_or_else(|| CrossmatchError::corrupt(parent_id, "downlink vanished"))?;
                children.insert(
                    position + 1,
                    ChildRef {
                        extent,
                        page_id: new_child_id,
                    },
                );
            }
            Node::Leaf { .. } => {
                return Err(CrossmatchError::corrupt(parent_id, "leaf page has children"))
            }
        }
        parent.generation = generation;
        Ok(())
    }

    fn find_parent(&self, child_id: PageId) -> Option<Arc<RwLock<Page>>> {
        let pages: Vec<_> = self.pages.read().values().cloned().collect();
        pages.into_iter().find(|page| match &page.read().node {
            Node::Internal { children, .. } => children.iter().any(|c| c.page_id == child_id),
            Node::Leaf { .. } => false,
        })
    }

    fn find_page(&self, predicate: impl Fn(&Page) -> bool) -> Option<PageId> {
        let pages: Vec<_> = self.pages.read().values().cloned().collect();
        pages
            .iter()
            .map(|page| page.read())
            .find(|page| predicate(page))
            .map(|page| page.page_id)
    }
}
