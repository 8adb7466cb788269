//! File-backed index host.
//!
//! A directory with one `<name>.xmidx` file per tree. Trees are loaded
//! lazily on first open and pages are read straight from disk on every
//! fetch, so nothing besides the header is cached.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::errors::{CrossmatchError, CrossmatchResult};
use crate::extent::Extent;

use super::file_storage::{FileHeader, Storage};
use super::index_builder::IndexBuilder;
use super::index_constants::{DEFAULT_NODE_CAPACITY, INDEX_FILE_EXTENSION, ROOT_PAGE_ID};
use super::index_store::{IntentTracker, SpatialIndexStore, TreeHandle};
use super::index_types::{IndexKind, KeyDomain, Page, PageId, RecordLocator, TreeInfo};

/// Directory of persisted spatial trees.
/// Uses Pimpl pattern for cheap cloning and encapsulation.
#[derive(Clone)]
pub struct FileIndexStore {
    inner: Arc<FileIndexStoreInner>,
}

struct FileIndexStoreInner {
    dir: PathBuf,
    trees: RwLock<HashMap<String, Arc<FileTree>>>,
    node_capacity: usize,
}

struct FileTree {
    info: TreeInfo,
    storage: Storage,
    intents: IntentTracker,
}

impl FileIndexStore {
    /// Opens (creating if needed) an index directory.
    pub fn open(dir: impl AsRef<Path>) -> CrossmatchResult<Self> {
        Self::open_with_node_capacity(dir, DEFAULT_NODE_CAPACITY)
    }

    pub fn open_with_node_capacity(
        dir: impl AsRef<Path>,
        node_capacity: usize,
    ) -> CrossmatchResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        log::debug!("Opened index directory {}", dir.display());

        Ok(Self {
            inner: Arc::new(FileIndexStoreInner {
                dir,
                trees: RwLock::new(HashMap::new()),
                node_capacity,
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Path of the file backing `name`.
    pub fn index_path(&self, name: &str) -> CrossmatchResult<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(CrossmatchError::InvalidOperation(format!(
                "invalid index name: {:?}",
                name
            )));
        }
        Ok(self
            .inner
            .dir
            .join(format!("{}.{}", name, INDEX_FILE_EXTENSION)))
    }

    /// Builds a spatial tree from `entries` and persists it under `name`.
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

        self.write_tree(&info, &built.pages, built.next_page_id)?;
        log::debug!(
            "Persisted spatial index {} ({} entries, {} pages)",
            name,
            info.entry_count,
            built.pages.len()
        );
        Ok(info)
    }

    /// Persists an index of another kind, holding no pages.
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
        self.write_tree(&info, &[], ROOT_PAGE_ID + 1)?;
        Ok(info)
    }

    fn write_tree(
        &self,
        info: &TreeInfo,
        pages: &[Page],
        next_page_id: PageId,
    ) -> CrossmatchResult<()> {
        let path = self.index_path(&info.name)?;
        let storage = Storage::create(&path).map_err(|e| match e {
            CrossmatchError::Io(io) if io.kind() == std::io::ErrorKind::AlreadyExists => {
                CrossmatchError::InvalidOperation(format!("index {} already exists", info.name))
            }
            other => other,
        })?;

        let written = pages
            .iter()
            .try_for_each(|page| storage.write_page(page))
            .and_then(|_| storage.write_header(&FileHeader::new(info, next_page_id)))
            .and_then(|_| storage.sync());
        if let Err(e) = written {
            drop(storage);
            if let Err(cleanup) = std::fs::remove_file(&path) {
                log::warn!("Failed to remove partial index {}: {}", path.display(), cleanup);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Deletes a tree's file. Fails while any handle on it is open.
    pub fn drop_tree(&self, name: &str) -> CrossmatchResult<()> {
        let path = self.index_path(name)?;
        let mut trees = self.inner.trees.write();
        if let Some(tree) = trees.get(name) {
            let active = tree.intents.active();
            if active > 0 {
                return Err(CrossmatchError::InvalidOperation(format!(
                    "index {} is in use by {} reader(s)",
                    name, active
                )));
            }
        }
        if !path.exists() {
            return Err(CrossmatchError::NotFound(name.to_string()));
        }

        trees.remove(name);
        std::fs::remove_file(&path)?;
        log::debug!("Dropped index file {}", path.display());
        Ok(())
    }

    /// Number of open handles on a tree, zero if it was never opened.
    pub fn active_intents(&self, name: &str) -> usize {
        self.inner
            .trees
            .read()
            .get(name)
            .map(|tree| tree.intents.active())
            .unwrap_or(0)
    }

    fn load(&self, name: &str) -> CrossmatchResult<Arc<FileTree>> {
        if let Some(tree) = self.inner.trees.read().get(name) {
            return Ok(tree.clone());
        }

        let path = self.index_path(name)?;
        if !path.exists() {
            return Err(CrossmatchError::NotFound(name.to_string()));
        }

        let mut trees = self.inner.trees.write();
        if let Some(tree) = trees.get(name) {
            return Ok(tree.clone());
        }

        let storage = Storage::open(&path)?;
        let header = match storage.read_header() {
            Ok(header) if header.is_valid() => header,
            Ok(_) | Err(CrossmatchError::Serialization(_)) => {
                return Err(CrossmatchError::WrongIndexType {
                    name: name.to_string(),
                    kind: "unrecognized file".into(),
                })
            }
            Err(CrossmatchError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(CrossmatchError::WrongIndexType {
                    name: name.to_string(),
                    kind: "truncated file".into(),
                })
            }
            Err(e) => return Err(e),
        };

        log::debug!("Loaded index {} from {}", name, storage.path().display());
        let tree = Arc::new(FileTree {
            info: header.to_info(name),
            storage,
            intents: IntentTracker::new(),
        });
        trees.insert(name.to_string(), tree.clone());
        Ok(tree)
    }
}

impl SpatialIndexStore for FileIndexStore {
    fn open_tree(&self, name: &str) -> CrossmatchResult<TreeHandle> {
        let tree = self.load(name)?;
        if !tree.info.kind.is_spatial() {
            return Err(CrossmatchError::WrongIndexType {
                name: name.to_string(),
                kind: tree.info.kind.to_string(),
            });
        }
        Ok(TreeHandle::new(tree.info.clone(), tree.intents.acquire()))
    }

    fn fetch_page(&self, handle: &TreeHandle, page_id: PageId) -> CrossmatchResult<Page> {
        let tree = self
            .inner
            .trees
            .read()
            .get(handle.name())
            .cloned()
            .ok_or_else(|| CrossmatchError::NotFound(handle.name().to_string()))?;
        if tree.info.tree_id != handle.tree_id() {
            return Err(CrossmatchError::NotFound(handle.name().to_string()));
        }
        tree.storage.read_page(page_id)
    }
}
