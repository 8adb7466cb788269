//! The pull-based cross-match driver.

use std::sync::Arc;

use crate::crossmatch_config::CrossmatchConfig;
use crate::errors::{CrossmatchError, CrossmatchResult};
use crate::index::{SpatialIndexStore, TreeHandle, INVALID_SPLIT_SEQ};

use super::expansion::{classify, expand, Expansion};
use super::page_accessor::PageAccessor;
use super::queues::{Frontier, PendingPair, ResultPair, ResultQueue};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// More pairs may follow
    Active,
    /// Frontier and result queue ran dry; no pair will ever follow
    Exhausted,
    /// Closed by the consumer or aborted by an error
    Closed,
}

/// Counters collected while a session runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossmatchStats {
    pub pairs_expanded: u64,
    pub pending_generated: u64,
    pub pages_fetched: u64,
    pub siblings_followed: u64,
    pub null_extents_skipped: u64,
    pub results_produced: u64,
    pub results_returned: u64,
    pub peak_frontier: usize,
    pub peak_results: usize,
}

impl std::fmt::Display for CrossmatchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "expanded={} pending={} pages={} siblings={} nulls={} produced={} returned={} peak_frontier={} peak_results={}",
            self.pairs_expanded,
            self.pending_generated,
            self.pages_fetched,
            self.siblings_followed,
            self.null_extents_skipped,
            self.results_produced,
            self.results_returned,
            self.peak_frontier,
            self.peak_results
        )
    }
}

struct SessionTrees {
    outer: TreeHandle,
    inner: TreeHandle,
}

/// A running cross-match of two spatial trees.
///
/// Each call to [`next_pair`](Self::next_pair) expands pending page pairs
/// until one result is available or the frontier runs dry, then returns at
/// most one pair. Traversal state lives in the session, so the next call
/// resumes where the previous one stopped. Both trees stay open under a read
/// intent until the session is exhausted, closed or dropped.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use spatial_crossmatch::{CrossmatchSession, Extent, KeyDomain, MemoryIndexStore, RecordLocator};
///
/// # fn main() -> Result<(), spatial_crossmatch::CrossmatchError> {
/// let store = MemoryIndexStore::new();
/// store.create_tree("stars", KeyDomain::new(2), vec![
///     (Some(Extent::rect(0.0, 0.0, 1.0, 1.0)), RecordLocator(1)),
/// ])?;
/// store.create_tree("galaxies", KeyDomain::new(2), vec![
///     (Some(Extent::rect(0.5, 0.5, 0.5, 0.5)), RecordLocator(10)),
/// ])?;
///
/// let session = CrossmatchSession::open(Arc::new(store), "stars", "galaxies")?;
/// let pairs = session.collect::<Result<Vec<_>, _>>()?;
/// assert_eq!(pairs.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct CrossmatchSession {
    store: Arc<dyn SpatialIndexStore>,
    trees: Option<SessionTrees>,
    outer_name: String,
    inner_name: String,
    dimensions: usize,
    frontier: Frontier,
    results: ResultQueue,
    state: SessionState,
    config: CrossmatchConfig,
    stats: CrossmatchStats,
}

impl CrossmatchSession {
    /// Opens both trees by name and starts a session with default settings.
    pub fn open(
        store: Arc<dyn SpatialIndexStore>,
        outer_name: &str,
        inner_name: &str,
    ) -> CrossmatchResult<Self> {
        Self::open_with_config(store, outer_name, inner_name, CrossmatchConfig::default())
    }

    pub fn open_with_config(
        store: Arc<dyn SpatialIndexStore>,
        outer_name: &str,
        inner_name: &str,
        config: CrossmatchConfig,
    ) -> CrossmatchResult<Self> {
        let outer = store.open_tree(outer_name)?;
        let inner = match store.open_tree(inner_name) {
            Ok(inner) => inner,
            Err(e) => {
                store.close_tree(outer);
                return Err(e);
            }
        };
        Self::with_config(store, outer, inner, config)
    }

    /// Starts a session over two opened trees with default settings.
    pub fn new(
        store: Arc<dyn SpatialIndexStore>,
        outer: TreeHandle,
        inner: TreeHandle,
    ) -> CrossmatchResult<Self> {
        Self::with_config(store, outer, inner, CrossmatchConfig::default())
    }

    /// Starts a session over two opened trees.
    ///
    /// Fails with `WrongIndexType` if either handle is not a spatial tree,
    /// `SameTree` if both name the same tree and `IncompatibleTrees` if
    /// their key domains differ. The handles are closed on failure.
    pub fn with_config(
        store: Arc<dyn SpatialIndexStore>,
        outer: TreeHandle,
        inner: TreeHandle,
        config: CrossmatchConfig,
    ) -> CrossmatchResult<Self> {
        if let Err(e) = Self::validate(&outer, &inner, &config) {
            if e.is_validation_error() {
                log::debug!(
                    "Rejected crossmatch of {} against {}: {}",
                    outer.name(),
                    inner.name(),
                    e
                );
            }
            store.close_tree(outer);
            store.close_tree(inner);
            return Err(e);
        }

        let mut frontier = Frontier::new(config.frontier_order());
        frontier.push_all([PendingPair {
            left_page: outer.root_page(),
            right_page: inner.root_page(),
            left_seq: INVALID_SPLIT_SEQ,
            right_seq: INVALID_SPLIT_SEQ,
            left_level: root_level(&outer),
            right_level: root_level(&inner),
        }]);

        log::debug!(
            "Starting crossmatch of {} ({} entries) against {} ({} entries)",
            outer.name(),
            outer.info().entry_count,
            inner.name(),
            inner.info().entry_count
        );

        Ok(Self {
            outer_name: outer.name().to_string(),
            inner_name: inner.name().to_string(),
            dimensions: outer.info().domain.dimensions,
            store,
            trees: Some(SessionTrees { outer, inner }),
            frontier,
            results: ResultQueue::new(),
            state: SessionState::Active,
            config,
            stats: CrossmatchStats::default(),
        })
    }

    fn validate(
        outer: &TreeHandle,
        inner: &TreeHandle,
        config: &CrossmatchConfig,
    ) -> CrossmatchResult<()> {
        config.validate()?;
        for handle in [outer, inner] {
            if !handle.info().kind.is_spatial() {
                return Err(CrossmatchError::WrongIndexType {
                    name: handle.name().to_string(),
                    kind: handle.info().kind.to_string(),
                });
            }
        }
        if outer.is_same_tree(inner) {
            return Err(CrossmatchError::SameTree(outer.name().to_string()));
        }
        if let Some(reason) = outer.info().domain.incompatibility(&inner.info().domain) {
            return Err(CrossmatchError::IncompatibleTrees {
                outer: outer.name().to_string(),
                inner: inner.name().to_string(),
                reason,
            });
        }
        Ok(())
    }

    /// Returns the next matched pair, or `None` once the session is
    /// exhausted or closed.
    ///
    /// A `CorruptPage` or host failure closes the session before it is
    /// returned; every later call returns `None`.
    pub fn next_pair(&mut self) -> CrossmatchResult<Option<ResultPair>> {
        if self.state != SessionState::Active {
            return Ok(None);
        }

        loop {
            if let Some(pair) = self.results.pop() {
                self.stats.results_returned += 1;
                return Ok(Some(pair));
            }

            let Some(pending) = self.frontier.pop() else {
                self.exhaust();
                return Ok(None);
            };

            if let Err(e) = self.expand_pending(pending) {
                log::error!(
                    "Crossmatch of {} against {} aborted: {}",
                    self.outer_name,
                    self.inner_name,
                    e
                );
                self.close();
                return Err(e);
            }
        }
    }

    fn expand_pending(&mut self, pending: PendingPair) -> CrossmatchResult<()> {
        let trees = self.trees.as_ref().ok_or(CrossmatchError::Closed)?;
        let accessor = PageAccessor::new(
            self.store.as_ref(),
            self.dimensions,
            self.config.max_sibling_chain(),
        );

        let left = accessor.fetch(
            &trees.outer,
            pending.left_page,
            pending.left_seq,
            pending.left_level,
            &mut self.stats,
        )?;
        let right = accessor.fetch(
            &trees.inner,
            pending.right_page,
            pending.right_seq,
            pending.right_level,
            &mut self.stats,
        )?;

        let expansion = expand(&left, &right, self.config.pairing());
        log::trace!(
            "Expanded {:?} pair ({}, {}) into {} item(s)",
            classify(&left, &right),
            pending.left_page,
            pending.right_page,
            expansion.len()
        );

        self.stats.pairs_expanded += 1;
        match expansion {
            Expansion::Results(results) => {
                self.stats.results_produced += results.len() as u64;
                self.results.push_all(results);
            }
            Expansion::Pending(pending) => {
                self.stats.pending_generated += pending.len() as u64;
                self.frontier.push_all(pending);
            }
        }
        Ok(())
    }

    fn exhaust(&mut self) {
        self.state = SessionState::Exhausted;
        self.release_trees();
        log::debug!(
            "Crossmatch of {} against {} exhausted: {}",
            self.outer_name,
            self.inner_name,
            self.stats()
        );
    }

    fn release_trees(&mut self) {
        if let Some(trees) = self.trees.take() {
            self.store.close_tree(trees.outer);
            self.store.close_tree(trees.inner);
        }
    }

    /// Discards all queued work and releases both trees. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.frontier.clear();
        self.results.clear();
        self.release_trees();
        self.state = SessionState::Closed;
        log::debug!(
            "Closed crossmatch of {} against {}",
            self.outer_name,
            self.inner_name
        );
    }

    /// Describes the join for plan output.
    pub fn explain(&self) -> String {
        format!(
            "Spatial Crossmatch\n  Outer index: {}\n  Inner index: {}",
            self.outer_name, self.inner_name
        )
    }

    pub fn stats(&self) -> CrossmatchStats {
        CrossmatchStats {
            peak_frontier: self.frontier.peak(),
            peak_results: self.results.peak(),
            ..self.stats.clone()
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of page pairs awaiting expansion.
    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    /// Number of matched pairs produced but not yet returned.
    pub fn buffered_results(&self) -> usize {
        self.results.len()
    }

    /// Checks if both trees are still held open.
    pub fn is_open(&self) -> bool {
        self.trees.is_some()
    }

    pub fn config(&self) -> &CrossmatchConfig {
        &self.config
    }
}

/// Level of a tree's root; a tree of height one is a single leaf.
fn root_level(tree: &TreeHandle) -> u32 {
    tree.info().height.saturating_sub(1)
}

impl Iterator for CrossmatchSession {
    type Item = CrossmatchResult<ResultPair>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pair().transpose()
    }
}

impl Drop for CrossmatchSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CrossmatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossmatchSession")
            .field("outer", &self.outer_name)
            .field("inner", &self.inner_name)
            .field("state", &self.state)
            .field("frontier_len", &self.frontier.len())
            .field("buffered_results", &self.results.len())
            .finish()
    }
}
