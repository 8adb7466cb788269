//! Paged spatial trees and the hosts that serve them.
//!
//! The cross-match core only sees the [`SpatialIndexStore`] contract. Two
//! hosts implement it:
//! - [`MemoryIndexStore`] keeps pages in memory and can split them while a
//!   scan is running, with or without the parent downlink
//! - [`FileIndexStore`] keeps one checksummed page file per tree and reads a
//!   page from disk on every fetch

pub mod index_builder;
pub mod index_constants;
pub mod index_store;
pub mod index_types;
mod file_storage;
mod file_store;
mod memory_store;

pub use file_storage::FileHeader;
pub use file_store::FileIndexStore;
pub use index_builder::{BuiltIndex, IndexBuilder};
pub use index_constants::{
    DEFAULT_NODE_CAPACITY, INITIAL_GENERATION, INVALID_SPLIT_SEQ, PAGE_SIZE, ROOT_PAGE_ID,
};
pub use index_store::{IntentLease, IntentTracker, SpatialIndexStore, TreeHandle};
pub use index_types::{
    ChildRef, IndexKind, KeyDomain, LeafEntry, Node, Page, PageId, RecordLocator, SplitSeq,
    TreeId, TreeInfo,
};
pub use memory_store::{MemoryIndexStore, ScriptedSplit, SplitMode};
