//! # Spatial Crossmatch - Dual-Tree Spatial Join
//!
//! This crate finds every pair of entries, one from each of two paged
//! spatial trees, whose extents overlap. Both trees are walked in lockstep
//! from their roots, so neither is ever materialized in memory, and the
//! result streams out one pair at a time.
//!
//! ## Features
//!
//! - **Pull-Based**: each call does just enough work to produce one pair
//! - **Split-Safe**: pages split by concurrent writers mid-scan are followed
//!   through their right-sibling chain, so no entry is lost
//! - **Height Tolerant**: trees of different heights are descended on the
//!   deeper side only
//! - **Pluggable Hosts**: any storage implementing [`SpatialIndexStore`];
//!   an in-memory host and a checksummed file host are included
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use spatial_crossmatch::{CrossmatchSession, Extent, KeyDomain, MemoryIndexStore, RecordLocator};
//!
//! # fn main() -> Result<(), spatial_crossmatch::CrossmatchError> {
//! let store = MemoryIndexStore::new();
//! store.create_tree("fields", KeyDomain::new(2), vec![
//!     (Some(Extent::rect(0.0, 0.0, 1.0, 1.0)), RecordLocator(1)),
//!     (Some(Extent::rect(5.0, 5.0, 6.0, 6.0)), RecordLocator(2)),
//! ])?;
//! store.create_tree("sources", KeyDomain::new(2), vec![
//!     (Some(Extent::rect(0.5, 0.5, 0.5, 0.5)), RecordLocator(10)),
//! ])?;
//!
//! let mut session = CrossmatchSession::open(Arc::new(store), "fields", "sources")?;
//! while let Some(pair) = session.next_pair()? {
//!     println!("{} matches {}", pair.left, pair.right);
//! }
//! # Ok(())
//! # }
//! ```

pub mod crossmatch;
pub mod crossmatch_config;
pub mod errors;
pub mod extent;
pub mod hilbert;
pub mod index;

pub use crossmatch::{CrossmatchSession, CrossmatchStats, PendingPair, ResultPair, SessionState};
pub use crossmatch_config::{CrossmatchConfig, FrontierOrder, PairingStrategy};
pub use errors::{CrossmatchError, CrossmatchResult};
pub use extent::{overlaps, Extent};
pub use index::{
    FileIndexStore, IndexKind, KeyDomain, MemoryIndexStore, RecordLocator, ScriptedSplit,
    SpatialIndexStore, SplitMode, TreeHandle, TreeInfo,
};
