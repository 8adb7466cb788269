//! Synchronized dual-tree traversal.
//!
//! A session seeds its frontier with the pair of tree roots and then, one
//! pending pair at a time, reads both nodes through the [page accessor]
//! (walking right-sibling chains left by concurrent splits) and [expands]
//! them into result pairs or further pending pairs.
//!
//! [page accessor]: page_accessor
//! [expands]: expansion

mod expansion;
mod page_accessor;
mod queues;
mod session;

pub use queues::{PendingPair, ResultPair};
pub use session::{CrossmatchSession, CrossmatchStats, SessionState};
