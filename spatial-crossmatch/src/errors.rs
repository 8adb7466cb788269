//! Error and result types shared by the cross-match core and the index hosts.

use std::io;
use thiserror::Error;

use crate::index::PageId;

/// Errors that can occur while opening indexes or running a cross-match.
#[derive(Debug, Error)]
pub enum CrossmatchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Index not found: {0}")]
    NotFound(String),

    #[error("Index {name} has wrong type: {kind}")]
    WrongIndexType { name: String, kind: String },

    #[error("Indexes {outer} and {inner} are incompatible: {reason}")]
    IncompatibleTrees {
        outer: String,
        inner: String,
        reason: String,
    },

    #[error("Index {0} cannot be cross-matched against itself")]
    SameTree(String),

    #[error("Corrupt page {page_id}: {reason}")]
    CorruptPage { page_id: PageId, reason: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Session is closed")]
    Closed,
}

impl CrossmatchError {
    pub(crate) fn corrupt(page_id: PageId, reason: impl Into<String>) -> Self {
        CrossmatchError::CorruptPage {
            page_id,
            reason: reason.into(),
        }
    }

    /// Returns `true` for failures detected while validating a session's
    /// inputs, before any traversal work happened.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            CrossmatchError::WrongIndexType { .. }
                | CrossmatchError::IncompatibleTrees { .. }
                | CrossmatchError::SameTree(_)
        )
    }
}

/// Result type for cross-match operations
pub type CrossmatchResult<T> = Result<T, CrossmatchError>;
