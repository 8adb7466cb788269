//! Constants shared by the index hosts.

use super::index_types::{PageId, SplitSeq};

/// Fixed on-disk page size (16KB)
pub const PAGE_SIZE: usize = 16384;

/// Default number of entries per page built by the packer
pub const DEFAULT_NODE_CAPACITY: usize = 64;

/// Smallest node capacity that still yields a tree
pub const MIN_NODE_CAPACITY: usize = 2;

/// Page id reserved for the root of every tree
pub const ROOT_PAGE_ID: PageId = 1;

/// Expected split sequence meaning "never follow right links"
pub const INVALID_SPLIT_SEQ: SplitSeq = 0;

/// Generation stamped on every page of a freshly built tree
pub const INITIAL_GENERATION: SplitSeq = 1;

/// Magic number for file format identification
pub const MAGIC: u32 = 0x584D_5458; // "XMTX"

/// File format version
pub const VERSION: u32 = 1;

/// File extension used by the file host
pub const INDEX_FILE_EXTENSION: &str = "xmidx";
