//! Common types used throughout the engine.

mod page_id;

pub use page_id::PageId;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default page size in bytes (4KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest page size the page store accepts
pub const MIN_PAGE_SIZE: usize = 16;

/// Bytes a memory source keeps inline before spilling into pages
pub const DEFAULT_INLINE_THRESHOLD: usize = 64 * 1024;

/// Pages per swap file before the page store starts a new one
pub const DEFAULT_PAGES_PER_FILE: u64 = 16 * 1024;

/// Chunk size used when streaming document content in or out
pub const IO_CHUNK_SIZE: usize = 64 * 1024;

/// Backing store variant of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentKind {
    /// Bytes come from a read-only source file
    File,
    /// Bytes come from the document's memory source
    Memory,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Identifier of a delta document issued by a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub u64);

impl DocumentId {
    /// Get the raw id value
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}
