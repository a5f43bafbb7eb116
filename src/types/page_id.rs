//! Page identifier type.

use std::fmt;

/// Identifier of a page in the page store.
///
/// Ids are handed out monotonically starting at 0 and recycled through the
/// free list. An id fixes the page's location in the swap files for as long
/// as the store lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PageId(pub u64);

impl PageId {
    /// Invalid page ID, used as a sentinel value
    pub const INVALID: PageId = PageId(u64::MAX);

    /// Create a new page ID
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw page ID value
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Check if this is a valid page ID
    pub const fn is_valid(self) -> bool {
        self.0 != u64::MAX
    }

    /// Index of the swap file holding this page
    pub const fn file_index(self, pages_per_file: u64) -> usize {
        (self.0 / pages_per_file) as usize
    }

    /// Byte offset of this page inside its swap file
    pub const fn file_offset(self, page_size: usize, pages_per_file: u64) -> u64 {
        (self.0 % pages_per_file) * page_size as u64
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "INVALID")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u64> for PageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<PageId> for u64 {
    fn from(id: PageId) -> Self {
        id.0
    }
}
