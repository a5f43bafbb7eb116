//! Free list management.
//!
//! Tracks released page ids so the page store can hand them out again before
//! growing its swap files. Ids are reused most-recently-freed first, which
//! keeps the working set of swap file regions small.

use crate::types::PageId;

/// Stack of free page ids
#[derive(Debug, Default)]
pub struct FreeList {
    pages: Vec<PageId>,
}

impl FreeList {
    /// Create a new empty free list
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    /// Add a page to the free list
    pub fn push(&mut self, page_id: PageId) {
        self.pages.push(page_id);
    }

    /// Take the most recently freed page, if any
    pub fn pop(&mut self) -> Option<PageId> {
        self.pages.pop()
    }

    /// Get the number of free pages
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Check if the free list is empty
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Forget every free page
    pub fn clear(&mut self) {
        self.pages.clear();
    }
}
