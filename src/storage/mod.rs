//! Storage layer: page allocation in temporary swap files.
//!
//! This module provides the page store used for memory source overflow and
//! the free list that recycles released pages.

mod freelist;
mod page_store;

pub use freelist::FreeList;
pub use page_store::{PageStore, PageStoreStats, TempPageStore};

#[cfg(test)]
pub(crate) mod testing;
