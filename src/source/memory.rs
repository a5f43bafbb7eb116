//! Mutable byte store for edited and inserted document content.
//!
//! Small sources keep their bytes in an inline buffer. Once the content grows
//! past the inline threshold it is spilled into a chain of pages in the page
//! store, and it moves back inline when truncated under the threshold again.
//!
//! Ranges nothing refers to any more are discarded: pages lying entirely
//! inside discarded ranges go back to the page store right away, and a
//! discarded range reaching the end shrinks the source.

use crate::error::Result;
use crate::page::PageBuf;
use crate::storage::PageStore;
use crate::types::PageId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

enum Storage {
    Inline(Vec<u8>),
    Paged(PageChain),
}

/// Pages holding a paged source's bytes, in order.
///
/// A slot whose page was handed back while discarded holds
/// `PageId::INVALID`; it reads as zeros and gets a fresh page when written.
#[derive(Default)]
struct PageChain {
    pages: Vec<PageId>,
    length: u64,
}

/// Growable byte store, inline or page backed.
pub struct MemorySource {
    store: Arc<dyn PageStore>,
    inline_threshold: usize,
    storage: Storage,
    /// Discarded ranges as start -> end; disjoint, never adjacent, never
    /// reaching the end of the source
    holes: BTreeMap<u64, u64>,
}

impl MemorySource {
    /// Create an empty source spilling into `store` past `inline_threshold` bytes
    pub fn new(store: Arc<dyn PageStore>, inline_threshold: usize) -> Self {
        Self {
            store,
            inline_threshold,
            storage: Storage::Inline(Vec::new()),
            holes: BTreeMap::new(),
        }
    }

    /// Logical length in bytes, discarded ranges included
    pub fn len(&self) -> u64 {
        match &self.storage {
            Storage::Inline(bytes) => bytes.len() as u64,
            Storage::Paged(chain) => chain.length,
        }
    }

    /// Check if the source holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the bytes currently live in the page store
    pub fn is_paged(&self) -> bool {
        matches!(self.storage, Storage::Paged(_))
    }

    /// Number of pages held in the page store
    pub fn page_count(&self) -> usize {
        match &self.storage {
            Storage::Inline(_) => 0,
            Storage::Paged(chain) => chain.pages.iter().filter(|p| p.is_valid()).count(),
        }
    }

    /// Bytes inside discarded ranges
    pub fn discarded_len(&self) -> u64 {
        self.holes.iter().map(|(start, end)| end - start).sum()
    }

    fn check_range(&self, offset: u64, length: usize) {
        let end = offset.checked_add(length as u64);
        assert!(
            end.is_some_and(|end| end <= self.len()),
            "memory source range {}+{} exceeds length {}",
            offset,
            length,
            self.len()
        );
    }

    /// Fill `target` with the bytes starting at `offset`
    pub fn read(&self, offset: u64, target: &mut [u8]) -> Result<()> {
        self.check_range(offset, target.len());
        match &self.storage {
            Storage::Inline(bytes) => {
                let start = offset as usize;
                target.copy_from_slice(&bytes[start..start + target.len()]);
                Ok(())
            }
            Storage::Paged(chain) => read_pages(self.store.as_ref(), &chain.pages, offset, target),
        }
    }

    /// Read a single byte
    pub fn read_byte(&self, offset: u64) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read(offset, &mut byte)?;
        Ok(byte[0])
    }

    /// Append `data`, returning the offset it starts at.
    ///
    /// On failure the content is unchanged.
    pub fn append(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.len();
        if data.is_empty() {
            return Ok(offset);
        }
        let new_length = offset + data.len() as u64;

        if let Storage::Inline(bytes) = &self.storage {
            if new_length > self.inline_threshold as u64 {
                let mut chain = PageChain::default();
                extend_chain(self.store.as_ref(), &mut chain, bytes)?;
                debug!(
                    length = offset,
                    pages = chain.pages.len(),
                    "promoted memory source to paged storage"
                );
                self.storage = Storage::Paged(chain);
                self.free_discarded_pages();
            }
        }

        match &mut self.storage {
            Storage::Inline(bytes) => bytes.extend_from_slice(data),
            Storage::Paged(chain) => extend_chain(self.store.as_ref(), chain, data)?,
        }
        Ok(offset)
    }

    /// Overwrite existing bytes starting at `offset`
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.check_range(offset, data.len());
        match &mut self.storage {
            Storage::Inline(bytes) => {
                let start = offset as usize;
                bytes[start..start + data.len()].copy_from_slice(data);
                Ok(())
            }
            Storage::Paged(chain) => {
                write_pages(self.store.as_ref(), &mut chain.pages, offset, data)
            }
        }
    }

    /// Overwrite a single byte
    pub fn set_byte(&mut self, offset: u64, value: u8) -> Result<()> {
        self.write(offset, &[value])
    }

    /// Insert `data` at `offset`, shifting the following bytes.
    ///
    /// On failure the content is restored, unless the restoring writes fail
    /// as well; that is logged.
    pub fn insert_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let length = self.len();
        assert!(
            offset <= length,
            "memory source insert at {} exceeds length {}",
            offset,
            length
        );
        if data.is_empty() {
            return Ok(());
        }

        if let Storage::Inline(bytes) = &mut self.storage {
            if length + data.len() as u64 <= self.inline_threshold as u64 {
                let at = offset as usize;
                bytes.splice(at..at, data.iter().copied());
                self.shift_holes(offset, data.len() as u64);
                return Ok(());
            }
        }

        // New content from `offset` on is data ++ tail: the first tail_len
        // bytes overwrite in place, the rest is appended.
        let tail_len = (length - offset) as usize;
        let mut shifted = Vec::with_capacity(data.len() + tail_len);
        shifted.extend_from_slice(data);
        shifted.resize(data.len() + tail_len, 0);
        self.read(offset, &mut shifted[data.len()..])?;

        self.append(&shifted[tail_len..])?;
        if let Err(err) = self.write(offset, &shifted[..tail_len]) {
            let restored = self
                .write(offset, &shifted[data.len()..])
                .and_then(|()| self.truncate(length));
            match restored {
                Ok(()) => self.free_discarded_pages(),
                Err(undo) => warn!(error = %undo, offset, "failed to roll back memory source insert"),
            }
            return Err(err);
        }
        self.shift_holes(offset, data.len() as u64);
        self.free_discarded_pages();
        Ok(())
    }

    /// Move discarded ranges at or after `offset` up by `by` bytes
    fn shift_holes(&mut self, offset: u64, by: u64) {
        if self.holes.values().next_back().map_or(true, |&end| end <= offset) {
            return;
        }
        let mut shifted = BTreeMap::new();
        for (start, end) in std::mem::take(&mut self.holes) {
            if end <= offset {
                shifted.insert(start, end);
            } else if start >= offset {
                shifted.insert(start + by, end + by);
            } else {
                shifted.insert(start, offset);
                shifted.insert(offset + by, end + by);
            }
        }
        self.holes = shifted;
    }

    /// Shrink to `new_length` bytes, freeing pages past the end
    pub fn truncate(&mut self, new_length: u64) -> Result<()> {
        let length = self.len();
        assert!(
            new_length <= length,
            "memory source truncate to {} exceeds length {}",
            new_length,
            length
        );

        self.holes.retain(|&start, _| start < new_length);
        if let Some(mut last) = self.holes.last_entry() {
            if *last.get() > new_length {
                *last.get_mut() = new_length;
            }
        }

        let demoted = match &self.storage {
            Storage::Paged(chain) if new_length <= self.inline_threshold as u64 => {
                let mut bytes = vec![0u8; new_length as usize];
                read_pages(self.store.as_ref(), &chain.pages, 0, &mut bytes)?;
                Some(bytes)
            }
            _ => None,
        };

        if let Some(bytes) = demoted {
            let previous = std::mem::replace(&mut self.storage, Storage::Inline(bytes));
            if let Storage::Paged(chain) = previous {
                debug!(
                    length = new_length,
                    pages = chain.pages.len(),
                    "demoted memory source to inline storage"
                );
                release_pages(self.store.as_ref(), &chain.pages)?;
            }
            return Ok(());
        }

        match &mut self.storage {
            Storage::Inline(bytes) => bytes.truncate(new_length as usize),
            Storage::Paged(chain) => {
                let keep = new_length.div_ceil(self.store.page_size() as u64) as usize;
                let dropped = chain.pages.split_off(keep);
                chain.length = new_length;
                release_pages(self.store.as_ref(), &dropped)?;
            }
        }
        Ok(())
    }

    /// Mark `[start, end)` as no longer referenced.
    ///
    /// Discarded bytes must not be read or written afterwards. Pages lying
    /// entirely inside discarded ranges are freed, and once a discarded range
    /// reaches the end of the source the source is truncated to its start.
    pub fn discard(&mut self, start: u64, end: u64) -> Result<()> {
        let length = self.len();
        assert!(
            start < end && end <= length,
            "memory source discard {}..{} outside length {}",
            start,
            end,
            length
        );

        let (mut start, mut end) = (start, end);
        if let Some((&s, &e)) = self.holes.range(..=start).next_back() {
            if e >= start {
                start = s;
                end = end.max(e);
                self.holes.remove(&s);
            }
        }
        let touching: Vec<u64> = self.holes.range(start..=end).map(|(&s, _)| s).collect();
        for s in touching {
            if let Some(e) = self.holes.remove(&s) {
                end = end.max(e);
            }
        }

        if end == length {
            trace!(start, length, "discarded memory source tail");
            return self.truncate(start);
        }

        self.holes.insert(start, end);
        trace!(start, end, "discarded memory source range");
        match &mut self.storage {
            Storage::Paged(chain) => free_covered(self.store.as_ref(), chain, start, end),
            Storage::Inline(_) => Ok(()),
        }
    }

    /// Free the pages covered by discarded ranges, logging failures
    fn free_discarded_pages(&mut self) {
        let Storage::Paged(chain) = &mut self.storage else {
            return;
        };
        for (&start, &end) in &self.holes {
            if let Err(err) = free_covered(self.store.as_ref(), chain, start, end) {
                warn!(error = %err, start, end, "failed to free discarded pages");
            }
        }
    }

    /// Drop all content and return every page to the store.
    ///
    /// Pages of a closed store went away with its swap files and are not
    /// freed individually.
    pub fn release(&mut self) -> Result<()> {
        self.holes.clear();
        let previous = std::mem::replace(&mut self.storage, Storage::Inline(Vec::new()));
        match previous {
            Storage::Paged(chain) if !self.store.is_closed() => {
                release_pages(self.store.as_ref(), &chain.pages)
            }
            _ => Ok(()),
        }
    }

    /// Deep copy into a new source sharing the same page store.
    ///
    /// Discarded ranges stay discarded in the copy and their freed pages are
    /// not duplicated.
    pub fn duplicate(&self) -> Result<MemorySource> {
        let mut copy = MemorySource::new(Arc::clone(&self.store), self.inline_threshold);
        copy.holes = self.holes.clone();
        match &self.storage {
            Storage::Inline(bytes) => copy.storage = Storage::Inline(bytes.clone()),
            Storage::Paged(chain) => {
                let mut pages = Vec::with_capacity(chain.pages.len());
                if let Err(err) = copy_pages(self.store.as_ref(), &chain.pages, &mut pages) {
                    release_after_failure(self.store.as_ref(), &pages);
                    return Err(err);
                }
                copy.storage = Storage::Paged(PageChain {
                    pages,
                    length: chain.length,
                });
            }
        }
        Ok(copy)
    }
}

impl Drop for MemorySource {
    fn drop(&mut self) {
        if let Storage::Paged(chain) = &self.storage {
            if self.store.is_closed() {
                return;
            }
            if let Err(err) = release_pages(self.store.as_ref(), &chain.pages) {
                warn!(error = %err, pages = chain.pages.len(), "failed to release memory source pages");
            }
        }
    }
}

impl std::fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySource")
            .field("length", &self.len())
            .field("paged", &self.is_paged())
            .field("pages", &self.page_count())
            .field("discarded", &self.discarded_len())
            .finish()
    }
}

fn read_pages(store: &dyn PageStore, pages: &[PageId], offset: u64, target: &mut [u8]) -> Result<()> {
    let page_size = store.page_size();
    let mut position = offset;
    let mut done = 0;
    while done < target.len() {
        let index = (position / page_size as u64) as usize;
        let within = (position % page_size as u64) as usize;
        let take = (page_size - within).min(target.len() - done);
        let page_id = pages[index];
        if page_id.is_valid() {
            let page = store.read_page(page_id)?;
            target[done..done + take].copy_from_slice(&page[within..within + take]);
        } else {
            target[done..done + take].fill(0);
        }
        done += take;
        position += take as u64;
    }
    Ok(())
}

fn write_pages(store: &dyn PageStore, pages: &mut [PageId], offset: u64, data: &[u8]) -> Result<()> {
    let page_size = store.page_size();
    let mut position = offset;
    let mut done = 0;
    while done < data.len() {
        let index = (position / page_size as u64) as usize;
        let within = (position % page_size as u64) as usize;
        let take = (page_size - within).min(data.len() - done);
        let mut page = if !pages[index].is_valid() {
            pages[index] = store.allocate_page()?;
            PageBuf::zeroed(page_size)
        } else if take == page_size {
            PageBuf::zeroed(page_size)
        } else {
            store.read_page(pages[index])?
        };
        page[within..within + take].copy_from_slice(&data[done..done + take]);
        store.write_page(pages[index], &page)?;
        done += take;
        position += take as u64;
    }
    Ok(())
}

/// Append `data` to a chain, allocating pages as needed.
///
/// Newly allocated pages are freed again if anything fails, and the chain's
/// length only moves once every write has landed.
fn extend_chain(store: &dyn PageStore, chain: &mut PageChain, data: &[u8]) -> Result<()> {
    let page_size = store.page_size() as u64;
    let new_length = chain.length + data.len() as u64;
    let needed = new_length.div_ceil(page_size) as usize;
    let existing = chain.pages.len();

    while chain.pages.len() < needed {
        match store.allocate_page() {
            Ok(page_id) => chain.pages.push(page_id),
            Err(err) => {
                let fresh = chain.pages.split_off(existing);
                release_after_failure(store, &fresh);
                return Err(err);
            }
        }
    }

    if let Err(err) = write_pages(store, &mut chain.pages, chain.length, data) {
        let fresh = chain.pages.split_off(existing);
        release_after_failure(store, &fresh);
        return Err(err);
    }
    chain.length = new_length;
    Ok(())
}

/// Free the pages lying entirely inside `[start, end)`
fn free_covered(store: &dyn PageStore, chain: &mut PageChain, start: u64, end: u64) -> Result<()> {
    let page_size = store.page_size() as u64;
    let first = start.div_ceil(page_size) as usize;
    let last = (end / page_size) as usize;

    let mut first_error = None;
    let mut freed = 0;
    for slot in chain.pages.iter_mut().take(last).skip(first) {
        if !slot.is_valid() {
            continue;
        }
        match store.free_page(*slot) {
            Ok(()) => {
                *slot = PageId::INVALID;
                freed += 1;
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    if freed > 0 {
        trace!(start, end, pages = freed, "freed discarded pages");
    }
    first_error.map_or(Ok(()), Err)
}

/// Copy every live page of `source` into fresh pages pushed onto `target`
fn copy_pages(store: &dyn PageStore, source: &[PageId], target: &mut Vec<PageId>) -> Result<()> {
    for &page_id in source {
        if !page_id.is_valid() {
            target.push(PageId::INVALID);
            continue;
        }
        let page = store.read_page(page_id)?;
        let fresh = store.allocate_page()?;
        target.push(fresh);
        store.write_page(fresh, &page)?;
    }
    Ok(())
}

/// Free every page, reporting the first failure
fn release_pages(store: &dyn PageStore, pages: &[PageId]) -> Result<()> {
    let mut first_error = None;
    for &page_id in pages.iter().filter(|page_id| page_id.is_valid()) {
        if let Err(err) = store.free_page(page_id) {
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Undo allocations of a failed operation, logging what could not be freed
fn release_after_failure(store: &dyn PageStore, pages: &[PageId]) {
    if let Err(err) = release_pages(store, pages) {
        warn!(error = %err, pages = pages.len(), "failed to release pages of an aborted write");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::BudgetStore;
    use crate::storage::TempPageStore;
    use tempfile::{tempdir, TempDir};

    fn small_store() -> (TempDir, Arc<dyn PageStore>) {
        let dir = tempdir().unwrap();
        let store = TempPageStore::new(dir.path(), 16, 64).unwrap();
        (dir, Arc::new(store))
    }

    fn contents(source: &MemorySource) -> Vec<u8> {
        let mut buf = vec![0u8; source.len() as usize];
        source.read(0, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_inline_append_and_read() -> Result<()> {
        let (_dir, store) = small_store();
        let mut source = MemorySource::new(store, 32);

        assert_eq!(source.append(b"hello")?, 0);
        assert_eq!(source.append(b" world")?, 5);
        assert!(!source.is_paged());
        assert_eq!(contents(&source), b"hello world");
        assert_eq!(source.read_byte(4)?, b'o');

        Ok(())
    }

    #[test]
    fn test_promotion_to_pages() -> Result<()> {
        let (_dir, store) = small_store();
        let mut source = MemorySource::new(Arc::clone(&store), 32);

        let data: Vec<u8> = (0..100u8).collect();
        source.append(&data[..20])?;
        assert!(!source.is_paged());
        source.append(&data[20..])?;
        assert!(source.is_paged());
        assert_eq!(source.page_count(), 7);
        assert_eq!(store.stats().allocated_pages, 7);
        assert_eq!(contents(&source), data);

        // Read across a page boundary
        let mut buf = [0u8; 6];
        source.read(13, &mut buf)?;
        assert_eq!(buf, [13, 14, 15, 16, 17, 18]);

        Ok(())
    }

    #[test]
    fn test_paged_writes_and_inserts() -> Result<()> {
        let (_dir, store) = small_store();
        let mut source = MemorySource::new(store, 8);
        let mut model: Vec<u8> = (0..40u8).collect();
        source.append(&model)?;

        source.set_byte(17, 0xAA)?;
        model[17] = 0xAA;
        source.write(30, &[1, 2, 3, 4, 5])?;
        model[30..35].copy_from_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(contents(&source), model);

        source.insert_at(5, b"INSERTED")?;
        model.splice(5..5, b"INSERTED".iter().copied());
        assert_eq!(contents(&source), model);

        source.insert_at(source.len(), b"end")?;
        model.extend_from_slice(b"end");
        assert_eq!(contents(&source), model);

        Ok(())
    }

    #[test]
    fn test_inline_insert() -> Result<()> {
        let (_dir, store) = small_store();
        let mut source = MemorySource::new(store, 64);
        source.append(b"abef")?;
        source.insert_at(2, b"cd")?;
        assert_eq!(contents(&source), b"abcdef");
        assert!(!source.is_paged());
        Ok(())
    }

    #[test]
    fn test_truncate_frees_pages_and_demotes() -> Result<()> {
        let (_dir, store) = small_store();
        let mut source = MemorySource::new(Arc::clone(&store), 32);
        let data: Vec<u8> = (0..100u8).collect();
        source.append(&data)?;
        assert_eq!(store.stats().allocated_pages, 7);

        source.truncate(50)?;
        assert!(source.is_paged());
        assert_eq!(source.page_count(), 4);
        assert_eq!(store.stats().allocated_pages, 4);
        assert_eq!(contents(&source), &data[..50]);

        source.truncate(20)?;
        assert!(!source.is_paged());
        assert_eq!(store.stats().allocated_pages, 0);
        assert_eq!(contents(&source), &data[..20]);

        source.truncate(0)?;
        assert!(source.is_empty());
        Ok(())
    }

    #[test]
    fn test_drop_releases_pages() -> Result<()> {
        let (_dir, store) = small_store();
        {
            let mut source = MemorySource::new(Arc::clone(&store), 0);
            source.append(&[5u8; 64])?;
            assert_eq!(store.stats().allocated_pages, 4);
        }
        assert_eq!(store.stats().allocated_pages, 0);
        assert_eq!(store.stats().free_pages, 4);
        Ok(())
    }

    #[test]
    fn test_duplicate_is_independent() -> Result<()> {
        let (_dir, store) = small_store();
        let mut source = MemorySource::new(store, 16);
        let data: Vec<u8> = (0..50u8).collect();
        source.append(&data)?;

        let mut copy = source.duplicate()?;
        assert_eq!(contents(&copy), data);

        copy.set_byte(0, 0xFF)?;
        assert_eq!(source.read_byte(0)?, 0);
        assert_eq!(copy.read_byte(0)?, 0xFF);
        Ok(())
    }

    #[test]
    fn test_failed_append_keeps_content() -> Result<()> {
        let dir = tempdir().unwrap();
        let inner = TempPageStore::new(dir.path(), 16, 64)?;
        let store: Arc<dyn PageStore> = Arc::new(BudgetStore::new(inner, 3));
        let mut source = MemorySource::new(Arc::clone(&store), 16);

        source.append(&[1u8; 40])?;
        assert_eq!(source.page_count(), 3);

        assert!(source.append(&[2u8; 20]).is_err());
        assert_eq!(source.len(), 40);
        assert_eq!(contents(&source), vec![1u8; 40]);
        assert_eq!(store.stats().allocated_pages, 3);
        Ok(())
    }

    #[test]
    fn test_failed_promotion_stays_inline() -> Result<()> {
        let dir = tempdir().unwrap();
        let inner = TempPageStore::new(dir.path(), 16, 64)?;
        let store: Arc<dyn PageStore> = Arc::new(BudgetStore::new(inner, 0));
        let mut source = MemorySource::new(store, 8);

        source.append(b"abc")?;
        assert!(source.append(b"defghijkl").is_err());
        assert!(!source.is_paged());
        assert_eq!(contents(&source), b"abc");
        Ok(())
    }

    #[test]
    fn test_discard_frees_covered_pages() -> Result<()> {
        let (_dir, store) = small_store();
        let mut source = MemorySource::new(Arc::clone(&store), 16);
        let data: Vec<u8> = (0..100u8).collect();
        source.append(&data)?;
        assert_eq!(store.stats().allocated_pages, 7);

        // Pages 1 and 2 lie entirely inside 10..60
        source.discard(10, 60)?;
        assert_eq!(source.len(), 100);
        assert_eq!(source.discarded_len(), 50);
        assert_eq!(source.page_count(), 5);
        assert_eq!(store.stats().allocated_pages, 5);

        let mut head = [0u8; 10];
        source.read(0, &mut head)?;
        assert_eq!(head[..], data[..10]);
        let mut tail = [0u8; 40];
        source.read(60, &mut tail)?;
        assert_eq!(tail[..], data[60..]);

        let copy = source.duplicate()?;
        assert_eq!(copy.page_count(), 5);
        assert_eq!(copy.discarded_len(), 50);
        assert_eq!(store.stats().allocated_pages, 10);
        drop(copy);

        // Reaching the end merges with the earlier range and truncates
        source.discard(60, 100)?;
        assert_eq!(source.len(), 10);
        assert_eq!(source.discarded_len(), 0);
        assert!(!source.is_paged());
        assert_eq!(contents(&source), &data[..10]);
        assert_eq!(store.stats().allocated_pages, 0);
        Ok(())
    }

    #[test]
    fn test_appends_after_discard() -> Result<()> {
        let (_dir, store) = small_store();
        let mut source = MemorySource::new(Arc::clone(&store), 8);
        source.append(&[1u8; 64])?;
        source.discard(0, 48)?;
        assert_eq!(source.page_count(), 1);

        source.append(&[2u8; 20])?;
        assert_eq!(source.len(), 84);
        let mut buf = [0u8; 36];
        source.read(48, &mut buf)?;
        assert_eq!(buf[..16], [1u8; 16]);
        assert_eq!(buf[16..], [2u8; 20]);

        // Discarding the remaining live bytes empties the source
        source.discard(48, 84)?;
        assert!(source.is_empty());
        assert_eq!(store.stats().allocated_pages, 0);
        Ok(())
    }

    #[test]
    fn test_failed_insert_restores_content() -> Result<()> {
        let dir = tempdir().unwrap();
        let inner = TempPageStore::new(dir.path(), 16, 64)?;
        let budget = Arc::new(BudgetStore::new(inner, 16));
        let store: Arc<dyn PageStore> = budget.clone();
        let mut source = MemorySource::new(Arc::clone(&store), 16);
        let original: Vec<u8> = (0..40u8).collect();
        source.append(&original)?;

        // Write 0 appends the shifted tail, write 2 fails mid shift
        budget.fail_write(2);
        assert!(source.insert_at(5, &[0xEE; 8]).is_err());
        assert_eq!(source.len(), 40);
        assert_eq!(contents(&source), original);
        assert_eq!(store.stats().allocated_pages, 3);

        source.insert_at(5, &[0xEE; 8])?;
        assert_eq!(source.len(), 48);
        assert_eq!(source.read_byte(12)?, 0xEE);
        assert_eq!(source.read_byte(13)?, 5);
        Ok(())
    }
}
