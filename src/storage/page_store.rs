//! Page store implementation.
//!
//! The page store hands out fixed-size pages living in temporary swap files.
//! Memory sources that outgrow their inline buffer keep their bytes here. The
//! I/O sits behind a trait so the repository can be given any backend and
//! tests can inject failing ones.

use crate::error::{Result, StorageError};
use crate::page::PageBuf;
use crate::storage::FreeList;
use crate::types::{PageId, MIN_PAGE_SIZE};
use crate::Config;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

/// Trait for page allocation and page I/O
pub trait PageStore: Send + Sync {
    /// Size of every page in bytes
    fn page_size(&self) -> usize;

    /// Reserve a page, reusing a freed one when available
    fn allocate_page(&self) -> Result<PageId>;

    /// Read the full content of an allocated page
    fn read_page(&self, page_id: PageId) -> Result<PageBuf>;

    /// Overwrite the full content of an allocated page
    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()>;

    /// Return a page to the free list; its content is left as is
    fn free_page(&self, page_id: PageId) -> Result<()>;

    /// Delete the backing storage and invalidate every page id
    fn close(&self) -> Result<()>;

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;

    /// Current allocation statistics
    fn stats(&self) -> PageStoreStats;
}

/// Page store statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStoreStats {
    /// Page size in bytes
    pub page_size: usize,
    /// Pages currently handed out
    pub allocated_pages: usize,
    /// Pages waiting on the free list
    pub free_pages: usize,
    /// Swap files backing the store
    pub backing_files: usize,
}

/// Location and integrity data of an allocated page
#[derive(Debug, Clone, Copy)]
struct PageSlot {
    file: usize,
    offset: u64,
    /// CRC32 of the last written content; `None` until the first write
    /// after the page was recycled
    checksum: Option<u32>,
}

struct StoreState {
    files: Vec<NamedTempFile>,
    slots: HashMap<PageId, PageSlot>,
    free_list: FreeList,
    next_page: u64,
    closed: bool,
}

impl StoreState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StorageError::invalid_operation("page store is closed"));
        }
        Ok(())
    }

    fn slot(&self, page_id: PageId) -> Result<PageSlot> {
        self.slots
            .get(&page_id)
            .copied()
            .ok_or(StorageError::InvalidPageId(page_id))
    }
}

/// Page store backed by temporary swap files
pub struct TempPageStore {
    /// Directory the swap files are created in
    dir: PathBuf,
    page_size: usize,
    pages_per_file: u64,
    state: Mutex<StoreState>,
}

impl TempPageStore {
    /// Create a page store writing swap files into `dir`
    pub fn new(dir: impl Into<PathBuf>, page_size: usize, pages_per_file: u64) -> Result<Self> {
        if !page_size.is_power_of_two() || page_size < MIN_PAGE_SIZE {
            return Err(StorageError::invalid_config(format!(
                "page size must be a power of two of at least {} bytes, got {}",
                MIN_PAGE_SIZE, page_size
            )));
        }
        if pages_per_file == 0 {
            return Err(StorageError::invalid_config(
                "pages per file must be positive",
            ));
        }

        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            page_size,
            pages_per_file,
            state: Mutex::new(StoreState {
                files: Vec::new(),
                slots: HashMap::new(),
                free_list: FreeList::new(),
                next_page: 0,
                closed: false,
            }),
        })
    }

    /// Create a page store from repository configuration
    pub fn with_config(config: &Config) -> Result<Self> {
        let dir = config
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        Self::new(dir, config.page_size, config.pages_per_file)
    }

    /// Directory holding the swap files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths of the swap files currently alive
    pub fn backing_paths(&self) -> Vec<PathBuf> {
        let state = self.state.lock();
        state.files.iter().map(|f| f.path().to_path_buf()).collect()
    }

    /// Create swap files until `file_index` exists
    fn ensure_file(&self, state: &mut StoreState, file_index: usize) -> Result<()> {
        while state.files.len() <= file_index {
            let file = tempfile::Builder::new()
                .prefix("delta-pages-")
                .suffix(".swap")
                .tempfile_in(&self.dir)?;
            debug!(path = %file.path().display(), index = state.files.len(), "created page swap file");
            state.files.push(file);
        }
        Ok(())
    }

    fn check_len(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return Err(StorageError::invalid_operation(format!(
                "page data must be {} bytes, got {}",
                self.page_size,
                data.len()
            )));
        }
        Ok(())
    }
}

impl PageStore for TempPageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocate_page(&self) -> Result<PageId> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        // First try the free list
        if let Some(page_id) = state.free_list.pop() {
            state.slots.insert(
                page_id,
                PageSlot {
                    file: page_id.file_index(self.pages_per_file),
                    offset: page_id.file_offset(self.page_size, self.pages_per_file),
                    checksum: None,
                },
            );
            trace!(page = %page_id, "reused free page");
            return Ok(page_id);
        }

        // Grow the swap area by one zeroed page
        let page_id = PageId::new(state.next_page);
        let file = page_id.file_index(self.pages_per_file);
        let offset = page_id.file_offset(self.page_size, self.pages_per_file);
        self.ensure_file(&mut state, file)?;

        let zeros = vec![0u8; self.page_size];
        let handle = state.files[file].as_file_mut();
        handle.seek(SeekFrom::Start(offset))?;
        handle.write_all(&zeros)?;

        state.next_page += 1;
        state.slots.insert(
            page_id,
            PageSlot {
                file,
                offset,
                checksum: Some(crc32fast::hash(&zeros)),
            },
        );
        trace!(page = %page_id, file, offset, "allocated page");
        Ok(page_id)
    }

    fn read_page(&self, page_id: PageId) -> Result<PageBuf> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let slot = state.slot(page_id)?;

        let mut page = PageBuf::zeroed(self.page_size);
        let handle = state.files[slot.file].as_file_mut();
        handle.seek(SeekFrom::Start(slot.offset))?;
        handle.read_exact(page.as_bytes_mut())?;

        if let Some(expected) = slot.checksum {
            let actual = crc32fast::hash(page.as_bytes());
            if actual != expected {
                return Err(StorageError::corruption(format!(
                    "checksum mismatch on page {}: expected {:08x}, found {:08x}",
                    page_id, expected, actual
                )));
            }
        }

        Ok(page)
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        self.check_len(data)?;

        let mut state = self.state.lock();
        state.ensure_open()?;
        let slot = state.slot(page_id)?;

        let handle = state.files[slot.file].as_file_mut();
        handle.seek(SeekFrom::Start(slot.offset))?;
        handle.write_all(data)?;

        if let Some(entry) = state.slots.get_mut(&page_id) {
            entry.checksum = Some(crc32fast::hash(data));
        }
        Ok(())
    }

    fn free_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if state.slots.remove(&page_id).is_none() {
            return Err(StorageError::InvalidPageId(page_id));
        }
        state.free_list.push(page_id);
        trace!(page = %page_id, "freed page");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.slots.clear();
        state.free_list.clear();

        let files = std::mem::take(&mut state.files);
        let count = files.len();
        for file in files {
            file.close()?;
        }
        debug!(dir = %self.dir.display(), files = count, "closed page store");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn stats(&self) -> PageStoreStats {
        let state = self.state.lock();
        PageStoreStats {
            page_size: self.page_size,
            allocated_pages: state.slots.len(),
            free_pages: state.free_list.len(),
            backing_files: state.files.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_page_round_trip() -> Result<()> {
        let dir = tempdir().unwrap();
        let store = TempPageStore::new(dir.path(), 64, 8)?;

        let page_id = store.allocate_page()?;
        assert_eq!(page_id, PageId::new(0));

        let mut data = vec![0u8; 64];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i * 3) as u8;
        }
        store.write_page(page_id, &data)?;

        let read_back = store.read_page(page_id)?;
        assert_eq!(read_back.as_bytes(), &data[..]);

        Ok(())
    }

    #[test]
    fn test_new_page_is_zeroed() -> Result<()> {
        let dir = tempdir().unwrap();
        let store = TempPageStore::new(dir.path(), 32, 8)?;

        let page_id = store.allocate_page()?;
        assert!(store.read_page(page_id)?.iter().all(|&b| b == 0));

        Ok(())
    }

    #[test]
    fn test_free_list_reuse() -> Result<()> {
        let dir = tempdir().unwrap();
        let store = TempPageStore::new(dir.path(), 32, 8)?;

        let p1 = store.allocate_page()?;
        let p2 = store.allocate_page()?;
        let p3 = store.allocate_page()?;
        assert_eq!((p1, p2, p3), (PageId::new(0), PageId::new(1), PageId::new(2)));

        store.free_page(p2)?;
        assert_eq!(store.stats().free_pages, 1);

        // Next allocation should reuse p2
        let p4 = store.allocate_page()?;
        assert_eq!(p4, p2);
        assert_eq!(store.stats().allocated_pages, 3);

        // Recycled pages accept writes like fresh ones
        store.write_page(p4, &[7u8; 32])?;
        assert_eq!(store.read_page(p4)?.as_bytes(), &[7u8; 32]);

        Ok(())
    }

    #[test]
    fn test_invalid_page_ids() -> Result<()> {
        let dir = tempdir().unwrap();
        let store = TempPageStore::new(dir.path(), 32, 8)?;

        assert!(matches!(
            store.read_page(PageId::new(3)),
            Err(StorageError::InvalidPageId(_))
        ));

        let page_id = store.allocate_page()?;
        store.free_page(page_id)?;
        assert!(matches!(
            store.read_page(page_id),
            Err(StorageError::InvalidPageId(_))
        ));
        assert!(matches!(
            store.free_page(page_id),
            Err(StorageError::InvalidPageId(_))
        ));

        Ok(())
    }

    #[test]
    fn test_wrong_buffer_length_rejected() -> Result<()> {
        let dir = tempdir().unwrap();
        let store = TempPageStore::new(dir.path(), 32, 8)?;
        let page_id = store.allocate_page()?;

        assert!(matches!(
            store.write_page(page_id, &[0u8; 31]),
            Err(StorageError::InvalidOperation(_))
        ));

        Ok(())
    }

    #[test]
    fn test_pages_spread_over_files() -> Result<()> {
        let dir = tempdir().unwrap();
        let store = TempPageStore::new(dir.path(), 16, 2)?;

        let pages: Vec<PageId> = (0..5).map(|_| store.allocate_page()).collect::<Result<_>>()?;
        assert_eq!(store.stats().backing_files, 3);

        for (i, &page_id) in pages.iter().enumerate() {
            store.write_page(page_id, &[i as u8; 16])?;
        }
        for (i, &page_id) in pages.iter().enumerate() {
            assert_eq!(store.read_page(page_id)?.as_bytes(), &[i as u8; 16]);
        }

        Ok(())
    }

    #[test]
    fn test_close_deletes_swap_files() -> Result<()> {
        let dir = tempdir().unwrap();
        let store = TempPageStore::new(dir.path(), 16, 1)?;

        let page_id = store.allocate_page()?;
        store.allocate_page()?;
        let paths = store.backing_paths();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.exists()));

        store.close()?;
        assert!(store.is_closed());
        assert!(paths.iter().all(|p| !p.exists()));
        assert!(matches!(
            store.read_page(page_id),
            Err(StorageError::InvalidOperation(_))
        ));
        assert!(store.allocate_page().is_err());

        // Closing twice is harmless
        store.close()?;

        Ok(())
    }

    #[test]
    fn test_corruption_detected() -> Result<()> {
        let dir = tempdir().unwrap();
        let store = TempPageStore::new(dir.path(), 16, 4)?;
        let page_id = store.allocate_page()?;
        store.write_page(page_id, &[1u8; 16])?;

        // Scribble over the page behind the store's back
        let path = store.backing_paths().remove(0);
        let mut file = std::fs::OpenOptions::new().write(true).open(&path)?;
        file.write_all(&[9u8; 4])?;
        drop(file);

        assert!(matches!(
            store.read_page(page_id),
            Err(StorageError::Corruption(_))
        ));

        Ok(())
    }

    #[test]
    fn test_rejects_bad_page_size() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            TempPageStore::new(dir.path(), 100, 4),
            Err(StorageError::InvalidConfig(_))
        ));
        assert!(matches!(
            TempPageStore::new(dir.path(), 8, 4),
            Err(StorageError::InvalidConfig(_))
        ));
        assert!(matches!(
            TempPageStore::new(dir.path(), 64, 0),
            Err(StorageError::InvalidConfig(_))
        ));
    }
}
