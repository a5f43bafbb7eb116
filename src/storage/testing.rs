//! Page store wrappers for exercising failure paths in tests.

use crate::error::{Result, StorageError};
use crate::page::PageBuf;
use crate::storage::{PageStore, PageStoreStats, TempPageStore};
use crate::types::PageId;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Page store that refuses allocations once its budget is spent, and can fail
/// one chosen write
pub(crate) struct BudgetStore {
    inner: TempPageStore,
    budget: AtomicUsize,
    writes: AtomicUsize,
    fail_write_at: AtomicUsize,
}

impl BudgetStore {
    pub(crate) fn new(inner: TempPageStore, budget: usize) -> Self {
        Self {
            inner,
            budget: AtomicUsize::new(budget),
            writes: AtomicUsize::new(0),
            fail_write_at: AtomicUsize::new(usize::MAX),
        }
    }

    /// Fail the `index`th page write from now on (zero based), once
    pub(crate) fn fail_write(&self, index: usize) {
        self.writes.store(0, Ordering::SeqCst);
        self.fail_write_at.store(index, Ordering::SeqCst);
    }
}

fn injected(message: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, message.to_string()))
}

impl PageStore for BudgetStore {
    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn allocate_page(&self) -> Result<PageId> {
        let left = self.budget.load(Ordering::SeqCst);
        if left == 0 {
            return Err(injected("page budget exhausted"));
        }
        self.budget.store(left - 1, Ordering::SeqCst);
        self.inner.allocate_page()
    }

    fn read_page(&self, page_id: PageId) -> Result<PageBuf> {
        self.inner.read_page(page_id)
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        let index = self.writes.fetch_add(1, Ordering::SeqCst);
        if index == self.fail_write_at.load(Ordering::SeqCst) {
            self.fail_write_at.store(usize::MAX, Ordering::SeqCst);
            return Err(injected("injected write failure"));
        }
        self.inner.write_page(page_id, data)
    }

    fn free_page(&self, page_id: PageId) -> Result<()> {
        self.inner.free_page(page_id)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn stats(&self) -> PageStoreStats {
        self.inner.stats()
    }
}
