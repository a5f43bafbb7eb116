//! Data sources: where segment bytes actually live.
//!
//! A segment points into exactly one data source:
//! - `FileSource`: read-only view of an original file, shared between documents
//! - `MemorySource`: edited and inserted bytes, inline or spilled into pages

mod file;
mod memory;

pub use file::FileSource;
pub use memory::MemorySource;

use crate::error::{Result, StorageError};
use crate::types::SegmentKind;
use parking_lot::RwLock;
use std::sync::Arc;

/// Memory source shared by the segments of one document
pub type SharedMemorySource = Arc<RwLock<MemorySource>>;

/// Byte-range provider backing a segment
#[derive(Clone)]
pub enum DataSource {
    /// Read-only original file
    File(Arc<FileSource>),
    /// Mutable in-memory or paged bytes
    Memory(SharedMemorySource),
}

impl DataSource {
    /// Variant of this source
    pub fn kind(&self) -> SegmentKind {
        match self {
            Self::File(_) => SegmentKind::File,
            Self::Memory(_) => SegmentKind::Memory,
        }
    }

    /// Total length of the source in bytes
    pub fn len(&self) -> u64 {
        match self {
            Self::File(file) => file.len(),
            Self::Memory(memory) => memory.read().len(),
        }
    }

    /// Check if the source is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `target` with the bytes starting at `offset`
    pub fn read(&self, offset: u64, target: &mut [u8]) -> Result<()> {
        match self {
            Self::File(file) => file.read(offset, target),
            Self::Memory(memory) => memory.read().read(offset, target),
        }
    }

    /// Overwrite a byte in place; file sources are never written
    pub fn write_byte(&self, offset: u64, value: u8) -> Result<()> {
        match self {
            Self::File(file) => Err(StorageError::unsupported(format!(
                "file source {} is read-only",
                file.path().display()
            ))),
            Self::Memory(memory) => memory.write().set_byte(offset, value),
        }
    }

    /// Whether both values refer to the same underlying source
    pub fn same_source(&self, other: &DataSource) -> bool {
        match (self, other) {
            (Self::File(a), Self::File(b)) => Arc::ptr_eq(a, b),
            (Self::Memory(a), Self::Memory(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(file) => f.debug_tuple("File").field(&file.path()).finish(),
            Self::Memory(memory) => f.debug_tuple("Memory").field(&memory.read().len()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{PageStore, TempPageStore};
    use tempfile::tempdir;

    #[test]
    fn test_dispatch_by_variant() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"file bytes")?;
        let store: Arc<dyn PageStore> = Arc::new(TempPageStore::new(dir.path(), 64, 16)?);

        let file = DataSource::File(Arc::new(FileSource::open(&path)?));
        let memory = MemorySource::new(store, 1024);
        let memory = DataSource::Memory(Arc::new(RwLock::new(memory)));
        if let DataSource::Memory(shared) = &memory {
            shared.write().append(b"memory")?;
        }

        assert_eq!(file.kind(), SegmentKind::File);
        assert_eq!(memory.kind(), SegmentKind::Memory);
        assert_eq!(file.len(), 10);
        assert_eq!(memory.len(), 6);

        let mut buf = [0u8; 4];
        file.read(5, &mut buf)?;
        assert_eq!(&buf, b"byte");
        memory.read(2, &mut buf)?;
        assert_eq!(&buf, b"mory");

        memory.write_byte(0, b'M')?;
        memory.read(0, &mut buf)?;
        assert_eq!(&buf, b"Memo");

        assert!(matches!(
            file.write_byte(0, 0),
            Err(StorageError::UnsupportedOperation(_))
        ));

        assert!(file.same_source(&file.clone()));
        assert!(!file.same_source(&memory));
        Ok(())
    }
}
