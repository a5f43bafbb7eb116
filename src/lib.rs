//! # Delta Document Storage
//!
//! Random-access byte documents for editing arbitrarily large files without
//! rewriting them. A document is a list of segments, each pointing into either
//! the untouched source file or a memory source holding edited bytes, which
//! spills into temporary swap pages once it grows large.
//!
//! ## Architecture
//!
//! - **Storage Layer** (`storage`): fixed-size pages in temporary swap files
//! - **Data Sources** (`source`): read-only file sources and paged memory sources
//! - **Segments** (`segment`): source ranges kept in an arena linked list
//! - **Documents** (`document`): the editing façade over a segment list
//! - **Repository** (`repository`): shared file sources and document lifecycle
//!
//! ## Usage
//!
//! ```rust,ignore
//! use delta_document::{Config, SegmentsRepository};
//!
//! let repository = SegmentsRepository::new(Config::new())?;
//! let mut document = repository.open_document("firmware.bin")?;
//!
//! // Edits never touch the source file
//! document.set_byte(0x10, 0xFF)?;
//! document.insert(0x20, b"patch")?;
//! document.remove(0x100, 16)?;
//!
//! let header = document.read_range(0, 32)?;
//!
//! // Persist and continue editing on top of the saved file
//! repository.save_document(&mut document, "firmware.patched.bin")?;
//! ```

pub mod document;
pub mod error;
pub mod page;
pub mod repository;
pub mod segment;
pub mod source;
pub mod storage;
pub mod types;

pub use document::{BinaryData, ByteArrayData, DeltaDocument, DocumentStats, EditableBinaryData};
pub use error::{Result, StorageError};
pub use repository::{RepositoryStats, SegmentsRepository};
pub use segment::SegmentInfo;
pub use source::{DataSource, FileSource, MemorySource};
pub use storage::{PageStore, PageStoreStats, TempPageStore};
pub use types::{DocumentId, PageId, SegmentKind};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use types::{DEFAULT_INLINE_THRESHOLD, DEFAULT_PAGES_PER_FILE, DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};

/// Repository configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Directory for page swap files (default: the OS temp dir)
    pub temp_dir: Option<PathBuf>,
    /// Page size in bytes, a power of two (default: 4096)
    pub page_size: usize,
    /// Memory source bytes kept inline before spilling to pages (default: 64 KiB)
    pub inline_threshold: usize,
    /// Pages per swap file (default: 16384)
    pub pages_per_file: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_dir: None,
            page_size: DEFAULT_PAGE_SIZE,
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            pages_per_file: DEFAULT_PAGES_PER_FILE,
        }
    }
}

impl Config {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the swap file directory
    pub fn temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Set page size
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Set inline threshold
    pub fn inline_threshold(mut self, bytes: usize) -> Self {
        self.inline_threshold = bytes;
        self
    }

    /// Set pages per swap file
    pub fn pages_per_file(mut self, pages: u64) -> Self {
        self.pages_per_file = pages;
        self
    }

    /// Check that the settings can be used
    pub fn validate(&self) -> Result<()> {
        if self.page_size < MIN_PAGE_SIZE || !self.page_size.is_power_of_two() {
            return Err(StorageError::invalid_config(format!(
                "page size {} must be a power of two of at least {}",
                self.page_size, MIN_PAGE_SIZE
            )));
        }
        if self.pages_per_file == 0 {
            return Err(StorageError::invalid_config("pages per file must be positive"));
        }
        Ok(())
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| StorageError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
