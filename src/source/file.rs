//! Read-only view of an original file on disk.

use crate::error::Result;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read-only, shared view of a source file.
///
/// The length is captured when the file is opened and never changes for the
/// lifetime of the source. Segments of any number of documents may reference
/// the same `FileSource` through an `Arc`; the handle closes once the last
/// reference is dropped. The engine never writes to or deletes the file.
pub struct FileSource {
    /// Canonical path of the file
    path: PathBuf,
    /// Seek state is shared, so every read holds the lock for seek + read
    file: Mutex<File>,
    length: u64,
}

impl FileSource {
    /// Open `path` for reading
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = std::fs::canonicalize(path.as_ref())?;
        let file = File::open(&path)?;
        let length = file.metadata()?.len();
        debug!(path = %path.display(), length, "opened file source");

        Ok(Self {
            path,
            file: Mutex::new(file),
            length,
        })
    }

    /// Canonical path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the file when it was opened
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Check if the file is empty
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Fill `target` with the bytes starting at `offset`.
    ///
    /// Panics if the range runs past the end of the file; segments guarantee
    /// their bounds.
    pub fn read(&self, offset: u64, target: &mut [u8]) -> Result<()> {
        let end = offset.checked_add(target.len() as u64);
        assert!(
            end.is_some_and(|end| end <= self.length),
            "file source read {}+{} exceeds length {}",
            offset,
            target.len(),
            self.length
        );
        if target.is_empty() {
            return Ok(());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(target)?;
        Ok(())
    }
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("path", &self.path)
            .field("length", &self.length)
            .finish()
    }
}
