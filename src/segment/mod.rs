//! Segments and the segment list.
//!
//! A segment maps a contiguous logical range of a document onto a byte range
//! of one data source. The segment list keeps them in document order.

mod list;

pub use list::{Iter, SegmentList};

use crate::error::Result;
use crate::source::DataSource;
use crate::types::SegmentKind;
use serde::{Deserialize, Serialize};

/// A non-empty range `[start, start + length)` of one data source
#[derive(Clone)]
pub struct Segment {
    source: DataSource,
    start: u64,
    length: u64,
}

impl Segment {
    /// Create a segment; panics on an empty range
    pub fn new(source: DataSource, start: u64, length: u64) -> Self {
        assert!(length > 0, "segments must not be empty");
        Self {
            source,
            start,
            length,
        }
    }

    /// The data source holding this segment's bytes
    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Variant of the backing source
    pub fn kind(&self) -> SegmentKind {
        self.source.kind()
    }

    /// Offset of the first byte inside the source
    pub fn start_position(&self) -> u64 {
        self.start
    }

    /// Offset one past the last byte inside the source
    pub fn end_position(&self) -> u64 {
        self.start + self.length
    }

    /// Length in bytes, never zero
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Split at local offset `at` into `[0, at)` and `[at, len)`
    pub fn split(&self, at: u64) -> (Segment, Segment) {
        assert!(
            at > 0 && at < self.length,
            "split offset {} outside segment of length {}",
            at,
            self.length
        );
        (
            Segment::new(self.source.clone(), self.start, at),
            Segment::new(self.source.clone(), self.start + at, self.length - at),
        )
    }

    /// Sub-range `[offset, offset + length)` of this segment
    pub fn slice(&self, offset: u64, length: u64) -> Segment {
        assert!(
            offset.checked_add(length).is_some_and(|end| end <= self.length),
            "slice {}+{} outside segment of length {}",
            offset,
            length,
            self.length
        );
        Segment::new(self.source.clone(), self.start + offset, length)
    }

    /// Whether `next` continues this segment in the same source
    pub fn can_merge(&self, next: &Segment) -> bool {
        self.source.same_source(&next.source) && self.end_position() == next.start
    }

    /// Grow by `length` bytes at the end
    pub(crate) fn extend(&mut self, length: u64) {
        self.length += length;
    }

    /// Fill `target` with bytes starting at local offset `offset`
    pub fn read(&self, offset: u64, target: &mut [u8]) -> Result<()> {
        assert!(
            offset
                .checked_add(target.len() as u64)
                .is_some_and(|end| end <= self.length),
            "segment read {}+{} exceeds length {}",
            offset,
            target.len(),
            self.length
        );
        self.source.read(self.start + offset, target)
    }

    /// Serializable description of this segment
    pub fn info(&self) -> SegmentInfo {
        SegmentInfo {
            kind: self.kind(),
            start_position: self.start,
            length: self.length,
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}, +{})", self.kind(), self.start, self.length)
    }
}

/// Plain description of a segment for inspection and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentInfo {
    /// Backing source variant
    pub kind: SegmentKind,
    /// Offset inside the source
    pub start_position: u64,
    /// Length in bytes
    pub length: u64,
}

impl SegmentInfo {
    /// Describe a file-backed segment
    pub fn file(start_position: u64, length: u64) -> Self {
        Self {
            kind: SegmentKind::File,
            start_position,
            length,
        }
    }

    /// Describe a memory-backed segment
    pub fn memory(start_position: u64, length: u64) -> Self {
        Self {
            kind: SegmentKind::Memory,
            start_position,
            length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileSource;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn file_source(bytes: &[u8]) -> (tempfile::TempDir, DataSource) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.bin");
        std::fs::write(&path, bytes).unwrap();
        let source = DataSource::File(Arc::new(FileSource::open(&path).unwrap()));
        (dir, source)
    }

    #[test]
    fn test_split_preserves_positions() {
        let (_dir, source) = file_source(&[0u8; 100]);
        let segment = Segment::new(source, 20, 50);

        let (left, right) = segment.split(15);
        assert_eq!(left.info(), SegmentInfo::file(20, 15));
        assert_eq!(right.info(), SegmentInfo::file(35, 35));
        assert!(left.can_merge(&right));
        assert!(!right.can_merge(&left));
    }

    #[test]
    #[should_panic(expected = "outside segment")]
    fn test_split_at_edge_panics() {
        let (_dir, source) = file_source(&[0u8; 10]);
        let segment = Segment::new(source, 0, 10);
        segment.split(10);
    }

    #[test]
    fn test_merge_requires_same_source() {
        let (_dir_a, a) = file_source(&[1u8; 10]);
        let (_dir_b, b) = file_source(&[1u8; 10]);

        let first = Segment::new(a.clone(), 0, 5);
        assert!(first.can_merge(&Segment::new(a, 5, 5)));
        assert!(!first.can_merge(&Segment::new(b, 5, 5)));
    }

    #[test]
    fn test_read_and_slice() -> Result<()> {
        let (_dir, source) = file_source(b"0123456789");
        let segment = Segment::new(source, 2, 6);

        let mut buf = [0u8; 3];
        segment.read(1, &mut buf)?;
        assert_eq!(&buf, b"345");

        let slice = segment.slice(4, 2);
        assert_eq!(slice.info(), SegmentInfo::file(6, 2));
        Ok(())
    }
}
