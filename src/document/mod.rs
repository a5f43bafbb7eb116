//! Delta document: the editable view over a segment list.
//!
//! A document starts as a single file segment spanning its source file (or as
//! nothing at all) and records every edit as segment list surgery. Edited and
//! inserted bytes are appended to the document's own memory source, so the
//! source file is never written. Each edit performs its fallible I/O (the
//! memory append) before touching the list, which leaves the document
//! unchanged when an edit fails.

mod data;

pub use data::{BinaryData, ByteArrayData, EditableBinaryData};

use crate::error::{Result, StorageError};
use crate::repository::RepositoryShared;
use crate::segment::{Segment, SegmentInfo, SegmentList};
use crate::source::{DataSource, FileSource, SharedMemorySource};
use crate::types::{DocumentId, SegmentKind, IO_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Document statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStats {
    /// Document id
    pub id: DocumentId,
    /// Logical size in bytes
    pub data_size: u64,
    /// Total number of segments
    pub segment_count: usize,
    /// Segments backed by a source file
    pub file_segments: usize,
    /// Segments backed by the memory source
    pub memory_segments: usize,
    /// Bytes held by the memory source, including unreferenced ones
    pub memory_bytes: u64,
    /// Pages the memory source occupies in the page store
    pub memory_pages: usize,
    /// Memory source bytes no segment references any more
    pub discarded_bytes: u64,
    /// Structural revision counter
    pub revision: u64,
}

/// Editable byte document stored as a delta over its source file
pub struct DeltaDocument {
    id: DocumentId,
    repository: Arc<RepositoryShared>,
    segments: SegmentList,
    memory: SharedMemorySource,
    revision: u64,
    disposed: bool,
}

impl DeltaDocument {
    pub(crate) fn new(repository: Arc<RepositoryShared>, source: Option<Arc<FileSource>>) -> Self {
        let id = repository.register_document();
        let memory = repository.new_memory_source();
        let mut segments = SegmentList::new();
        if let Some(source) = source {
            let length = source.len();
            if length > 0 {
                segments.push_back(Segment::new(DataSource::File(source), 0, length));
            }
        }
        debug!(document = %id, size = segments.data_size(), "created delta document");

        Self {
            id,
            repository,
            segments,
            memory,
            revision: 0,
            disposed: false,
        }
    }

    /// Repository-issued id of this document
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Current document size in bytes
    pub fn data_size(&self) -> u64 {
        self.segments.data_size()
    }

    /// Check if the document holds no bytes
    pub fn is_empty(&self) -> bool {
        self.segments.data_size() == 0
    }

    /// Number of segments in the list
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Descriptions of all segments in document order
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.segments.iter().map(Segment::info).collect()
    }

    /// Resolve `position` to its segment and the offset inside that segment
    pub fn segment_at(&self, position: u64) -> Option<(SegmentInfo, u64)> {
        let (node, start) = self.segments.locate(position)?;
        Some((self.segments.segment(node).info(), position - start))
    }

    /// Counter bumped by every structural edit.
    ///
    /// Position caches held outside the document are stale once this value
    /// changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether `dispose` has run
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub(crate) fn repository(&self) -> &Arc<RepositoryShared> {
        &self.repository
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(StorageError::invalid_operation(format!(
                "document {} has been disposed",
                self.id
            )));
        }
        self.repository.ensure_open()
    }

    fn check_range(&self, position: u64, length: u64) -> Result<()> {
        let size = self.data_size();
        match position.checked_add(length) {
            Some(end) if end <= size => Ok(()),
            _ => Err(StorageError::out_of_bounds(position, length, size)),
        }
    }

    fn memory_segment(&self, offset: u64, length: u64) -> Segment {
        Segment::new(DataSource::Memory(Arc::clone(&self.memory)), offset, length)
    }

    /// Read the byte at `position`
    pub fn byte(&self, position: u64) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.copy_to_slice(position, &mut byte)?;
        Ok(byte[0])
    }

    /// Fill `target` with the bytes starting at `position`
    pub fn copy_to_slice(&self, position: u64, target: &mut [u8]) -> Result<()> {
        self.check_range(position, target.len() as u64)?;
        self.segments.read(position, target)
    }

    /// Read `length` bytes starting at `position` into a new buffer
    pub fn read_range(&self, position: u64, length: u64) -> Result<Vec<u8>> {
        self.check_range(position, length)?;
        let mut buf = vec![0u8; length as usize];
        self.segments.read(position, &mut buf)?;
        Ok(buf)
    }

    /// Overwrite the byte at `position`
    pub fn set_byte(&mut self, position: u64, value: u8) -> Result<()> {
        self.check_range(position, 1)?;
        self.replace(position, &[value])
    }

    /// Overwrite bytes from `position` on, growing the document when `data`
    /// runs past the end
    pub fn replace(&mut self, position: u64, data: &[u8]) -> Result<()> {
        self.ensure_live()?;
        self.check_range(position, 0)?;
        if data.is_empty() {
            return Ok(());
        }
        let length = data.len() as u64;
        let overlap = (self.data_size() - position).min(length);

        // Bytes already living in one memory segment are rewritten in place
        if overlap == length {
            if let Some((node, start)) = self.segments.locate(position) {
                let segment = self.segments.segment(node);
                let local = position - start;
                if let DataSource::Memory(memory) = segment.source() {
                    if local + length <= segment.len() {
                        memory
                            .write()
                            .write(segment.start_position() + local, data)?;
                        trace!(document = %self.id, position, length, "overwrote memory bytes in place");
                        return Ok(());
                    }
                }
            }
        }

        let offset = self.memory.write().append(data)?;
        let replacement = self.memory_segment(offset, length);
        let removed = self.segments.remove_range(position, overlap);
        self.segments.insert_at(position, replacement);
        self.segments.normalize_span(position, position + length);
        self.revision += 1;
        trace!(document = %self.id, position, length, overlap, "replaced range");

        self.reclaim(removed);
        Ok(())
    }

    /// Insert `data` so that it starts at `position`
    pub fn insert(&mut self, position: u64, data: &[u8]) -> Result<()> {
        self.ensure_live()?;
        self.check_range(position, 0)?;
        if data.is_empty() {
            return Ok(());
        }
        let length = data.len() as u64;

        let offset = self.memory.write().append(data)?;
        let inserted = self.memory_segment(offset, length);
        self.segments.insert_at(position, inserted);
        self.segments.normalize_span(position, position + length);
        self.revision += 1;
        trace!(document = %self.id, position, length, "inserted bytes");
        Ok(())
    }

    /// Remove `length` bytes starting at `position`
    pub fn remove(&mut self, position: u64, length: u64) -> Result<()> {
        self.ensure_live()?;
        self.check_range(position, length)?;
        if length == 0 {
            return Ok(());
        }

        let removed = self.segments.remove_range(position, length);
        self.segments.normalize_span(position, position);
        self.revision += 1;
        trace!(document = %self.id, position, length, "removed range");

        self.reclaim(removed);
        Ok(())
    }

    /// Discard the memory bytes of removed segments.
    ///
    /// Memory ranges never overlap, so nothing else can reference them.
    fn reclaim(&mut self, removed: Vec<Segment>) {
        let ranges: Vec<(u64, u64)> = removed
            .iter()
            .filter(|segment| match segment.source() {
                DataSource::Memory(memory) => Arc::ptr_eq(memory, &self.memory),
                DataSource::File(_) => false,
            })
            .map(|segment| (segment.start_position(), segment.end_position()))
            .collect();
        drop(removed);
        if ranges.is_empty() {
            return;
        }

        let mut memory = self.memory.write();
        for (start, end) in ranges {
            if let Err(err) = memory.discard(start, end) {
                warn!(document = %self.id, error = %err, start, end, "failed to reclaim memory bytes");
            }
        }
    }

    /// Remove every segment and release the memory source
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.segments.clear();
        self.revision += 1;
        self.memory.write().release()
    }

    /// Merge every pair of contiguous neighbouring segments.
    ///
    /// Edits already normalize around the bytes they touch, so this usually
    /// returns 0.
    pub fn normalize(&mut self) -> usize {
        let merged = self.segments.normalize();
        if merged > 0 {
            self.revision += 1;
        }
        merged
    }

    /// Assert the document's internal consistency.
    ///
    /// Panics when the segment list is broken; a correct build never trips
    /// this.
    pub fn validate(&self) {
        if let Err(problem) = self.segments.check_invariants() {
            panic!("delta document {} is inconsistent: {}", self.id, problem);
        }
        for segment in self.segments.iter() {
            if let DataSource::Memory(memory) = segment.source() {
                assert!(
                    Arc::ptr_eq(memory, &self.memory),
                    "delta document {} references a foreign memory source",
                    self.id
                );
            }
        }
    }

    /// Independent copy of the whole document.
    ///
    /// The memory source is duplicated page by page and the segment layout is
    /// kept as is.
    pub fn copy(&self) -> Result<DeltaDocument> {
        self.repository.ensure_open()?;
        let memory = self.memory.read().duplicate()?;

        let mut copy = DeltaDocument::new(Arc::clone(&self.repository), None);
        *copy.memory.write() = memory;
        for segment in self.segments.iter() {
            let segment = match segment.kind() {
                SegmentKind::File => segment.clone(),
                SegmentKind::Memory => copy.memory_segment(segment.start_position(), segment.len()),
            };
            copy.segments.push_back(segment);
        }
        debug!(document = %self.id, copy = %copy.id, size = copy.data_size(), "copied document");
        Ok(copy)
    }

    /// Independent document holding `[position, position + length)`.
    ///
    /// File segments are shared with this document; memory bytes are copied
    /// into the new document's own memory source.
    pub fn copy_range(&self, position: u64, length: u64) -> Result<DeltaDocument> {
        self.check_range(position, length)?;
        self.repository.ensure_open()?;

        let mut copy = DeltaDocument::new(Arc::clone(&self.repository), None);
        let mut buf = Vec::new();
        for part in self.segments.slice(position, length) {
            match part.kind() {
                SegmentKind::File => {
                    copy.segments.push_back(part);
                }
                SegmentKind::Memory => {
                    let start = copy.memory.read().len();
                    buf.resize(IO_CHUNK_SIZE.min(part.len() as usize), 0);
                    let mut done = 0u64;
                    while done < part.len() {
                        let take = (part.len() - done).min(buf.len() as u64) as usize;
                        part.read(done, &mut buf[..take])?;
                        copy.memory.write().append(&buf[..take])?;
                        done += take as u64;
                    }
                    let segment = copy.memory_segment(start, part.len());
                    copy.segments.push_back(segment);
                }
            }
        }
        copy.segments.normalize();
        debug!(document = %self.id, copy = %copy.id, position, length, "copied document range");
        Ok(copy)
    }

    /// Replace the whole content with the bytes of `reader`.
    ///
    /// The bytes are staged in a fresh memory source first, so a failed read
    /// leaves the document untouched.
    pub fn load_from<R: Read>(&mut self, mut reader: R) -> Result<u64> {
        self.ensure_live()?;
        let staged = self.repository.new_memory_source();
        let mut buf = vec![0u8; IO_CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let read = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            staged.write().append(&buf[..read])?;
            total += read as u64;
        }

        self.segments.clear();
        self.memory = staged;
        if total > 0 {
            let segment = self.memory_segment(0, total);
            self.segments.push_back(segment);
        }
        self.revision += 1;
        debug!(document = %self.id, size = total, "loaded document content");
        Ok(total)
    }

    /// Write the whole content to `writer`, returning the byte count
    pub fn save_to<W: Write>(&self, mut writer: W) -> Result<u64> {
        let mut buf = vec![0u8; IO_CHUNK_SIZE.min(self.data_size() as usize)];
        let mut total = 0u64;
        for segment in self.segments.iter() {
            let mut done = 0u64;
            while done < segment.len() {
                let take = (segment.len() - done).min(buf.len() as u64) as usize;
                segment.read(done, &mut buf[..take])?;
                writer.write_all(&buf[..take])?;
                done += take as u64;
            }
            total += segment.len();
        }
        writer.flush()?;
        Ok(total)
    }

    /// Point the document at a freshly saved file, dropping its delta
    pub(crate) fn rebase(&mut self, source: Arc<FileSource>) {
        self.segments.clear();
        if let Err(err) = self.memory.write().release() {
            warn!(document = %self.id, error = %err, "failed to release memory source");
        }
        let length = source.len();
        if length > 0 {
            self.segments
                .push_back(Segment::new(DataSource::File(source), 0, length));
        }
        self.revision += 1;
    }

    /// Current statistics
    pub fn stats(&self) -> DocumentStats {
        let mut file_segments = 0;
        let mut memory_segments = 0;
        for segment in self.segments.iter() {
            match segment.kind() {
                SegmentKind::File => file_segments += 1,
                SegmentKind::Memory => memory_segments += 1,
            }
        }
        let memory = self.memory.read();
        DocumentStats {
            id: self.id,
            data_size: self.data_size(),
            segment_count: self.segments.len(),
            file_segments,
            memory_segments,
            memory_bytes: memory.len(),
            memory_pages: memory.page_count(),
            discarded_bytes: memory.discarded_len(),
            revision: self.revision,
        }
    }

    /// Release memory pages and file references held by this document.
    ///
    /// The document is empty afterwards and rejects further edits. Calling it
    /// again does nothing.
    pub fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        self.segments.clear();
        let released = self.memory.write().release();
        self.repository.unregister_document(self.id);
        debug!(document = %self.id, "disposed delta document");
        released
    }
}

impl Drop for DeltaDocument {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!(document = %self.id, error = %err, "failed to dispose delta document");
        }
    }
}

impl std::fmt::Debug for DeltaDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaDocument")
            .field("id", &self.id)
            .field("size", &self.data_size())
            .field("segments", &self.segments.len())
            .field("revision", &self.revision)
            .finish()
    }
}
