//! Random-access byte interfaces shared by delta documents and plain buffers.

use super::DeltaDocument;
use crate::error::{Result, StorageError};
use std::io::{Read, Write};

/// Read-only random access to a sequence of bytes
pub trait BinaryData {
    /// Length in bytes
    fn len(&self) -> u64;

    /// Check if there are no bytes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte at `position`
    fn read_byte(&self, position: u64) -> Result<u8>;

    /// Fill `target` with the bytes starting at `position`
    fn copy_to_slice(&self, position: u64, target: &mut [u8]) -> Result<()>;

    /// Bytes `[position, position + length)` in a new buffer
    fn read_range(&self, position: u64, length: u64) -> Result<Vec<u8>> {
        let size = self.len();
        if position.checked_add(length).map_or(true, |end| end > size) {
            return Err(StorageError::out_of_bounds(position, length, size));
        }
        let mut buf = vec![0u8; length as usize];
        self.copy_to_slice(position, &mut buf)?;
        Ok(buf)
    }

    /// Write every byte to `writer`, returning the byte count
    fn save_to(&self, writer: &mut dyn Write) -> Result<u64>;
}

/// Byte sequence that can be edited in place
pub trait EditableBinaryData: BinaryData {
    /// Overwrite the byte at `position`
    fn write_byte(&mut self, position: u64, value: u8) -> Result<()>;

    /// Insert `data` so that it starts at `position`
    fn insert_range(&mut self, position: u64, data: &[u8]) -> Result<()>;

    /// Remove `length` bytes starting at `position`
    fn delete_range(&mut self, position: u64, length: u64) -> Result<()>;

    /// Overwrite bytes from `position` on, growing at the end if needed
    fn replace_range(&mut self, position: u64, data: &[u8]) -> Result<()>;

    /// Remove every byte
    fn clear(&mut self) -> Result<()>;

    /// Replace the content with everything `reader` yields
    fn load_from(&mut self, reader: &mut dyn Read) -> Result<u64>;

    /// Independent copy of the whole content
    fn snapshot(&self) -> Result<Self>
    where
        Self: Sized;

    /// Independent copy of `[position, position + length)`
    fn snapshot_range(&self, position: u64, length: u64) -> Result<Self>
    where
        Self: Sized;
}

/// Plain in-memory byte buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteArrayData {
    data: Vec<u8>,
}

impl ByteArrayData {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Take the bytes out
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn range(&self, position: u64, length: u64) -> Result<std::ops::Range<usize>> {
        let size = self.data.len() as u64;
        match position.checked_add(length) {
            Some(end) if end <= size => Ok(position as usize..end as usize),
            _ => Err(StorageError::out_of_bounds(position, length, size)),
        }
    }
}

impl From<Vec<u8>> for ByteArrayData {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl From<&[u8]> for ByteArrayData {
    fn from(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }
}

impl BinaryData for ByteArrayData {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_byte(&self, position: u64) -> Result<u8> {
        let range = self.range(position, 1)?;
        Ok(self.data[range.start])
    }

    fn copy_to_slice(&self, position: u64, target: &mut [u8]) -> Result<()> {
        let range = self.range(position, target.len() as u64)?;
        target.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn read_range(&self, position: u64, length: u64) -> Result<Vec<u8>> {
        let range = self.range(position, length)?;
        Ok(self.data[range].to_vec())
    }

    fn save_to(&self, writer: &mut dyn Write) -> Result<u64> {
        writer.write_all(&self.data)?;
        writer.flush()?;
        Ok(self.data.len() as u64)
    }
}

impl EditableBinaryData for ByteArrayData {
    fn write_byte(&mut self, position: u64, value: u8) -> Result<()> {
        let range = self.range(position, 1)?;
        self.data[range.start] = value;
        Ok(())
    }

    fn insert_range(&mut self, position: u64, data: &[u8]) -> Result<()> {
        let at = self.range(position, 0)?.start;
        self.data.splice(at..at, data.iter().copied());
        Ok(())
    }

    fn delete_range(&mut self, position: u64, length: u64) -> Result<()> {
        let range = self.range(position, length)?;
        self.data.drain(range);
        Ok(())
    }

    fn replace_range(&mut self, position: u64, data: &[u8]) -> Result<()> {
        let at = self.range(position, 0)?.start;
        let end = (at + data.len()).min(self.data.len());
        self.data.splice(at..end, data.iter().copied());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.data.clear();
        Ok(())
    }

    fn load_from(&mut self, reader: &mut dyn Read) -> Result<u64> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.data = data;
        Ok(self.data.len() as u64)
    }

    fn snapshot(&self) -> Result<Self> {
        Ok(self.clone())
    }

    fn snapshot_range(&self, position: u64, length: u64) -> Result<Self> {
        let range = self.range(position, length)?;
        Ok(Self::from(&self.data[range]))
    }
}

impl BinaryData for DeltaDocument {
    fn len(&self) -> u64 {
        self.data_size()
    }

    fn read_byte(&self, position: u64) -> Result<u8> {
        self.byte(position)
    }

    fn copy_to_slice(&self, position: u64, target: &mut [u8]) -> Result<()> {
        DeltaDocument::copy_to_slice(self, position, target)
    }

    fn read_range(&self, position: u64, length: u64) -> Result<Vec<u8>> {
        DeltaDocument::read_range(self, position, length)
    }

    fn save_to(&self, writer: &mut dyn Write) -> Result<u64> {
        DeltaDocument::save_to(self, writer)
    }
}

impl EditableBinaryData for DeltaDocument {
    fn write_byte(&mut self, position: u64, value: u8) -> Result<()> {
        self.set_byte(position, value)
    }

    fn insert_range(&mut self, position: u64, data: &[u8]) -> Result<()> {
        self.insert(position, data)
    }

    fn delete_range(&mut self, position: u64, length: u64) -> Result<()> {
        self.remove(position, length)
    }

    fn replace_range(&mut self, position: u64, data: &[u8]) -> Result<()> {
        self.replace(position, data)
    }

    fn clear(&mut self) -> Result<()> {
        DeltaDocument::clear(self)
    }

    fn load_from(&mut self, reader: &mut dyn Read) -> Result<u64> {
        DeltaDocument::load_from(self, reader)
    }

    fn snapshot(&self) -> Result<Self> {
        self.copy()
    }

    fn snapshot_range(&self, position: u64, length: u64) -> Result<Self> {
        self.copy_range(position, length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SegmentsRepository;
    use crate::Config;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use tempfile::tempdir;

    /// Apply the same random edits through the trait to both implementations
    fn drive<A: EditableBinaryData, B: EditableBinaryData>(a: &mut A, b: &mut B, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..200 {
            let size = a.len();
            assert_eq!(size, b.len());
            match rng.gen_range(0..4) {
                0 if size > 0 => {
                    let position = rng.gen_range(0..size);
                    let value: u8 = rng.gen();
                    a.write_byte(position, value).unwrap();
                    b.write_byte(position, value).unwrap();
                }
                1 => {
                    let position = rng.gen_range(0..=size);
                    let data: Vec<u8> = (0..rng.gen_range(1..24)).map(|_| rng.gen()).collect();
                    a.insert_range(position, &data).unwrap();
                    b.insert_range(position, &data).unwrap();
                }
                2 if size > 0 => {
                    let position = rng.gen_range(0..size);
                    let length = rng.gen_range(0..=(size - position).min(24));
                    a.delete_range(position, length).unwrap();
                    b.delete_range(position, length).unwrap();
                }
                _ => {
                    let position = rng.gen_range(0..=size);
                    let data: Vec<u8> = (0..rng.gen_range(1..12)).map(|_| rng.gen()).collect();
                    a.replace_range(position, &data).unwrap();
                    b.replace_range(position, &data).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_document_matches_byte_array() -> Result<()> {
        let dir = tempdir().unwrap();
        let config = Config::new()
            .temp_dir(dir.path())
            .page_size(32)
            .inline_threshold(64);
        let repository = SegmentsRepository::new(config)?;
        let mut document = repository.create_document(None)?;
        let mut model = ByteArrayData::new();

        drive(&mut document, &mut model, 7);

        let mut saved = Vec::new();
        BinaryData::save_to(&document, &mut saved)?;
        assert_eq!(saved, model.as_slice());
        if !model.is_empty() {
            let last = model.len() - 1;
            assert_eq!(document.read_byte(last)?, model.read_byte(last)?);
        }
        document.validate();
        Ok(())
    }

    #[test]
    fn test_byte_array_bounds() {
        let mut data = ByteArrayData::from(b"abc".to_vec());
        assert!(matches!(
            data.read_byte(3),
            Err(StorageError::OutOfBounds { .. })
        ));
        assert!(data.insert_range(4, b"x").is_err());
        assert!(data.delete_range(2, 2).is_err());

        data.replace_range(2, b"CDE").unwrap();
        assert_eq!(data.as_slice(), b"abCDE");
        data.insert_range(5, b"!").unwrap();
        assert_eq!(data.snapshot_range(3, 3).unwrap().into_inner(), b"DE!");
    }

    /// Reads only the required methods, leaving `read_range` to the default
    struct Repeated(u64);

    impl BinaryData for Repeated {
        fn len(&self) -> u64 {
            self.0
        }

        fn read_byte(&self, _position: u64) -> Result<u8> {
            Ok(b'z')
        }

        fn copy_to_slice(&self, _position: u64, target: &mut [u8]) -> Result<()> {
            target.fill(b'z');
            Ok(())
        }

        fn save_to(&self, _writer: &mut dyn Write) -> Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_huge_read_range_is_out_of_bounds() -> Result<()> {
        let data = ByteArrayData::from(b"abc".to_vec());
        assert!(matches!(
            data.read_range(1, u64::MAX),
            Err(StorageError::OutOfBounds { .. })
        ));
        assert_eq!(data.read_range(1, 2)?, b"bc");

        let repeated = Repeated(4);
        assert!(matches!(
            repeated.read_range(1, u64::MAX),
            Err(StorageError::OutOfBounds { .. })
        ));
        assert!(repeated.read_range(u64::MAX, 1).is_err());
        assert_eq!(repeated.read_range(2, 2)?, b"zz");

        let dir = tempdir().unwrap();
        let repository = SegmentsRepository::new(Config::new().temp_dir(dir.path()))?;
        let mut document = repository.create_document(None)?;
        document.insert(0, b"abc")?;
        assert!(matches!(
            BinaryData::read_range(&document, 1, u64::MAX),
            Err(StorageError::OutOfBounds { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_load_through_trait() -> Result<()> {
        let dir = tempdir().unwrap();
        let repository = SegmentsRepository::new(Config::new().temp_dir(dir.path()))?;
        let mut document = repository.create_document(None)?;

        let mut reader: &[u8] = b"streamed content";
        assert_eq!(EditableBinaryData::load_from(&mut document, &mut reader)?, 16);
        let snapshot = document.snapshot_range(9, 7)?;
        assert_eq!(snapshot.read_range(0, 7)?, b"content");

        EditableBinaryData::clear(&mut document)?;
        assert!(BinaryData::is_empty(&document));
        Ok(())
    }
}
