//! Raw page buffers exchanged with the page store.

/// A page-sized byte buffer.
///
/// The length is fixed at construction and always equals the page size of the
/// store the buffer was read from or is destined for.
#[derive(Clone, PartialEq, Eq)]
pub struct PageBuf {
    data: Box<[u8]>,
}

impl PageBuf {
    /// Create a new zeroed page buffer
    pub fn zeroed(page_size: usize) -> Self {
        Self {
            data: vec![0u8; page_size].into_boxed_slice(),
        }
    }

    /// Create a page buffer of `page_size` bytes, copying as much of `bytes`
    /// as fits and zero-filling the rest
    pub fn from_bytes(page_size: usize, bytes: &[u8]) -> Self {
        let mut page = Self::zeroed(page_size);
        let len = bytes.len().min(page_size);
        page.data[..len].copy_from_slice(&bytes[..len]);
        page
    }

    /// Get a reference to the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the raw bytes
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl std::fmt::Debug for PageBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageBuf").field("len", &self.data.len()).finish()
    }
}

impl std::ops::Deref for PageBuf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl std::ops::DerefMut for PageBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl AsRef<[u8]> for PageBuf {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl AsMut<[u8]> for PageBuf {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_pads_and_clips() {
        let page = PageBuf::from_bytes(8, b"abc");
        assert_eq!(page.as_bytes(), b"abc\0\0\0\0\0");

        let page = PageBuf::from_bytes(4, b"abcdef");
        assert_eq!(page.len(), 4);
        assert_eq!(&page[..], b"abcd");
    }
}
