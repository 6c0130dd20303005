//! Shared, immutable byte buffers
//!
//! A buffer is either a read-only memory map of a file or an owned heap
//! copy. Clones share the same allocation through an `Arc`; the contents
//! never change after construction, so any number of readers may hold one
//! without locking.

use std::fmt;
use std::fs::File;
use std::io;
use std::ops::{Deref, Range};
use std::sync::Arc;

use memmap2::Mmap;

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// A reference-counted, immutable byte buffer.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<Backing>,
}

impl SharedBuffer {
    /// Wraps an owned byte vector.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Backing::Owned(bytes)),
        }
    }

    /// Maps `file` read-only. Empty files get an owned empty buffer since a
    /// zero-length mapping is not portable.
    pub fn map_file(file: &File) -> io::Result<Self> {
        if file.metadata()?.len() == 0 {
            return Ok(Self::from_vec(Vec::new()));
        }
        // SAFETY: the mapping is read-only. Index files are published by
        // renaming a finished sibling over them, so a mapped inode is never
        // truncated or rewritten.
        let map = unsafe { Mmap::map(file)? };
        Ok(Self {
            inner: Arc::new(Backing::Mapped(map)),
        })
    }

    /// Returns true if the bytes come from a memory-mapped file.
    pub fn is_file_map(&self) -> bool {
        matches!(*self.inner, Backing::Mapped(_))
    }

    /// Returns the contents.
    pub fn as_slice(&self) -> &[u8] {
        match &*self.inner {
            Backing::Mapped(map) => &map[..],
            Backing::Owned(bytes) => &bytes[..],
        }
    }

    /// Returns a sub-slice, or `None` if `range` falls outside the buffer.
    pub fn get(&self, range: Range<u64>) -> Option<&[u8]> {
        let start = usize::try_from(range.start).ok()?;
        let end = usize::try_from(range.end).ok()?;
        self.as_slice().get(start..end)
    }

    /// Number of live handles sharing this buffer.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl Deref for SharedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for SharedBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for SharedBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .field("mapped", &self.is_file_map())
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_clones_share_allocation() {
        let buf = SharedBuffer::from_vec(vec![1, 2, 3]);
        let other = buf.clone();
        assert_eq!(buf.ref_count(), 2);
        assert_eq!(other.as_slice(), &[1, 2, 3]);
        drop(other);
        assert_eq!(buf.ref_count(), 1);
    }

    #[test]
    fn test_get_checks_bounds() {
        let buf = SharedBuffer::from_vec(vec![0, 1, 2, 3, 4]);
        assert_eq!(buf.get(1..3), Some(&[1u8, 2][..]));
        assert_eq!(buf.get(4..9), None);
    }

    #[test]
    fn test_map_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mapped.bin");
        fs::write(&path, b"mapped bytes").unwrap();

        let file = File::open(&path).unwrap();
        let buf = SharedBuffer::map_file(&file).unwrap();
        assert!(buf.is_file_map());
        assert_eq!(&buf[..], b"mapped bytes");
    }

    #[test]
    fn test_map_empty_file_is_owned() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.bin");
        fs::write(&path, b"").unwrap();

        let file = File::open(&path).unwrap();
        let buf = SharedBuffer::map_file(&file).unwrap();
        assert!(!buf.is_file_map());
        assert!(buf.is_empty());
    }
}
