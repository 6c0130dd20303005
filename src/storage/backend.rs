//! Storage backend trait and the local filesystem implementation

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::buffer::SharedBuffer;
use super::errors::{StorageError, StorageResult};
use super::file::FileHandle;

/// Backend trait for index and column files
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Open an existing file for positioned reads
    fn open_read(&self, path: &Path) -> StorageResult<FileHandle>;

    /// Create or truncate a file for writing
    fn open_write(&self, path: &Path) -> StorageResult<FileHandle>;

    /// Return the whole file as a shared buffer, mapped when worthwhile
    fn get_mapped_buffer(&self, path: &Path) -> StorageResult<SharedBuffer>;

    /// Drop any cached buffer for `path` so the next open sees fresh contents
    fn flush(&self, path: &Path);

    /// Delete the file at `path`
    fn remove(&self, path: &Path) -> StorageResult<()>;

    /// Atomically replace `to` with `from`. Buffers already handed out for
    /// `to` keep the old contents.
    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()>;

    /// Size of the file in bytes
    fn file_size(&self, path: &Path) -> StorageResult<u64>;

    /// Check if a file exists
    fn exists(&self, path: &Path) -> bool;
}

/// Local filesystem backend.
///
/// Shared buffers are cached per path. Files at least `mmap_threshold`
/// bytes long are memory-mapped; smaller ones are read into memory.
pub struct FileBackend {
    mmap_threshold: usize,
    cache: Mutex<HashMap<PathBuf, SharedBuffer>>,
}

impl FileBackend {
    /// Creates a backend that maps files of at least `mmap_threshold` bytes.
    pub fn new(mmap_threshold: usize) -> Self {
        Self {
            mmap_threshold,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached buffers.
    pub fn cached_files(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, SharedBuffer>> {
        // A panic while holding the lock cannot leave a half-inserted entry.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load(&self, path: &Path) -> StorageResult<SharedBuffer> {
        let len = self.file_size(path)?;
        if len >= self.mmap_threshold as u64 {
            let file = File::open(path).map_err(|source| StorageError::Open {
                path: path.to_path_buf(),
                source,
            })?;
            return SharedBuffer::map_file(&file).map_err(|source| StorageError::Map {
                path: path.to_path_buf(),
                source,
            });
        }

        let mut handle = self.open_read(path)?;
        let mut bytes = vec![0u8; len as usize];
        handle.read_full(&mut bytes)?;
        Ok(SharedBuffer::from_vec(bytes))
    }
}

impl Default for FileBackend {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MMAP_THRESHOLD)
    }
}

impl fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBackend")
            .field("mmap_threshold", &self.mmap_threshold)
            .field("cached_files", &self.cached_files())
            .finish()
    }
}

impl StorageBackend for FileBackend {
    fn open_read(&self, path: &Path) -> StorageResult<FileHandle> {
        FileHandle::open_read(path)
    }

    fn open_write(&self, path: &Path) -> StorageResult<FileHandle> {
        FileHandle::create(path)
    }

    fn get_mapped_buffer(&self, path: &Path) -> StorageResult<SharedBuffer> {
        if let Some(buf) = self.lock_cache().get(path) {
            return Ok(buf.clone());
        }

        let buf = self.load(path)?;
        self.lock_cache().insert(path.to_path_buf(), buf.clone());
        Ok(buf)
    }

    fn flush(&self, path: &Path) {
        self.lock_cache().remove(path);
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        self.flush(path);
        fs::remove_file(path).map_err(|source| StorageError::Remove {
            path: path.to_path_buf(),
            source,
        })
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        self.flush(from);
        self.flush(to);
        fs::rename(from, to).map_err(|source| StorageError::Rename {
            path: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })
    }

    fn file_size(&self, path: &Path) -> StorageResult<u64> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|source| StorageError::Metadata {
                path: path.to_path_buf(),
                source,
            })
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}
