//! Positioned file access with byte-count checking
//!
//! Every read and write is checked against the number of bytes requested;
//! a short count is an error distinct from an I/O failure so callers can
//! tell a truncated file from a failing disk.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::errors::{StorageError, StorageResult};

/// An open file together with its path and current offset.
#[derive(Debug)]
pub struct FileHandle {
    /// Path the file was opened from
    path: PathBuf,
    /// Underlying file
    file: File,
    /// Current byte offset
    offset: u64,
}

impl FileHandle {
    /// Opens an existing file for reading.
    pub fn open_read(path: &Path) -> StorageResult<Self> {
        let file = File::open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            offset: 0,
        })
    }

    /// Creates (or truncates) a file for writing. Missing parent directories
    /// are created.
    pub fn create(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| StorageError::Open {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|source| StorageError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            offset: 0,
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the file length.
    pub fn len(&self) -> StorageResult<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|source| StorageError::Metadata {
                path: self.path.clone(),
                source,
            })
    }

    /// Returns true if the file is empty.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Moves to an absolute offset.
    pub fn seek_to(&mut self, offset: u64) -> StorageResult<()> {
        let reached = self
            .file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| StorageError::Seek {
                path: self.path.clone(),
                offset,
                source,
            })?;
        self.offset = reached;
        Ok(())
    }

    /// Reads until `buf` is full or the file ends. Returns the byte count.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        let start = self.offset;
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(StorageError::Read {
                        path: self.path.clone(),
                        offset: start,
                        source,
                    })
                }
            }
        }
        self.offset += filled as u64;
        Ok(filled)
    }

    /// Fills `buf` from the current offset; a short count is an error.
    pub fn read_full(&mut self, buf: &mut [u8]) -> StorageResult<()> {
        let start = self.offset;
        let got = self.read_bytes(buf)?;
        if got < buf.len() {
            return Err(StorageError::ShortRead {
                path: self.path.clone(),
                offset: start,
                expected: buf.len(),
                actual: got,
            });
        }
        Ok(())
    }

    /// Fills `buf` from an absolute offset.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        self.seek_to(offset)?;
        self.read_full(buf)
    }

    /// Writes all of `data`; a short count is an error.
    pub fn write_bytes(&mut self, data: &[u8]) -> StorageResult<()> {
        let start = self.offset;
        let mut written = 0;
        while written < data.len() {
            match self.file.write(&data[written..]) {
                Ok(0) => {
                    return Err(StorageError::ShortWrite {
                        path: self.path.clone(),
                        offset: start,
                        expected: data.len(),
                        actual: written,
                    })
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(StorageError::Write {
                        path: self.path.clone(),
                        offset: start + written as u64,
                        source,
                    })
                }
            }
        }
        self.offset += written as u64;
        Ok(())
    }

    /// Flushes file contents to disk.
    pub fn sync(&self) -> StorageResult<()> {
        self.file.sync_all().map_err(|source| StorageError::Sync {
            path: self.path.clone(),
            source,
        })
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let reached = self.file.seek(pos)?;
        self.offset = reached;
        Ok(reached)
    }
}
