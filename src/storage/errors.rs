//! Storage error types
//!
//! Every variant names the file and the operation that failed so a caller
//! can log exactly where a read or write stopped.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage backend errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {} at offset {offset}: {source}", .path.display())]
    Read {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("short read from {} at offset {offset}: expected {expected} bytes, got {actual}", .path.display())]
    ShortRead {
        path: PathBuf,
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("failed to write {} at offset {offset}: {source}", .path.display())]
    Write {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("short write to {} at offset {offset}: expected {expected} bytes, wrote {actual}", .path.display())]
    ShortWrite {
        path: PathBuf,
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("failed to seek {} to offset {offset}: {source}", .path.display())]
    Seek {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to map {}: {source}", .path.display())]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to sync {}: {source}", .path.display())]
    Sync {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename {} to {}: {source}", .path.display(), .to.display())]
    Rename {
        path: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to stat {}: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt content in {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
}

impl StorageError {
    /// Path of the file the failed operation touched.
    pub fn path(&self) -> &std::path::Path {
        match self {
            StorageError::Open { path, .. }
            | StorageError::Read { path, .. }
            | StorageError::ShortRead { path, .. }
            | StorageError::Write { path, .. }
            | StorageError::ShortWrite { path, .. }
            | StorageError::Seek { path, .. }
            | StorageError::Map { path, .. }
            | StorageError::Sync { path, .. }
            | StorageError::Remove { path, .. }
            | StorageError::Rename { path, .. }
            | StorageError::Metadata { path, .. }
            | StorageError::Corrupt { path, .. } => path,
        }
    }

    /// Returns true if the file simply does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::Open { source, .. } | StorageError::Metadata { source, .. } => {
                source.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_path_and_counts() {
        let err = StorageError::ShortRead {
            path: PathBuf::from("/data/a.idx"),
            offset: 16,
            expected: 8,
            actual: 3,
        };
        let display = err.to_string();
        assert!(display.contains("/data/a.idx"));
        assert!(display.contains("offset 16"));
        assert!(display.contains("expected 8"));
        assert_eq!(err.path(), std::path::Path::new("/data/a.idx"));
    }

    #[test]
    fn test_not_found_detection() {
        let err = StorageError::Open {
            path: PathBuf::from("missing"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.is_not_found());

        let err = StorageError::Seek {
            path: PathBuf::from("x"),
            offset: 0,
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(!err.is_not_found());
    }
}
