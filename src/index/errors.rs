//! Index error types
//!
//! Error codes:
//! - AERO_INDEX_INVALID_ARGUMENT (ERROR)
//! - AERO_INDEX_IO_OPEN / _IO_READ / _IO_WRITE / _IO_SEEK (ERROR)
//! - AERO_INDEX_FORMAT_INVALID (ERROR)
//! - AERO_INDEX_CONSTRUCTION_FAILED (FATAL for the index instance)
//! - AERO_INDEX_MERGE_INCOMPATIBLE (WARN, recovered by rebuilding)
//!
//! Each code also has a distinct negative integer for the `*_code` APIs.

use std::error::Error as StdError;
use std::fmt;

use crate::observability::Severity;
use crate::storage::StorageError;

/// Index error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexErrorCode {
    /// Caller passed an unusable argument
    AeroIndexInvalidArgument,
    /// A file could not be opened
    AeroIndexIoOpen,
    /// A write failed or was short
    AeroIndexIoWrite,
    /// A read failed or was short
    AeroIndexIoRead,
    /// Bytes do not form a valid index
    AeroIndexFormatInvalid,
    /// A seek failed
    AeroIndexIoSeek,
    /// The column cannot be indexed
    AeroIndexConstructionFailed,
    /// A partial index does not line up with the existing one
    AeroIndexMergeIncompatible,
}

impl IndexErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            IndexErrorCode::AeroIndexInvalidArgument => "AERO_INDEX_INVALID_ARGUMENT",
            IndexErrorCode::AeroIndexIoOpen => "AERO_INDEX_IO_OPEN",
            IndexErrorCode::AeroIndexIoWrite => "AERO_INDEX_IO_WRITE",
            IndexErrorCode::AeroIndexIoRead => "AERO_INDEX_IO_READ",
            IndexErrorCode::AeroIndexFormatInvalid => "AERO_INDEX_FORMAT_INVALID",
            IndexErrorCode::AeroIndexIoSeek => "AERO_INDEX_IO_SEEK",
            IndexErrorCode::AeroIndexConstructionFailed => "AERO_INDEX_CONSTRUCTION_FAILED",
            IndexErrorCode::AeroIndexMergeIncompatible => "AERO_INDEX_MERGE_INCOMPATIBLE",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            IndexErrorCode::AeroIndexConstructionFailed => Severity::Fatal,
            IndexErrorCode::AeroIndexMergeIncompatible => Severity::Warn,
            _ => Severity::Error,
        }
    }

    /// Negative status returned by the `*_code` APIs
    pub fn errno(&self) -> i64 {
        match self {
            IndexErrorCode::AeroIndexInvalidArgument => -1,
            IndexErrorCode::AeroIndexIoOpen => -2,
            IndexErrorCode::AeroIndexIoWrite => -3,
            IndexErrorCode::AeroIndexIoRead => -4,
            IndexErrorCode::AeroIndexFormatInvalid => -5,
            IndexErrorCode::AeroIndexIoSeek => -6,
            IndexErrorCode::AeroIndexConstructionFailed => -7,
            IndexErrorCode::AeroIndexMergeIncompatible => -8,
        }
    }

    /// True for the I/O family of codes
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            IndexErrorCode::AeroIndexIoOpen
                | IndexErrorCode::AeroIndexIoWrite
                | IndexErrorCode::AeroIndexIoRead
                | IndexErrorCode::AeroIndexIoSeek
        )
    }
}

impl fmt::Display for IndexErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Index error with context
#[derive(Debug)]
pub struct IndexError {
    code: IndexErrorCode,
    message: String,
    /// Extra context, such as the offending path or bin
    details: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl IndexError {
    fn new(code: IndexErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(IndexErrorCode::AeroIndexInvalidArgument, message)
    }

    pub fn io_open(message: impl Into<String>) -> Self {
        Self::new(IndexErrorCode::AeroIndexIoOpen, message)
    }

    pub fn io_read(message: impl Into<String>) -> Self {
        Self::new(IndexErrorCode::AeroIndexIoRead, message)
    }

    pub fn io_write(message: impl Into<String>) -> Self {
        Self::new(IndexErrorCode::AeroIndexIoWrite, message)
    }

    pub fn io_seek(message: impl Into<String>) -> Self {
        Self::new(IndexErrorCode::AeroIndexIoSeek, message)
    }

    /// Malformed index bytes
    pub fn format(message: impl Into<String>) -> Self {
        Self::new(IndexErrorCode::AeroIndexFormatInvalid, message)
    }

    /// Index bytes end before the declared header or offset table
    pub fn truncated(what: &str, needed: u64, available: u64) -> Self {
        Self::format(format!("truncated {}", what))
            .with_details(format!("need {} bytes, have {}", needed, available))
    }

    pub fn construction(message: impl Into<String>) -> Self {
        Self::new(IndexErrorCode::AeroIndexConstructionFailed, message)
    }

    pub fn merge_incompatible(message: impl Into<String>) -> Self {
        Self::new(IndexErrorCode::AeroIndexMergeIncompatible, message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> IndexErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn errno(&self) -> i64 {
        self.code.errno()
    }

    pub fn is_format(&self) -> bool {
        self.code == IndexErrorCode::AeroIndexFormatInvalid
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl StdError for IndexError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<StorageError> for IndexError {
    fn from(err: StorageError) -> Self {
        let code = match &err {
            StorageError::Open { .. } => IndexErrorCode::AeroIndexIoOpen,
            StorageError::Read { .. }
            | StorageError::ShortRead { .. }
            | StorageError::Map { .. }
            | StorageError::Metadata { .. } => IndexErrorCode::AeroIndexIoRead,
            StorageError::Write { .. }
            | StorageError::ShortWrite { .. }
            | StorageError::Sync { .. }
            | StorageError::Remove { .. }
            | StorageError::Rename { .. } => IndexErrorCode::AeroIndexIoWrite,
            StorageError::Seek { .. } => IndexErrorCode::AeroIndexIoSeek,
            StorageError::Corrupt { .. } => IndexErrorCode::AeroIndexFormatInvalid,
        };
        IndexError::new(code, err.to_string()).with_source(err)
    }
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;
