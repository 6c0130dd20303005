//! Storage subsystem for aerobitmap
//!
//! The storage layer opens, reads, writes and maps the files that hold
//! column data and serialized indexes. It knows nothing about index layout.
//!
//! # Design Principles
//!
//! - Every read and write is checked for a full byte count
//! - Shared buffers are immutable once published and reference-counted
//! - A file is replaced by renaming a finished sibling over it, never
//!   rewritten in place
//!
//! # Invariants
//!
//! - A cached buffer always reflects the file contents at the time it was
//!   loaded; `flush` is the only way to observe a rewritten file

mod backend;
mod buffer;
mod errors;
mod file;

pub use backend::{FileBackend, StorageBackend};
pub use buffer::SharedBuffer;
pub use errors::{StorageError, StorageResult};
pub use file::FileHandle;
