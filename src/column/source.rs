//! The column interface consumed by index construction

use std::fmt;
use std::path::{Path, PathBuf};

use crate::bitvector::BitVector;
use crate::storage::{SharedBuffer, StorageBackend, StorageResult};

use super::types::ColumnType;

/// A column an index can be built from.
///
/// Values are fixed-width little-endian integers, one per row. Rows not
/// set in the null mask carry no value and are never indexed.
pub trait ColumnSource: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn column_type(&self) -> ColumnType;

    /// Number of rows in the partition.
    fn row_count(&self) -> u32;

    /// Rows that hold a valid value.
    fn null_mask(&self) -> StorageResult<BitVector>;

    /// Smallest valid value, or 0 if unknown.
    fn lower_bound(&self) -> f64;

    /// Largest valid value, or 0 if unknown.
    fn upper_bound(&self) -> f64;

    /// Directory holding the column files, if the column lives on disk.
    fn data_dir(&self) -> Option<&Path> {
        None
    }

    /// File holding the raw values, for positioned reads.
    fn data_file(&self) -> Option<PathBuf> {
        None
    }

    /// The whole value array as little-endian bytes.
    fn raw_values(&self, backend: &dyn StorageBackend) -> StorageResult<SharedBuffer>;

    /// The same column stored in `dir`, if it exists there.
    fn relocate(&self, _dir: &Path) -> Option<Box<dyn ColumnSource>> {
        None
    }
}
