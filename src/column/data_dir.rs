//! Column stored in a partition data directory
//!
//! Layout inside the directory:
//!
//! - `<name>`: raw little-endian values, one per row
//! - `<name>.int`: the u32 codes of a category column, in place of `<name>`
//! - `<name>.msk`: optional serialized null mask; absent means every row
//!   is valid

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::bitvector::BitVector;
use crate::storage::{
    FileBackend, FileHandle, SharedBuffer, StorageBackend, StorageError, StorageResult,
};

use super::source::ColumnSource;
use super::types::{encode_values, value_bounds, ColumnType, IntegerValue};

/// A column read from files in a data directory.
#[derive(Debug)]
pub struct DataDirColumn {
    name: String,
    column_type: ColumnType,
    dir: PathBuf,
    row_count: u32,
    bounds: OnceLock<(f64, f64)>,
    /// Reads the null mask and scans the value file
    backend: Arc<dyn StorageBackend>,
}

impl DataDirColumn {
    /// Opens column `name` in `dir`. The row count is owned by the
    /// partition, not derived from the file.
    pub fn new(dir: impl Into<PathBuf>, name: &str, column_type: ColumnType, row_count: u32) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            dir: dir.into(),
            row_count,
            bounds: OnceLock::new(),
            backend: Arc::new(FileBackend::default()),
        }
    }

    /// Reads the mask and value files through `backend`.
    pub fn with_backend(self, backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend, ..self }
    }

    /// Supplies known value bounds instead of scanning the data file.
    pub fn with_bounds(self, lower: f64, upper: f64) -> Self {
        let bounds = OnceLock::new();
        let _ = bounds.set((lower, upper));
        Self { bounds, ..self }
    }

    /// Path of the value file for column `name` in `dir`.
    pub fn value_path(dir: &Path, name: &str, column_type: ColumnType) -> PathBuf {
        match column_type {
            ColumnType::Category => dir.join(format!("{}.int", name)),
            _ => dir.join(name),
        }
    }

    /// Path of the null mask file for column `name` in `dir`.
    pub fn mask_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.msk", name))
    }

    /// Writes `values` as the value file of column `name` in `dir`.
    pub fn write_values<T: IntegerValue>(
        dir: &Path,
        name: &str,
        column_type: ColumnType,
        values: &[T],
    ) -> StorageResult<PathBuf> {
        let path = Self::value_path(dir, name, column_type);
        let mut handle = FileHandle::create(&path)?;
        handle.write_bytes(&encode_values(values))?;
        handle.sync()?;
        Ok(path)
    }

    /// Writes `mask` as the null mask of column `name` in `dir`.
    pub fn write_mask(dir: &Path, name: &str, mask: &BitVector) -> StorageResult<PathBuf> {
        let path = Self::mask_path(dir, name);
        let mut bytes = Vec::with_capacity(mask.serialized_size());
        mask.serialize_into(&mut bytes)
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                offset: 0,
                source,
            })?;
        let mut handle = FileHandle::create(&path)?;
        handle.write_bytes(&bytes)?;
        handle.sync()?;
        Ok(path)
    }

    fn values_path(&self) -> PathBuf {
        Self::value_path(&self.dir, &self.name, self.column_type)
    }

    /// Whole contents of `path`, or `None` if there is no such file.
    fn read_file(&self, path: &Path) -> StorageResult<Option<Vec<u8>>> {
        if !self.backend.exists(path) {
            return Ok(None);
        }
        let mut handle = self.backend.open_read(path)?;
        let len = usize::try_from(handle.len()?).map_err(|_| StorageError::Corrupt {
            path: path.to_path_buf(),
            reason: "file too large to read".to_string(),
        })?;
        let mut bytes = vec![0u8; len];
        handle.read_full(&mut bytes)?;
        Ok(Some(bytes))
    }

    fn scan_bounds(&self) -> (f64, f64) {
        let bytes = match self.read_file(&self.values_path()) {
            Ok(Some(bytes)) => bytes,
            _ => return (0.0, 0.0),
        };
        let mask = self
            .null_mask()
            .unwrap_or_else(|_| BitVector::ones(self.row_count));
        value_bounds(self.column_type, &bytes, &mask, self.row_count).unwrap_or((0.0, 0.0))
    }
}

impl ColumnSource for DataDirColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn column_type(&self) -> ColumnType {
        self.column_type
    }

    fn row_count(&self) -> u32 {
        self.row_count
    }

    fn null_mask(&self) -> StorageResult<BitVector> {
        let path = Self::mask_path(&self.dir, &self.name);
        let bytes = match self.read_file(&path)? {
            Some(bytes) => bytes,
            None => return Ok(BitVector::ones(self.row_count)),
        };
        BitVector::deserialize(&bytes, self.row_count).map_err(|e| StorageError::Corrupt {
            path,
            reason: format!("null mask: {}", e),
        })
    }

    fn lower_bound(&self) -> f64 {
        self.bounds.get_or_init(|| self.scan_bounds()).0
    }

    fn upper_bound(&self) -> f64 {
        self.bounds.get_or_init(|| self.scan_bounds()).1
    }

    fn data_dir(&self) -> Option<&Path> {
        Some(&self.dir)
    }

    fn data_file(&self) -> Option<PathBuf> {
        Some(self.values_path())
    }

    fn raw_values(&self, backend: &dyn StorageBackend) -> StorageResult<SharedBuffer> {
        backend.get_mapped_buffer(&self.values_path())
    }

    fn relocate(&self, dir: &Path) -> Option<Box<dyn ColumnSource>> {
        let width = self.column_type.element_size() as u64;
        if width == 0 {
            return None;
        }
        let len = self
            .backend
            .file_size(&Self::value_path(dir, &self.name, self.column_type))
            .ok()?;
        let rows = u32::try_from(len / width).ok()?;
        let moved = DataDirColumn::new(dir, &self.name, self.column_type, rows)
            .with_backend(Arc::clone(&self.backend));
        Some(Box::new(moved))
    }
}
