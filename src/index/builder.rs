//! Cold construction of a direct index from a column
//!
//! One generic routine over [`IntegerValue`], selected once from the column
//! type. Values are read as a whole array when the backend can provide one;
//! otherwise they are read one at a time from the data file.

use crate::bitvector::{BitVector, IndexSet};
use crate::column::{ColumnSource, ColumnType, IntegerValue};
use crate::observability::{log_event, Event};
use crate::storage::{SharedBuffer, StorageBackend};

use super::errors::{IndexError, IndexResult};
use super::store::IndexStore;

/// How the values were read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPath {
    /// Whole value array from the storage backend
    Direct,
    /// Positioned reads from the data file
    Fallback,
}

/// A freshly built store and how its values were read.
#[derive(Debug)]
pub struct BuildReport {
    pub store: IndexStore,
    pub path: BuildPath,
}

/// Builds the bins for `column`. Nothing is written to storage.
pub fn build_store(
    column: &dyn ColumnSource,
    backend: &dyn StorageBackend,
    max_bins: u32,
) -> IndexResult<BuildReport> {
    match column.column_type() {
        ColumnType::Byte => construct::<i8>(column, backend, max_bins),
        ColumnType::UByte => construct::<u8>(column, backend, max_bins),
        ColumnType::Short => construct::<i16>(column, backend, max_bins),
        ColumnType::UShort => construct::<u16>(column, backend, max_bins),
        ColumnType::Int => construct::<i32>(column, backend, max_bins),
        ColumnType::UInt | ColumnType::Category => construct::<u32>(column, backend, max_bins),
        ColumnType::Long => construct::<i64>(column, backend, max_bins),
        ColumnType::ULong => construct::<u64>(column, backend, max_bins),
        other => Err(IndexError::construction(format!(
            "column {} has type {}, a direct index needs integers",
            column.name(),
            other
        ))),
    }
}

fn construct<T: IntegerValue>(
    column: &dyn ColumnSource,
    backend: &dyn StorageBackend,
    max_bins: u32,
) -> IndexResult<BuildReport> {
    let rows = column.row_count();
    let mut mask = column.null_mask()?;
    mask.set_size(rows);

    let mut store = IndexStore::new(rows);
    presize(&mut store, column, max_bins)?;

    let path = match column.raw_values(backend) {
        Ok(values) => {
            fill_from_buffer::<T>(&mut store, &mask, &values, max_bins)?;
            BuildPath::Direct
        }
        Err(e) => {
            let reason = e.to_string();
            log_event(
                Event::FallbackRead,
                &[("column", column.name()), ("reason", reason.as_str())],
            );
            fill_from_file::<T>(&mut store, column, backend, &mask, max_bins)?;
            BuildPath::Fallback
        }
    };

    store.adjust_sizes();
    Ok(BuildReport { store, path })
}

/// Allocates `upper_bound + 1` bins when the column has a value range.
fn presize(store: &mut IndexStore, column: &dyn ColumnSource, max_bins: u32) -> IndexResult<()> {
    let (lower, upper) = (column.lower_bound(), column.upper_bound());
    if !(upper > lower) || upper < 0.0 {
        return Ok(());
    }
    let bins = upper.floor() + 1.0;
    if bins > max_bins as f64 {
        return Err(IndexError::construction(format!(
            "column {} upper bound {} needs more than {} bins",
            column.name(),
            upper,
            max_bins
        )));
    }
    store.grow_to(bins as usize);
    Ok(())
}

fn insert<T: IntegerValue>(store: &mut IndexStore, row: u32, value: T, max_bins: u32) -> IndexResult<()> {
    let bin = value.to_bin().filter(|b| *b < max_bins).ok_or_else(|| {
        IndexError::construction(format!("value {:?} at row {} is not a bin number", value, row))
            .with_details(format!("bins are limited to 0..{}", max_bins))
    })?;
    store.set_row(bin as usize, row)
}

fn missing_value(row: u32, available: u32) -> IndexError {
    IndexError::construction(format!("row {} is valid but has no value", row))
        .with_details(format!("only {} values available", available))
}

/// Visits the valid rows of `mask` as runs and explicit lists.
fn for_each_valid_row<F>(mask: &BitVector, mut visit: F) -> IndexResult<()>
where
    F: FnMut(u32, bool) -> IndexResult<()>,
{
    for set in mask.index_sets() {
        match set {
            IndexSet::Range { start, end } => {
                for row in start..end {
                    visit(row, row == start)?;
                }
            }
            IndexSet::Indices(list) => {
                for row in list {
                    visit(row, true)?;
                }
            }
        }
    }
    Ok(())
}

fn fill_from_buffer<T: IntegerValue>(
    store: &mut IndexStore,
    mask: &BitVector,
    values: &SharedBuffer,
    max_bins: u32,
) -> IndexResult<()> {
    let available = u32::try_from(values.len() / T::WIDTH)
        .unwrap_or(u32::MAX)
        .min(store.row_count());
    for_each_valid_row(mask, |row, _| {
        if row >= available {
            return Err(missing_value(row, available));
        }
        let start = row as usize * T::WIDTH;
        let value = values
            .get(start as u64..(start + T::WIDTH) as u64)
            .and_then(T::from_le_slice)
            .ok_or_else(|| missing_value(row, available))?;
        insert(store, row, value, max_bins)
    })
}

fn fill_from_file<T: IntegerValue>(
    store: &mut IndexStore,
    column: &dyn ColumnSource,
    backend: &dyn StorageBackend,
    mask: &BitVector,
    max_bins: u32,
) -> IndexResult<()> {
    let no_data = || IndexError::construction(format!("no data file for column {}", column.name()));
    let path = column.data_file().ok_or_else(no_data)?;
    if !backend.exists(&path) {
        return Err(no_data().with_details(path.display().to_string()));
    }
    let size = backend.file_size(&path)?;
    if size == 0 {
        return Err(no_data().with_details(format!("{} is empty", path.display())));
    }

    let available = u32::try_from(size / T::WIDTH as u64)
        .unwrap_or(u32::MAX)
        .min(store.row_count());
    let mut handle = backend.open_read(&path)?;
    let mut buf = vec![0u8; T::WIDTH];
    for_each_valid_row(mask, |row, jump| {
        if row >= available {
            return Err(missing_value(row, available));
        }
        let offset = row as u64 * T::WIDTH as u64;
        if jump || handle.offset() != offset {
            handle.seek_to(offset)?;
        }
        handle.read_full(&mut buf)?;
        let value = T::from_le_slice(&buf).ok_or_else(|| missing_value(row, available))?;
        insert(store, row, value, max_bins)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{DataDirColumn, MemoryColumn};
    use crate::index::IndexErrorCode;
    use crate::storage::FileBackend;
    use tempfile::TempDir;

    fn rows_of(store: &IndexStore, bin: usize) -> Vec<u32> {
        store.bitvector(bin).unwrap().iter().collect()
    }

    #[test]
    fn test_build_from_memory() {
        let column = MemoryColumn::new("a", &[2u8, 0, 2, 1, 4]);
        let report = build_store(&column, &FileBackend::default(), 1 << 24).unwrap();
        assert_eq!(report.path, BuildPath::Direct);

        let store = report.store;
        assert_eq!(store.row_count(), 5);
        assert_eq!(store.bin_count(), 5);
        assert_eq!(rows_of(&store, 2), vec![0, 2]);
        assert_eq!(rows_of(&store, 3), Vec::<u32>::new());
        assert_eq!(store.bitvector(3).unwrap().size(), 5);
    }

    #[test]
    fn test_null_rows_are_skipped() {
        let column = MemoryColumn::new("a", &[1i32, -5, 1]).with_nulls(&[1]);
        let store = build_store(&column, &FileBackend::default(), 100).unwrap().store;
        assert_eq!(rows_of(&store, 1), vec![0, 2]);
        assert_eq!(store.bin_count(), 2);
    }

    #[test]
    fn test_values_truncated_to_row_count() {
        let column = MemoryColumn::new("a", &[0u16, 1, 9]).with_row_count(2);
        let store = build_store(&column, &FileBackend::default(), 100).unwrap().store;
        assert_eq!(store.bin_count(), 2);
        assert_eq!(store.row_count(), 2);
    }

    #[test]
    fn test_rejects_non_integer_column() {
        let column = MemoryColumn::from_raw("f", ColumnType::Double, vec![0u8; 16], 2);
        let err = build_store(&column, &FileBackend::default(), 100).unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroIndexConstructionFailed);
    }

    #[test]
    fn test_rejects_negative_and_oversized_values() {
        let column = MemoryColumn::new("a", &[3i64, -1]);
        assert!(build_store(&column, &FileBackend::default(), 100).is_err());

        let column = MemoryColumn::new("a", &[3u32, 100]).with_bounds(0.0, 0.0);
        let err = build_store(&column, &FileBackend::default(), 100).unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroIndexConstructionFailed);

        let column = MemoryColumn::new("a", &[3u32, 1000]);
        assert!(build_store(&column, &FileBackend::default(), 100).is_err());
    }

    #[test]
    fn test_valid_row_without_value() {
        let column = MemoryColumn::new("a", &[1u8, 2])
            .with_row_count(4)
            .with_mask(BitVector::ones(4));
        let err = build_store(&column, &FileBackend::default(), 100).unwrap_err();
        assert!(err.message().contains("row 2"));
    }

    #[test]
    fn test_presize_from_upper_bound() {
        let column = MemoryColumn::new("a", &[1u8, 2]).with_bounds(1.0, 6.0);
        let store = build_store(&column, &FileBackend::default(), 100).unwrap().store;
        assert_eq!(store.bin_count(), 7);
    }

    #[test]
    fn test_fallback_without_data_file() {
        let temp_dir = TempDir::new().unwrap();
        let column = DataDirColumn::new(temp_dir.path(), "a", ColumnType::Int, 3);
        let err = build_store(&column, &FileBackend::default(), 100).unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroIndexConstructionFailed);
        assert!(err.message().contains("no data file"));
    }

    #[test]
    fn test_positioned_reads() {
        let temp_dir = TempDir::new().unwrap();
        DataDirColumn::write_values(temp_dir.path(), "a", ColumnType::Int, &[1i32, 2]).unwrap();
        let column = DataDirColumn::new(temp_dir.path(), "a", ColumnType::Int, 2).with_bounds(1.0, 2.0);

        let store = fill_for_test(&column);
        assert_eq!(rows_of(&store, 2), vec![1]);
    }

    fn fill_for_test(column: &DataDirColumn) -> IndexStore {
        let mut store = IndexStore::new(column.row_count());
        let mask = column.null_mask().unwrap();
        fill_from_file::<i32>(&mut store, column, &FileBackend::default(), &mask, 100).unwrap();
        store.adjust_sizes();
        store
    }
}
