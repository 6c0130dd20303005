//! In-memory column

use crate::bitvector::BitVector;
use crate::storage::{SharedBuffer, StorageBackend, StorageResult};

use super::source::ColumnSource;
use super::types::{encode_values, value_bounds, ColumnType, IntegerValue};

/// A column whose values are held in memory.
#[derive(Debug, Clone)]
pub struct MemoryColumn {
    name: String,
    column_type: ColumnType,
    values: SharedBuffer,
    row_count: u32,
    mask: BitVector,
    bounds: (f64, f64),
}

impl MemoryColumn {
    /// Creates a column with every row valid.
    pub fn new<T: IntegerValue>(name: &str, values: &[T]) -> Self {
        Self::from_raw(name, T::COLUMN_TYPE, encode_values(values), values.len())
    }

    /// Creates a dictionary-coded column from its codes.
    pub fn category(name: &str, codes: &[u32]) -> Self {
        Self::from_raw(name, ColumnType::Category, encode_values(codes), codes.len())
    }

    /// Creates a column from raw little-endian bytes.
    pub fn from_raw(name: &str, column_type: ColumnType, bytes: Vec<u8>, rows: usize) -> Self {
        let row_count = u32::try_from(rows).unwrap_or(u32::MAX);
        let mut column = Self {
            name: name.to_string(),
            column_type,
            values: SharedBuffer::from_vec(bytes),
            row_count,
            mask: BitVector::ones(row_count),
            bounds: (0.0, 0.0),
        };
        column.refresh_bounds();
        column
    }

    /// Marks `rows` as null.
    pub fn with_nulls(mut self, rows: &[u32]) -> Self {
        let keep: Vec<u32> = self.mask.iter().filter(|r| !rows.contains(r)).collect();
        self.mask = BitVector::from_positions(self.row_count, keep);
        self.refresh_bounds();
        self
    }

    /// Replaces the null mask.
    pub fn with_mask(mut self, mask: BitVector) -> Self {
        self.mask = mask;
        self.refresh_bounds();
        self
    }

    /// Overrides the computed value bounds.
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.bounds = (lower, upper);
        self
    }

    /// Declares a partition row count different from the number of values.
    pub fn with_row_count(mut self, row_count: u32) -> Self {
        self.row_count = row_count;
        self.mask.set_size(row_count);
        self.refresh_bounds();
        self
    }

    fn refresh_bounds(&mut self) {
        self.bounds = value_bounds(self.column_type, &self.values, &self.mask, self.row_count)
            .unwrap_or((0.0, 0.0));
    }
}

impl ColumnSource for MemoryColumn {
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
        Ok(self.mask.clone())
    }

    fn lower_bound(&self) -> f64 {
        self.bounds.0
    }

    fn upper_bound(&self) -> f64 {
        self.bounds.1
    }

    fn raw_values(&self, _backend: &dyn StorageBackend) -> StorageResult<SharedBuffer> {
        Ok(self.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_follow_mask() {
        let column = MemoryColumn::new("a", &[3u16, 50, 7, 1]);
        assert_eq!(column.column_type(), ColumnType::UShort);
        assert_eq!(column.row_count(), 4);
        assert_eq!((column.lower_bound(), column.upper_bound()), (1.0, 50.0));

        let column = column.with_nulls(&[1]);
        assert_eq!((column.lower_bound(), column.upper_bound()), (1.0, 7.0));
        assert!(!column.null_mask().unwrap().contains(1));
    }

    #[test]
    fn test_category_codes() {
        let column = MemoryColumn::category("tag", &[0, 2, 2]);
        assert_eq!(column.column_type(), ColumnType::Category);
        assert_eq!(column.upper_bound(), 2.0);
    }

    #[test]
    fn test_shorter_row_count() {
        let column = MemoryColumn::new("a", &[1u8, 2, 9]).with_row_count(2);
        assert_eq!(column.row_count(), 2);
        assert_eq!(column.upper_bound(), 2.0);
        assert_eq!(column.null_mask().unwrap().size(), 2);
    }
}
