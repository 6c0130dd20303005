//! Column sources for index construction
//!
//! A column is a fixed-width array of little-endian integers plus a null
//! mask. The index reads it through the object-safe [`ColumnSource`] trait
//! and decodes values through [`IntegerValue`].
//!
//! # Invariants
//!
//! - `row_count()` is the partition row count; the value array may be longer
//!   and is truncated to it
//! - Rows outside the null mask are never indexed

mod data_dir;
mod memory;
mod source;
mod types;

pub use data_dir::DataDirColumn;
pub use memory::MemoryColumn;
pub use source::ColumnSource;
pub use types::{encode_values, value_bounds, ColumnType, IntegerValue};
