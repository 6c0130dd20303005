//! Column element types and the integer value trait

use std::fmt;

use crate::bitvector::{BitVector, IndexSet};

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    /// Dictionary-coded strings; the codes are stored as u32.
    Category,
    Float,
    Double,
    Text,
}

impl ColumnType {
    /// Returns true for types a direct index can be built on.
    pub fn is_integer(&self) -> bool {
        !matches!(self, ColumnType::Float | ColumnType::Double | ColumnType::Text)
    }

    /// Bytes per stored value. Text has no fixed width and reports 0.
    pub fn element_size(&self) -> usize {
        match self {
            ColumnType::Byte | ColumnType::UByte => 1,
            ColumnType::Short | ColumnType::UShort => 2,
            ColumnType::Int | ColumnType::UInt | ColumnType::Category | ColumnType::Float => 4,
            ColumnType::Long | ColumnType::ULong | ColumnType::Double => 8,
            ColumnType::Text => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Byte => "BYTE",
            ColumnType::UByte => "UBYTE",
            ColumnType::Short => "SHORT",
            ColumnType::UShort => "USHORT",
            ColumnType::Int => "INT",
            ColumnType::UInt => "UINT",
            ColumnType::Long => "LONG",
            ColumnType::ULong => "ULONG",
            ColumnType::Category => "CATEGORY",
            ColumnType::Float => "FLOAT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Text => "TEXT",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fixed-width integer that can be read from a column file.
pub trait IntegerValue: Copy + PartialOrd + fmt::Debug + Send + Sync + 'static {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Column type that stores this integer natively.
    const COLUMN_TYPE: ColumnType;

    /// Decodes one little-endian value. `bytes` must be exactly `WIDTH` long.
    fn from_le_slice(bytes: &[u8]) -> Option<Self>;

    /// Bin number for this value, or `None` if it is negative or too large.
    fn to_bin(self) -> Option<u32>;

    fn to_f64(self) -> f64;

    /// Appends the little-endian encoding to `out`.
    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_integer_value {
    ($($ty:ty => $column:ident),* $(,)?) => {
        $(
            impl IntegerValue for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                const COLUMN_TYPE: ColumnType = ColumnType::$column;

                fn from_le_slice(bytes: &[u8]) -> Option<Self> {
                    bytes.try_into().ok().map(<$ty>::from_le_bytes)
                }

                fn to_bin(self) -> Option<u32> {
                    u32::try_from(self).ok()
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_integer_value! {
    i8 => Byte,
    u8 => UByte,
    i16 => Short,
    u16 => UShort,
    i32 => Int,
    u32 => UInt,
    i64 => Long,
    u64 => ULong,
}

/// Encodes `values` as a little-endian byte array.
pub fn encode_values<T: IntegerValue>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::WIDTH);
    for v in values {
        v.write_le(&mut out);
    }
    out
}

/// Minimum and maximum over the rows of `bytes` that are set in `mask`.
///
/// Returns `None` when no valid row has a value, or when `column_type` is
/// not an integer type.
pub fn value_bounds(
    column_type: ColumnType,
    bytes: &[u8],
    mask: &BitVector,
    rows: u32,
) -> Option<(f64, f64)> {
    match column_type {
        ColumnType::Byte => scan_bounds::<i8>(bytes, mask, rows),
        ColumnType::UByte => scan_bounds::<u8>(bytes, mask, rows),
        ColumnType::Short => scan_bounds::<i16>(bytes, mask, rows),
        ColumnType::UShort => scan_bounds::<u16>(bytes, mask, rows),
        ColumnType::Int => scan_bounds::<i32>(bytes, mask, rows),
        ColumnType::UInt | ColumnType::Category => scan_bounds::<u32>(bytes, mask, rows),
        ColumnType::Long => scan_bounds::<i64>(bytes, mask, rows),
        ColumnType::ULong => scan_bounds::<u64>(bytes, mask, rows),
        ColumnType::Float | ColumnType::Double | ColumnType::Text => None,
    }
}

fn scan_bounds<T: IntegerValue>(bytes: &[u8], mask: &BitVector, rows: u32) -> Option<(f64, f64)> {
    let available = (bytes.len() / T::WIDTH).min(rows as usize);
    let mut bounds: Option<(T, T)> = None;

    let mut visit = |row: usize| {
        let start = row * T::WIDTH;
        if let Some(v) = bytes
            .get(start..start + T::WIDTH)
            .and_then(T::from_le_slice)
        {
            bounds = Some(match bounds {
                None => (v, v),
                Some((lo, hi)) => (
                    if v < lo { v } else { lo },
                    if v > hi { v } else { hi },
                ),
            });
        }
    };

    for set in mask.index_sets() {
        match set {
            IndexSet::Range { start, end } => {
                let end = (end as usize).min(available);
                for row in start as usize..end {
                    visit(row);
                }
            }
            IndexSet::Indices(list) => {
                for row in list.into_iter().map(|r| r as usize) {
                    if row < available {
                        visit(row);
                    }
                }
            }
        }
    }

    bounds.map(|(lo, hi)| (lo.to_f64(), hi.to_f64()))
}
