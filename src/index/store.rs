//! In-memory bins of a direct index
//!
//! Bin `v` holds the rows whose value is `v`. A bin decoded from storage may
//! stay unmaterialized (only its byte range is known) until it is activated.

use std::ops::Range;
use std::path::PathBuf;

use crate::bitvector::BitVector;
use crate::storage::{FileHandle, SharedBuffer};

use super::errors::{IndexError, IndexResult};

/// One bin of the index.
#[derive(Debug, Clone, PartialEq)]
pub enum Bin {
    /// Bit vector in memory, sized to the index row count.
    Materialized(BitVector),
    /// Serialized bytes at `range` in the backing storage.
    Unmaterialized { range: Range<u64> },
}

impl Bin {
    pub fn is_materialized(&self) -> bool {
        matches!(self, Bin::Materialized(_))
    }

    pub fn bitvector(&self) -> Option<&BitVector> {
        match self {
            Bin::Materialized(bv) => Some(bv),
            Bin::Unmaterialized { .. } => None,
        }
    }
}

/// Where unmaterialized bins are read from.
#[derive(Debug, Clone)]
pub enum Backing {
    /// A shared buffer holding the whole serialized index.
    Buffer(SharedBuffer),
    /// The index file, read with positioned reads.
    File(PathBuf),
}

/// Byte width of each entry in the offset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetWidth {
    Narrow = 4,
    Wide = 8,
}

impl OffsetWidth {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            4 => Some(OffsetWidth::Narrow),
            8 => Some(OffsetWidth::Wide),
            _ => None,
        }
    }

    pub fn bytes(&self) -> usize {
        *self as usize
    }
}

/// Absolute byte offsets of every bin plus the end of the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetTable {
    width: OffsetWidth,
    offsets: Vec<u64>,
}

impl OffsetTable {
    /// `offsets` must hold `bin_count + 1` non-decreasing entries.
    pub fn new(width: OffsetWidth, offsets: Vec<u64>) -> Self {
        Self { width, offsets }
    }

    pub fn width(&self) -> OffsetWidth {
        self.width
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn bin_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Byte range of bin `i`.
    pub fn bin_range(&self, i: usize) -> Option<Range<u64>> {
        Some(*self.offsets.get(i)?..*self.offsets.get(i + 1)?)
    }

    /// Bytes occupied by bins `lo..hi`.
    pub fn span(&self, lo: usize, hi: usize) -> u64 {
        match (self.offsets.get(lo), self.offsets.get(hi)) {
            (Some(start), Some(end)) if end > start => end - start,
            _ => 0,
        }
    }

    /// Bytes occupied by all bins.
    pub fn total(&self) -> u64 {
        self.span(0, self.bin_count())
    }
}

/// Result of an activation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Activation {
    /// Bins that changed from unmaterialized to materialized
    pub bins: usize,
    /// Serialized bytes decoded
    pub bytes: u64,
}

/// The bins of one direct index.
///
/// Every materialized bin is sized to `row_count`, and the bins are
/// pairwise disjoint.
#[derive(Debug, Clone, Default)]
pub struct IndexStore {
    bins: Vec<Bin>,
    row_count: u32,
    offsets: Option<OffsetTable>,
    backing: Option<Backing>,
}

impl IndexStore {
    /// Creates a store with no bins.
    pub fn new(row_count: u32) -> Self {
        Self {
            row_count,
            ..Self::default()
        }
    }

    /// Creates a store from fully materialized bins.
    pub fn from_bitvectors(row_count: u32, bins: Vec<BitVector>) -> Self {
        let bins = bins
            .into_iter()
            .map(|mut bv| {
                bv.set_size(row_count);
                Bin::Materialized(bv)
            })
            .collect();
        Self {
            bins,
            row_count,
            offsets: None,
            backing: None,
        }
    }

    pub(crate) fn from_parts(
        row_count: u32,
        bins: Vec<Bin>,
        offsets: Option<OffsetTable>,
        backing: Option<Backing>,
    ) -> Self {
        Self {
            bins,
            row_count,
            offsets,
            backing,
        }
    }

    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    pub fn bin(&self, i: usize) -> Option<&Bin> {
        self.bins.get(i)
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Bit vector of bin `i`, if it is materialized.
    pub fn bitvector(&self, i: usize) -> Option<&BitVector> {
        self.bins.get(i)?.bitvector()
    }

    pub(crate) fn bitvector_mut(&mut self, i: usize) -> Option<&mut BitVector> {
        match self.bins.get_mut(i)? {
            Bin::Materialized(bv) => Some(bv),
            Bin::Unmaterialized { .. } => None,
        }
    }

    pub fn is_materialized(&self, i: usize) -> bool {
        self.bins.get(i).map_or(false, Bin::is_materialized)
    }

    pub fn materialized_count(&self) -> usize {
        self.bins.iter().filter(|b| b.is_materialized()).count()
    }

    pub fn offsets(&self) -> Option<&OffsetTable> {
        self.offsets.as_ref()
    }

    pub fn backing(&self) -> Option<&Backing> {
        self.backing.as_ref()
    }

    /// Extends the store to `n` bins with empty bit vectors.
    pub fn grow_to(&mut self, n: usize) {
        while self.bins.len() < n {
            self.bins.push(Bin::Materialized(BitVector::new(self.row_count)));
        }
    }

    /// Sets `row` in bin `bin`, growing the store as needed.
    pub(crate) fn set_row(&mut self, bin: usize, row: u32) -> IndexResult<()> {
        self.grow_to(bin + 1);
        match self.bitvector_mut(bin) {
            Some(bv) => {
                bv.set_bit(row);
                Ok(())
            }
            None => Err(IndexError::construction(format!(
                "bin {} is not materialized",
                bin
            ))),
        }
    }

    /// Resizes every materialized bin to the row count.
    pub fn adjust_sizes(&mut self) {
        let rows = self.row_count;
        for bin in &mut self.bins {
            if let Bin::Materialized(bv) = bin {
                bv.set_size(rows);
            }
        }
    }

    pub(crate) fn set_row_count(&mut self, row_count: u32) {
        self.row_count = row_count;
    }

    pub(crate) fn set_offsets(&mut self, offsets: Option<OffsetTable>) {
        self.offsets = offsets;
    }

    /// Drops the backing storage. Only valid once every bin is materialized.
    pub(crate) fn clear_backing(&mut self) {
        self.backing = None;
    }

    /// Materializes bin `i`.
    pub fn activate(&mut self, i: usize) -> IndexResult<Activation> {
        self.activate_range(i, i + 1)
    }

    /// Materializes every bin.
    pub fn activate_all(&mut self) -> IndexResult<Activation> {
        self.activate_range(0, self.bins.len())
    }

    /// Materializes bins `lo..hi`.
    ///
    /// With file backing the covering byte span is read in one positioned
    /// read. A bin whose bytes cannot be read or decoded stays
    /// unmaterialized and the error is returned.
    pub fn activate_range(&mut self, lo: usize, hi: usize) -> IndexResult<Activation> {
        let hi = hi.min(self.bins.len());
        if lo >= hi {
            return Ok(Activation::default());
        }

        let pending: Vec<(usize, Range<u64>)> = self.bins[lo..hi]
            .iter()
            .enumerate()
            .filter_map(|(k, bin)| match bin {
                Bin::Unmaterialized { range } => Some((lo + k, range.clone())),
                Bin::Materialized(_) => None,
            })
            .collect();
        if pending.is_empty() {
            return Ok(Activation::default());
        }

        let span_start = pending.iter().map(|(_, r)| r.start).min().unwrap_or(0);
        let span_end = pending.iter().map(|(_, r)| r.end).max().unwrap_or(0);

        let loaded: SharedBuffer;
        let (bytes, base): (&[u8], u64) = match &self.backing {
            Some(Backing::Buffer(buf)) => (buf.as_slice(), 0),
            Some(Backing::File(path)) => {
                let len = usize::try_from(span_end - span_start).map_err(|_| {
                    IndexError::io_read(format!("bin span of {} bytes", span_end - span_start))
                })?;
                let mut data = vec![0u8; len];
                let mut handle = FileHandle::open_read(path)?;
                handle.read_exact_at(span_start, &mut data)?;
                loaded = SharedBuffer::from_vec(data);
                (loaded.as_slice(), span_start)
            }
            None => {
                return Err(IndexError::io_read(format!(
                    "bins {}..{} have no backing storage",
                    lo, hi
                )))
            }
        };

        let rows = self.row_count;
        let mut activation = Activation::default();
        for (i, range) in pending {
            let bv = decode_bin(bytes, base, &range, rows)
                .map_err(|e| e.with_details(format!("bin {} at {}..{}", i, range.start, range.end)))?;
            activation.bins += 1;
            activation.bytes += range.end - range.start;
            self.bins[i] = Bin::Materialized(bv);
        }
        Ok(activation)
    }
}

fn decode_bin(bytes: &[u8], base: u64, range: &Range<u64>, rows: u32) -> IndexResult<BitVector> {
    if range.start == range.end {
        return Ok(BitVector::new(rows));
    }
    let slice = range
        .start
        .checked_sub(base)
        .zip(range.end.checked_sub(base))
        .and_then(|(s, e)| bytes.get(usize::try_from(s).ok()?..usize::try_from(e).ok()?))
        .ok_or_else(|| IndexError::truncated("bin payload", range.end, base + bytes.len() as u64))?;
    BitVector::deserialize(slice, rows)
        .map_err(|e| IndexError::format("invalid bin payload").with_source(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn serialized(bv: &BitVector) -> Vec<u8> {
        let mut out = Vec::new();
        bv.serialize_into(&mut out).unwrap();
        out
    }

    /// Two bins laid out back to back after an 8-byte prefix.
    fn lazy_layout() -> (Vec<u8>, Vec<Bin>) {
        let a = serialized(&BitVector::from_positions(6, [0, 3]));
        let b = serialized(&BitVector::from_positions(6, [5]));
        let mut bytes = vec![0u8; 8];
        let a_start = bytes.len() as u64;
        bytes.extend_from_slice(&a);
        let b_start = bytes.len() as u64;
        bytes.extend_from_slice(&b);
        let end = bytes.len() as u64;
        let bins = vec![
            Bin::Unmaterialized { range: a_start..b_start },
            Bin::Unmaterialized { range: b_start..b_start },
            Bin::Unmaterialized { range: b_start..end },
        ];
        (bytes, bins)
    }

    #[test]
    fn test_grow_and_set() {
        let mut store = IndexStore::new(4);
        store.set_row(3, 1).unwrap();
        store.set_row(0, 2).unwrap();
        assert_eq!(store.bin_count(), 4);
        assert!(store.bitvector(3).unwrap().contains(1));
        assert_eq!(store.bitvector(1).unwrap().cnt(), 0);
        assert_eq!(store.materialized_count(), 4);
    }

    #[test]
    fn test_adjust_sizes() {
        let mut store = IndexStore::new(2);
        store.set_row(0, 7).unwrap();
        assert_eq!(store.bitvector(0).unwrap().size(), 8);
        store.adjust_sizes();
        assert_eq!(store.bitvector(0).unwrap().size(), 2);
        assert_eq!(store.bitvector(0).unwrap().cnt(), 0);
    }

    #[test]
    fn test_offset_table() {
        let table = OffsetTable::new(OffsetWidth::Narrow, vec![28, 40, 40, 52]);
        assert_eq!(table.bin_count(), 3);
        assert_eq!(table.bin_range(1), Some(40..40));
        assert_eq!(table.span(0, 2), 12);
        assert_eq!(table.total(), 24);
        assert_eq!(table.bin_range(3), None);
        assert_eq!(OffsetWidth::from_byte(8), Some(OffsetWidth::Wide));
        assert_eq!(OffsetWidth::from_byte(2), None);
    }

    #[test]
    fn test_activate_from_buffer() {
        let (bytes, bins) = lazy_layout();
        let backing = Backing::Buffer(SharedBuffer::from_vec(bytes));
        let mut store = IndexStore::from_parts(6, bins, None, Some(backing));
        assert_eq!(store.materialized_count(), 0);
        assert!(store.bitvector(0).is_none());

        let activation = store.activate(2).unwrap();
        assert_eq!(activation.bins, 1);
        assert!(store.is_materialized(2));
        assert!(!store.is_materialized(0));
        assert!(store.bitvector(2).unwrap().contains(5));

        store.activate_all().unwrap();
        assert_eq!(store.materialized_count(), 3);
        assert_eq!(store.bitvector(0).unwrap().cnt(), 2);
        assert_eq!(store.bitvector(1).unwrap().size(), 6);
    }

    #[test]
    fn test_activate_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bins");
        let (bytes, bins) = lazy_layout();
        fs::write(&path, &bytes).unwrap();

        let mut store = IndexStore::from_parts(6, bins, None, Some(Backing::File(path)));
        let activation = store.activate_range(0, 3).unwrap();
        assert_eq!(activation.bins, 3);
        assert_eq!(activation.bytes, bytes.len() as u64 - 8);
        assert!(store.bitvector(0).unwrap().contains(3));
    }

    #[test]
    fn test_failed_read_leaves_bin_unmaterialized() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bins");
        let (bytes, bins) = lazy_layout();
        fs::write(&path, &bytes[..10]).unwrap();

        let mut store = IndexStore::from_parts(6, bins, None, Some(Backing::File(path)));
        assert!(store.activate(2).is_err());
        assert!(!store.is_materialized(2));
    }

    #[test]
    fn test_garbage_payload_is_format_error() {
        let bins = vec![Bin::Unmaterialized { range: 0..4 }];
        let backing = Backing::Buffer(SharedBuffer::from_vec(b"junk".to_vec()));
        let mut store = IndexStore::from_parts(3, bins, None, Some(backing));
        let err = store.activate(0).unwrap_err();
        assert!(err.is_format());
        assert!(!store.is_materialized(0));
    }

    #[test]
    fn test_missing_backing() {
        let bins = vec![Bin::Unmaterialized { range: 0..4 }];
        let mut store = IndexStore::from_parts(3, bins, None, None);
        assert!(store.activate_all().is_err());
    }
}
