//! Bit vector with an explicit universe length

use std::io::{self, Write};
use std::ops::BitOrAssign;

use roaring::RoaringBitmap;

use super::index_set::IndexSets;

/// A compressed set of row positions over a universe of `size()` rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BitVector {
    bits: RoaringBitmap,
    size: u32,
}

impl BitVector {
    /// Creates an empty bit vector describing `size` rows.
    pub fn new(size: u32) -> Self {
        Self {
            bits: RoaringBitmap::new(),
            size,
        }
    }

    /// Creates a bit vector with every position in `0..size` set.
    pub fn ones(size: u32) -> Self {
        let mut bits = RoaringBitmap::new();
        bits.insert_range(0..size);
        Self { bits, size }
    }

    /// Creates a bit vector from set positions. Positions at or beyond
    /// `size` grow the universe.
    pub fn from_positions<I: IntoIterator<Item = u32>>(size: u32, positions: I) -> Self {
        let mut bv = Self::new(size);
        for pos in positions {
            bv.set_bit(pos);
        }
        bv
    }

    /// Sets the bit at `pos`, extending the universe if needed.
    pub fn set_bit(&mut self, pos: u32) {
        self.bits.insert(pos);
        if pos >= self.size {
            self.size = pos.saturating_add(1);
        }
    }

    /// Returns whether `pos` is set.
    pub fn contains(&self, pos: u32) -> bool {
        self.bits.contains(pos)
    }

    /// Number of set positions.
    pub fn cnt(&self) -> u64 {
        self.bits.len()
    }

    /// Universe length.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Returns true if no position is set.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Unions `other` into `self`. The universe becomes the larger of the two.
    pub fn union_with(&mut self, other: &BitVector) {
        self.bits |= &other.bits;
        self.size = self.size.max(other.size);
    }

    /// Concatenates `other` after the current universe: every position of
    /// `other` is shifted by `self.size()`.
    ///
    /// Returns `None` if the combined universe would overflow a `u32`.
    pub fn append(&mut self, other: &BitVector) -> Option<()> {
        let base = self.size;
        let total = base.checked_add(other.size)?;
        self.bits.extend(other.bits.iter().map(|p| p + base));
        self.size = total;
        Some(())
    }

    /// Keeps the first `keep` rows and pads (or truncates) the universe to
    /// `total` rows. Padding rows are unset.
    pub fn adjust_size(&mut self, keep: u32, total: u32) {
        let cut = keep.min(total);
        self.bits.remove_range(cut..);
        self.size = total;
    }

    /// Sets the universe length, dropping positions beyond it.
    pub fn set_size(&mut self, size: u32) {
        self.adjust_size(size, size);
    }

    /// Iterates set positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter()
    }

    /// Iterates set positions grouped as runs and explicit index lists.
    pub fn index_sets(&self) -> IndexSets<'_> {
        IndexSets::new(self.bits.iter())
    }

    /// Number of bytes `serialize_into` writes.
    pub fn serialized_size(&self) -> usize {
        self.bits.serialized_size()
    }

    /// Writes the set positions in the portable roaring format.
    pub fn serialize_into<W: Write>(&self, writer: W) -> io::Result<()> {
        self.bits.serialize_into(writer)
    }

    /// Reads a bit vector written by `serialize_into`, sized to `size` rows.
    pub fn deserialize(bytes: &[u8], size: u32) -> io::Result<Self> {
        let bits = RoaringBitmap::deserialize_from(bytes)?;
        let mut bv = Self { bits, size };
        bv.set_size(size);
        Ok(bv)
    }
}

impl BitOrAssign<&BitVector> for BitVector {
    fn bitor_assign(&mut self, rhs: &BitVector) {
        self.union_with(rhs);
    }
}
