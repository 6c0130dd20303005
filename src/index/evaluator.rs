//! Query evaluation over the bins of a direct index
//!
//! Equality bins answer range and membership queries exactly: a row either
//! is or is not in a bin, so there is never an undecidable set and every
//! estimate has `lower == upper`.

use crate::bitvector::BitVector;

use super::errors::IndexResult;
use super::locate::{locate, RangeDescriptor};
use super::store::IndexStore;

/// A query against one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// A range predicate
    Continuous(RangeDescriptor),
    /// Membership in a finite set of values
    Discrete(Vec<f64>),
}

/// Bounds on the number of matching rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub lower: u64,
    pub upper: u64,
}

impl Estimate {
    pub fn exact(count: u64) -> Self {
        Self {
            lower: count,
            upper: count,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.lower == self.upper
    }
}

/// Bins named by `values`: integral, within `0..bin_count`, ascending and
/// without duplicates.
pub fn discrete_bins(values: &[f64], bin_count: usize) -> Vec<usize> {
    let mut bins: Vec<usize> = values
        .iter()
        .filter(|v| v.fract() == 0.0 && **v >= 0.0 && **v < bin_count as f64)
        .map(|v| *v as usize)
        .collect();
    bins.sort_unstable();
    bins.dedup();
    bins
}

/// Union of the bins matching `d`, sized to the row count.
pub fn evaluate_continuous(store: &mut IndexStore, d: &RangeDescriptor) -> IndexResult<BitVector> {
    let range = locate(d, store.bin_count());
    store.activate_range(range.lo, range.hi)?;
    let mut result = BitVector::new(store.row_count());
    for i in range.lo..range.hi {
        if let Some(bv) = store.bitvector(i) {
            result |= bv;
        }
    }
    Ok(result)
}

/// Number of rows matching `d`, without building the union.
pub fn count_continuous(store: &mut IndexStore, d: &RangeDescriptor) -> IndexResult<u64> {
    let range = locate(d, store.bin_count());
    store.activate_range(range.lo, range.hi)?;
    Ok((range.lo..range.hi)
        .filter_map(|i| store.bitvector(i))
        .map(BitVector::cnt)
        .sum())
}

/// Exact count of rows matching `d`. If bins cannot be read the estimate
/// widens to every row instead of failing.
pub fn estimate_continuous(store: &mut IndexStore, d: &RangeDescriptor) -> Estimate {
    match count_continuous(store, d) {
        Ok(count) => Estimate::exact(count),
        Err(_) => Estimate {
            lower: 0,
            upper: store.row_count() as u64,
        },
    }
}

/// Union of the bins at `values`.
pub fn evaluate_discrete(store: &mut IndexStore, values: &[f64]) -> IndexResult<BitVector> {
    let mut result = BitVector::new(store.row_count());
    for i in discrete_bins(values, store.bin_count()) {
        store.activate(i)?;
        if let Some(bv) = store.bitvector(i) {
            result |= bv;
        }
    }
    Ok(result)
}

/// Exact count of rows whose value is in `values`; widens on read failure.
pub fn estimate_discrete(store: &mut IndexStore, values: &[f64]) -> Estimate {
    let mut count = 0;
    for i in discrete_bins(values, store.bin_count()) {
        if store.activate(i).is_err() {
            return Estimate {
                lower: 0,
                upper: store.row_count() as u64,
            };
        }
        count += store.bitvector(i).map_or(0, BitVector::cnt);
    }
    Estimate::exact(count)
}

/// Approximate bytes read to answer `d`.
///
/// With an offset table this is the byte span of the matching bins, or of
/// their complement when that is smaller. Without one the raw column must
/// be scanned: `element_size * row_count`.
pub fn estimate_cost(store: &IndexStore, d: &RangeDescriptor, element_size: usize) -> f64 {
    let range = locate(d, store.bin_count());
    if range.is_empty() {
        return 0.0;
    }
    match store.offsets() {
        Some(table) if table.bin_count() >= store.bin_count() => {
            let total = table.total();
            let mid = table.span(range.lo, range.hi);
            if total / 2 >= mid {
                mid as f64
            } else {
                (total - mid) as f64
            }
        }
        _ => {
            let element_size = if element_size > 0 { element_size } else { 4 };
            element_size as f64 * store.row_count() as f64
        }
    }
}

/// Bytes spanned by the bins at `values`; 0 without an offset table.
pub fn estimate_cost_discrete(store: &IndexStore, values: &[f64]) -> f64 {
    match store.offsets() {
        Some(table) => discrete_bins(values, store.bin_count())
            .into_iter()
            .map(|i| table.span(i, i + 1) as f64)
            .sum(),
        None => 0.0,
    }
}

/// Fraction of rows the index cannot decide for `d`.
pub fn undecidable(_d: &RangeDescriptor) -> f64 {
    0.0
}
