//! Run-grouped iteration over set positions
//!
//! Null masks are mostly long runs of valid rows broken by a few nulls.
//! Streaming them as runs lets construction read contiguous values without
//! a lookup per row; short stretches are batched into explicit index lists.

use std::iter::Peekable;

/// Runs shorter than this are folded into an index list.
const MIN_RUN: u32 = 32;

/// Upper bound on the length of one explicit index list.
const MAX_LIST: usize = 1024;

/// One group of set positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSet {
    /// Every position in `start..end` is set.
    Range { start: u32, end: u32 },
    /// Isolated positions, ascending.
    Indices(Vec<u32>),
}

impl IndexSet {
    /// Number of positions in this group.
    pub fn len(&self) -> usize {
        match self {
            IndexSet::Range { start, end } => (end - start) as usize,
            IndexSet::Indices(list) => list.len(),
        }
    }

    /// Returns true if the group holds no positions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Iterator produced by [`BitVector::index_sets`](super::BitVector::index_sets).
pub struct IndexSets<'a> {
    positions: Peekable<roaring::bitmap::Iter<'a>>,
    pending: Option<(u32, u32)>,
}

impl<'a> IndexSets<'a> {
    pub(crate) fn new(positions: roaring::bitmap::Iter<'a>) -> Self {
        Self {
            positions: positions.peekable(),
            pending: None,
        }
    }

    /// Next maximal run of consecutive positions as `[start, end)`.
    fn next_run(&mut self) -> Option<(u32, u32)> {
        if let Some(run) = self.pending.take() {
            return Some(run);
        }
        let start = self.positions.next()?;
        let mut end = start.saturating_add(1);
        while end < u32::MAX && self.positions.peek() == Some(&end) {
            self.positions.next();
            end += 1;
        }
        Some((start, end))
    }
}

impl Iterator for IndexSets<'_> {
    type Item = IndexSet;

    fn next(&mut self) -> Option<IndexSet> {
        let (start, end) = self.next_run()?;
        if end - start >= MIN_RUN {
            return Some(IndexSet::Range { start, end });
        }

        let mut list: Vec<u32> = (start..end).collect();
        while list.len() < MAX_LIST {
            match self.next_run() {
                None => break,
                Some((s, e)) if e - s >= MIN_RUN => {
                    self.pending = Some((s, e));
                    break;
                }
                Some((s, e)) => list.extend(s..e),
            }
        }
        Some(IndexSet::Indices(list))
    }
}
