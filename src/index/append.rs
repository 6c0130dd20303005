//! Merging a partial index for appended rows into an existing index

use std::fmt;

use super::errors::{IndexError, IndexResult};
use super::store::IndexStore;

/// How an append was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendKind {
    /// The partial index was concatenated onto the existing bins.
    Merged,
    /// The existing index was empty; the partial index replaced it.
    Adopted,
    /// The index was rebuilt from the concatenated column.
    Rebuilt,
}

impl AppendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppendKind::Merged => "merged",
            AppendKind::Adopted => "adopted",
            AppendKind::Rebuilt => "rebuilt",
        }
    }
}

impl fmt::Display for AppendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub kind: AppendKind,
    pub rows_added: u32,
}

/// Folds `partial`, an index over `nnew` appended rows, into `target`, an
/// index over the first `nold` rows.
///
/// Bin `i` of the result is bin `i` of `target` followed by bin `i` of
/// `partial` shifted by `nold`; a bin missing on either side counts as
/// empty. When `nold` is 0 the partial index is adopted as is, along with
/// its offsets and backing storage.
///
/// On error `target` still describes the first `nold` rows.
pub fn merge_partial(
    target: &mut IndexStore,
    mut partial: IndexStore,
    nold: u32,
    nnew: u32,
) -> IndexResult<AppendKind> {
    if partial.row_count() != nnew {
        return Err(IndexError::merge_incompatible(format!(
            "partial index covers {} rows, expected {}",
            partial.row_count(),
            nnew
        )));
    }
    if target.row_count() != nold {
        return Err(IndexError::merge_incompatible(format!(
            "index covers {} rows, expected {}",
            target.row_count(),
            nold
        )));
    }
    if nold == 0 {
        *target = partial;
        return Ok(AppendKind::Adopted);
    }

    let total = nold.checked_add(nnew).ok_or_else(|| {
        IndexError::merge_incompatible(format!("{} + {} rows overflow", nold, nnew))
    })?;
    partial.activate_all()?;
    target.activate_all()?;

    let bin_count = target.bin_count().max(partial.bin_count());
    target.grow_to(bin_count);
    for i in 0..bin_count {
        let tail = partial.bitvector(i);
        let Some(bv) = target.bitvector_mut(i) else {
            return Err(IndexError::merge_incompatible(format!(
                "bin {} is not materialized",
                i
            )));
        };
        match tail {
            Some(tail) => {
                bv.adjust_size(nold, nold);
                bv.append(tail).ok_or_else(|| {
                    IndexError::merge_incompatible(format!("bin {} overflows", i))
                })?;
                bv.set_size(total);
            }
            None => bv.adjust_size(nold, total),
        }
    }

    target.set_row_count(total);
    target.set_offsets(None);
    target.clear_backing();
    Ok(AppendKind::Merged)
}
