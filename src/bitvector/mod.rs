//! Compressed bit vectors for aerobitmap
//!
//! A bit vector is an ordered set of row positions plus a logical universe
//! length (the number of rows it describes). Storage of the set positions is
//! delegated to a roaring bitmap; this module only adds the universe length
//! and the operations the direct index relies on.
//!
//! # Invariants
//!
//! - Every set position is strictly below `size()`
//! - Serialized form carries positions only; the owner supplies the universe

mod index_set;
mod vector;

pub use index_set::{IndexSet, IndexSets};
pub use vector::BitVector;
