//! Direct bitmap index
//!
//! One bin per integer value `v`, holding the rows whose value is `v`.
//! Bins are pairwise disjoint and their union is the set of valid rows.
//!
//! # Lifecycle
//!
//! - Build: read the column once and set one bit per valid row
//! - Serialize: header, offset table, then every bin in order
//! - Deserialize: read the offset table, activate bins on demand
//! - Append: concatenate a partial index for new rows, or rebuild
//!
//! # Invariants
//!
//! - Every materialized bin is sized to the row count
//! - A row is set in at most one bin
//! - Estimates are exact: `lower == upper` whenever bins can be read

mod append;
mod builder;
pub mod codec;
mod direct;
mod errors;
mod evaluator;
mod locate;
mod store;

pub use append::{merge_partial, AppendKind, AppendOutcome};
pub use builder::{build_store, BuildPath, BuildReport};
pub use codec::EncodeSummary;
pub use direct::{index_file_name, DirectIndex, IndexEnv};
pub use errors::{IndexError, IndexErrorCode, IndexResult};
pub use evaluator::{
    count_continuous, discrete_bins, estimate_continuous, estimate_cost, estimate_cost_discrete,
    estimate_discrete, evaluate_continuous, evaluate_discrete, undecidable, Estimate, Query,
};
pub use locate::{locate, BinRange, CompareOp, RangeDescriptor};
pub use store::{Activation, Backing, Bin, IndexStore, OffsetTable, OffsetWidth};
