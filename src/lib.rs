//! aerobitmap - equality-encoded bitmap indexes for integer columns
//!
//! A [`DirectIndex`](index::DirectIndex) keeps one compressed bit vector
//! per column value. Range and membership queries are answered exactly by
//! unioning a contiguous run of bins.

pub mod bitvector;
pub mod column;
pub mod config;
pub mod index;
pub mod observability;
pub mod storage;
