//! Index File Tests
//!
//! Tests for the on-disk format:
//! - Header and offset table layout
//! - 4-byte and 8-byte offsets decode to the same bins
//! - Mapped files activate bins lazily
//! - Corrupt files are rejected and evicted
//! - Rewriting a file leaves lazily mapped readers of the old one intact

use std::fs;
use std::path::Path;

use aerobitmap::column::MemoryColumn;
use aerobitmap::config::IndexConfig;
use aerobitmap::index::{
    codec, CompareOp, DirectIndex, IndexEnv, IndexErrorCode, OffsetWidth, Query, RangeDescriptor,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn random_values(seed: u64, rows: usize, max: u16) -> Vec<u16> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rows).map(|_| rng.gen_range(0..max)).collect()
}

fn build(values: &[u16], env: &IndexEnv) -> DirectIndex {
    DirectIndex::build(Box::new(MemoryColumn::new("a", values)), env).unwrap()
}

fn open(values: &[u16], path: &Path, env: &IndexEnv) -> DirectIndex {
    DirectIndex::open(Box::new(MemoryColumn::new("a", values)), path, env).unwrap()
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn queries() -> Vec<Query> {
    vec![
        Query::Continuous(RangeDescriptor::all()),
        Query::Continuous(RangeDescriptor::lt(3.0)),
        Query::Continuous(RangeDescriptor::between(CompareOp::Lt, 4.5, CompareOp::Le, 20.0)),
        Query::Continuous(RangeDescriptor::eq(7.0)),
        Query::Discrete(vec![1.0, 9.0, 31.0]),
    ]
}

fn assert_same_answers(a: &mut DirectIndex, b: &mut DirectIndex) {
    assert_eq!(a.row_count(), b.row_count());
    assert_eq!(a.bin_count(), b.bin_count());
    for q in queries() {
        let left: Vec<u32> = a.evaluate(&q).unwrap().iter().collect();
        let right: Vec<u32> = b.evaluate(&q).unwrap().iter().collect();
        assert_eq!(left, right, "{:?}", q);
    }
}

// =============================================================================
// Layout Tests
// =============================================================================

/// Header, counts and offset table are laid out as documented.
#[test]
fn test_header_and_offsets() {
    let temp_dir = TempDir::new().unwrap();
    let env = IndexEnv::default();
    let values = random_values(1, 300, 12);
    let mut index = build(&values, &env);
    let path = index.serialize(temp_dir.path()).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..5], b"#IBIS");
    assert_eq!(bytes[5], 21);
    assert_eq!(bytes[6], 4);
    assert_eq!(bytes[7], 0);
    assert_eq!(read_u32(&bytes, 8), 300);

    let bins = read_u32(&bytes, 12) as usize;
    assert_eq!(bins, index.bin_count());
    let first = read_u32(&bytes, 16) as usize;
    assert_eq!(first, 16 + 4 * (bins + 1));
    let last = read_u32(&bytes, 16 + 4 * bins) as usize;
    assert_eq!(last, bytes.len());

    assert_eq!(codec::peek_header(&bytes).unwrap(), OffsetWidth::Narrow);
}

/// Forced 8-byte offsets decode to the same bins.
#[test]
fn test_wide_offsets_roundtrip() {
    let narrow_dir = TempDir::new().unwrap();
    let wide_dir = TempDir::new().unwrap();
    let values = random_values(2, 500, 40);

    let narrow_env = IndexEnv::default();
    let wide_env = IndexEnv::from_config(IndexConfig::default().with_large_offsets());

    let narrow_path = build(&values, &narrow_env).serialize(narrow_dir.path()).unwrap();
    let wide_path = build(&values, &wide_env).serialize(wide_dir.path()).unwrap();

    let wide_bytes = fs::read(&wide_path).unwrap();
    assert_eq!(wide_bytes[6], 8);
    let bins = read_u32(&wide_bytes, 12) as u64;
    let first = u64::from_le_bytes(wide_bytes[16..24].try_into().unwrap());
    assert_eq!(first, 16 + 8 * (bins + 1));

    let mut narrow = open(&values, &narrow_path, &narrow_env);
    let mut wide = open(&values, &wide_path, &narrow_env);
    assert_same_answers(&mut narrow, &mut wide);
}

/// An index without bins writes a table with a single offset.
#[test]
fn test_empty_index_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let env = IndexEnv::default();
    let mut index = build(&[], &env);
    assert_eq!(index.bin_count(), 0);

    let path = index.serialize(temp_dir.path()).unwrap();
    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 20);
    assert_eq!(read_u32(&bytes, 16), 20);

    let reopened = open(&[], &path, &env);
    assert_eq!(reopened.bin_count(), 0);
    assert_eq!(reopened.row_count(), 0);
}

// =============================================================================
// Activation Tests
// =============================================================================

/// A mapped index file activates only the bins a query touches.
#[test]
fn test_mapped_file_activates_lazily() {
    let temp_dir = TempDir::new().unwrap();
    let env = IndexEnv::default();
    let values = random_values(3, 20_000, 100);
    let path = build(&values, &env).serialize(temp_dir.path()).unwrap();
    assert!(fs::metadata(&path).unwrap().len() >= 4096);

    let mut index = open(&values, &path, &env);
    assert_eq!(index.store().materialized_count(), 0);

    let hits = index
        .evaluate(&Query::Continuous(RangeDescriptor::between(
            CompareOp::Le,
            10.0,
            CompareOp::Lt,
            15.0,
        )))
        .unwrap();
    let expected = values.iter().filter(|v| (10..15).contains(*v)).count() as u64;
    assert_eq!(hits.cnt(), expected);
    assert_eq!(index.store().materialized_count(), 5);
    assert_eq!(index.metrics().snapshot().bins_activated, 5);
}

/// Without mmap the file is read with positioned reads and answers the same.
#[test]
fn test_positioned_reads_match_mapped() {
    let temp_dir = TempDir::new().unwrap();
    let values = random_values(4, 20_000, 64);
    let mapped_env = IndexEnv::default();
    let read_env = IndexEnv::from_config(IndexConfig::default().without_mmap());
    let path = build(&values, &mapped_env).serialize(temp_dir.path()).unwrap();

    let mut mapped = open(&values, &path, &mapped_env);
    let mut read = open(&values, &path, &read_env);
    assert_eq!(read.store().materialized_count(), 0);
    assert_same_answers(&mut mapped, &mut read);
}

/// Rewriting an index file does not disturb a reader still activating bins
/// from the mapping of the previous version.
#[test]
fn test_rewrite_keeps_mapped_reader() {
    let temp_dir = TempDir::new().unwrap();
    let env = IndexEnv::from_config(IndexConfig::default().with_mmap_threshold(1));
    let values: Vec<u16> = (0..64).map(|i| i % 8).collect();
    let path = build(&values, &env).serialize(temp_dir.path()).unwrap();

    let mut reader = open(&values, &path, &env);
    assert_eq!(reader.store().materialized_count(), 0);

    // A different, shorter index for the same column replaces the file.
    let mut writer = build(&[0u16; 10], &env);
    assert_eq!(writer.serialize(temp_dir.path()).unwrap(), path);
    assert!(!temp_dir.path().join("a.idx.tmp").exists());

    let hits = reader
        .evaluate(&Query::Continuous(RangeDescriptor::eq(3.0)))
        .unwrap();
    assert_eq!(hits.cnt(), 8);
    assert_eq!(reader.bin_count(), 8);

    let reopened = open(&[0u16; 10], &path, &env);
    assert_eq!(reopened.row_count(), 10);
    assert_eq!(reopened.bin_count(), 1);
}

// =============================================================================
// Corruption Tests
// =============================================================================

/// A file with the wrong index kind is rejected and removed.
#[test]
fn test_wrong_kind_is_evicted() {
    let temp_dir = TempDir::new().unwrap();
    let env = IndexEnv::default();
    let values = random_values(5, 50, 8);
    let path = build(&values, &env).serialize(temp_dir.path()).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[5] = 20;
    fs::write(&path, &bytes).unwrap();

    let err = DirectIndex::open(Box::new(MemoryColumn::new("a", &values)), &path, &env).unwrap_err();
    assert_eq!(err.code(), IndexErrorCode::AeroIndexFormatInvalid);
    assert!(!path.exists());
    assert_eq!(env.metrics.snapshot().corrupt_files_evicted, 1);
}

/// A file cut short inside the offset table is rejected.
#[test]
fn test_truncated_table_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let env = IndexEnv::from_config(IndexConfig::default().without_mmap());
    let values = random_values(6, 50, 8);
    let path = build(&values, &env).serialize(temp_dir.path()).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..20]).unwrap();

    let err = DirectIndex::open(Box::new(MemoryColumn::new("a", &values)), &path, &env).unwrap_err();
    assert!(err.is_format());
    assert!(!path.exists());
}

/// A missing file is an I/O error and nothing is evicted.
#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let env = IndexEnv::default();
    let path = temp_dir.path().join("a.idx");
    let err = DirectIndex::open(Box::new(MemoryColumn::new("a", &[1u16])), &path, &env).unwrap_err();
    assert!(err.code().is_io());
    assert_eq!(env.metrics.snapshot().corrupt_files_evicted, 0);
}
