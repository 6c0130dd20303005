//! The direct index of one column
//!
//! Owns the bins, the column they were built from, and the environment
//! (storage backend, configuration, counters) used to read and write them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bitvector::BitVector;
use crate::column::ColumnSource;
use crate::config::IndexConfig;
use crate::observability::{log_event, Event, Logger, MetricsRegistry, ObservationScope, Severity};
use crate::storage::{FileBackend, FileHandle, SharedBuffer, StorageBackend};

use super::append::{merge_partial, AppendKind, AppendOutcome};
use super::builder::{build_store, BuildPath};
use super::codec;
use super::errors::{IndexError, IndexResult};
use super::evaluator::{self, Estimate, Query};
use super::store::{Bin, IndexStore};

/// Storage backend, configuration and counters shared by indexes.
#[derive(Debug, Clone)]
pub struct IndexEnv {
    pub backend: Arc<dyn StorageBackend>,
    pub config: IndexConfig,
    pub metrics: Arc<MetricsRegistry>,
}

impl IndexEnv {
    pub fn new(backend: Arc<dyn StorageBackend>, config: IndexConfig) -> Self {
        Self {
            backend,
            config,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Local filesystem backend configured from `config`.
    pub fn from_config(config: IndexConfig) -> Self {
        let backend = Arc::new(FileBackend::new(config.mmap_threshold));
        Self::new(backend, config)
    }

    pub fn with_metrics(self, metrics: Arc<MetricsRegistry>) -> Self {
        Self { metrics, ..self }
    }
}

impl Default for IndexEnv {
    fn default() -> Self {
        Self::from_config(IndexConfig::default())
    }
}

/// Path of the index file for column `name` in `dir`.
pub fn index_file_name(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.idx", name))
}

/// Sibling of `path` that a new version is written to before it replaces
/// `path`.
fn temp_file_name(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes a new version of `path` with `write` and renames it into place.
///
/// The old file stays untouched until the new one is complete and synced,
/// and buffers already mapped from it keep their contents. On failure the
/// temporary file is removed and `path` is left as it was.
fn publish<T>(
    backend: &dyn StorageBackend,
    path: &Path,
    write: impl FnOnce(&mut FileHandle) -> IndexResult<T>,
) -> IndexResult<T> {
    let tmp = temp_file_name(path);
    backend.flush(&tmp);
    let mut handle = backend.open_write(&tmp)?;
    let written = write(&mut handle).and_then(|value| {
        handle.sync()?;
        Ok(value)
    });
    drop(handle);

    let published = written.and_then(|value| {
        backend.rename(&tmp, path)?;
        Ok(value)
    });
    if published.is_err() {
        let _ = backend.remove(&tmp);
    }
    published
}

/// Equality-encoded bitmap index over one integer column.
pub struct DirectIndex {
    column: Box<dyn ColumnSource>,
    env: IndexEnv,
    store: IndexStore,
    /// Index file the bins were loaded from, if any
    source_file: Option<PathBuf>,
}

impl DirectIndex {
    /// Builds the index from the column's values.
    pub fn build(column: Box<dyn ColumnSource>, env: &IndexEnv) -> IndexResult<Self> {
        let store = Self::build_for(column.as_ref(), env)?;
        Ok(Self::from_store(column, store, env))
    }

    /// Wraps an existing store.
    pub fn from_store(column: Box<dyn ColumnSource>, store: IndexStore, env: &IndexEnv) -> Self {
        Self {
            column,
            env: env.clone(),
            store,
            source_file: None,
        }
    }

    /// Loads the index for `column` from the file at `path`.
    pub fn open(column: Box<dyn ColumnSource>, path: &Path, env: &IndexEnv) -> IndexResult<Self> {
        let mut index = Self::from_store(column, IndexStore::new(0), env);
        index.deserialize(path)?;
        Ok(index)
    }

    fn build_for(column: &dyn ColumnSource, env: &IndexEnv) -> IndexResult<IndexStore> {
        let rows = column.row_count().to_string();
        let scope = ObservationScope::with_fields(
            "INDEX_BUILD",
            &[("column", column.name()), ("rows", rows.as_str())],
        );

        // A cached buffer may predate rows appended to the file in place.
        let data_file = column.data_file();
        if let Some(file) = &data_file {
            env.backend.flush(file);
        }
        let built = build_store(column, env.backend.as_ref(), env.config.max_bins);
        if let Some(file) = &data_file {
            env.backend.flush(file);
        }

        match built {
            Ok(report) => {
                env.metrics.increment_indexes_built();
                if report.path == BuildPath::Fallback {
                    env.metrics.increment_fallback_reads();
                }
                let bins = report.store.bin_count().to_string();
                scope.complete_with_fields(&[("bins", bins.as_str())]);
                Ok(report.store)
            }
            Err(e) => {
                env.metrics.increment_builds_failed();
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    pub fn column(&self) -> &dyn ColumnSource {
        self.column.as_ref()
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn env(&self) -> &IndexEnv {
        &self.env
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.env.metrics
    }

    pub fn row_count(&self) -> u32 {
        self.store.row_count()
    }

    pub fn bin_count(&self) -> usize {
        self.store.bin_count()
    }

    /// Index file the bins were loaded from, if any.
    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    fn record_activation(&self, before: usize) {
        let activated = self.store.materialized_count().saturating_sub(before);
        if activated > 0 {
            self.env.metrics.add_bins_activated(activated as u64);
            let bins = activated.to_string();
            log_event(
                Event::Activate,
                &[("bins", bins.as_str()), ("column", self.column.name())],
            );
        }
    }

    // ==================== Queries ====================

    /// Rows matching `query`.
    pub fn evaluate(&mut self, query: &Query) -> IndexResult<BitVector> {
        let before = self.store.materialized_count();
        let result = match query {
            Query::Continuous(d) => evaluator::evaluate_continuous(&mut self.store, d),
            Query::Discrete(values) => evaluator::evaluate_discrete(&mut self.store, values),
        };
        self.record_activation(before);

        let hits = result?;
        self.env.metrics.increment_queries_evaluated();
        if Logger::enabled(Severity::Trace) {
            let hits_str = hits.cnt().to_string();
            let query_str = describe(query);
            log_event(
                Event::QueryEvaluated,
                &[
                    ("column", self.column.name()),
                    ("hits", hits_str.as_str()),
                    ("query", query_str.as_str()),
                ],
            );
        }
        Ok(hits)
    }

    /// Number of matching rows. Exact unless bins cannot be read, in which
    /// case the bounds widen to every row.
    pub fn estimate(&mut self, query: &Query) -> Estimate {
        let before = self.store.materialized_count();
        let estimate = match query {
            Query::Continuous(d) => evaluator::estimate_continuous(&mut self.store, d),
            Query::Discrete(values) => evaluator::estimate_discrete(&mut self.store, values),
        };
        self.record_activation(before);
        estimate
    }

    /// Approximate bytes read to answer `query`.
    pub fn estimate_cost(&self, query: &Query) -> f64 {
        match query {
            Query::Continuous(d) => {
                evaluator::estimate_cost(&self.store, d, self.column.column_type().element_size())
            }
            Query::Discrete(values) => evaluator::estimate_cost_discrete(&self.store, values),
        }
    }

    /// Fraction of rows left undecided by `query`; always 0 for equality bins.
    pub fn undecidable(&self, query: &Query) -> f64 {
        match query {
            Query::Continuous(d) => evaluator::undecidable(d),
            Query::Discrete(_) => 0.0,
        }
    }

    // ==================== Append ====================

    /// Extends the index with `new_rows` rows appended to the column.
    ///
    /// `old_dir` holds the concatenated column, `new_dir` the appended rows
    /// and possibly their own index file. A compatible partial index is
    /// merged; anything else is rebuilt from `old_dir`. Nothing is written
    /// to storage except the removal of a corrupt partial index file.
    pub fn append(&mut self, old_dir: &Path, new_dir: &Path, new_rows: u32) -> IndexResult<AppendOutcome> {
        if old_dir.as_os_str().is_empty() || new_dir.as_os_str().is_empty() || new_rows == 0 {
            return Err(IndexError::invalid_argument(
                "append needs two directories and at least one new row",
            ));
        }

        let current = self.column.data_dir() == Some(old_dir);
        let nold = if current {
            self.column.row_count().checked_sub(new_rows).ok_or_else(|| {
                IndexError::invalid_argument(format!(
                    "column has {} rows, fewer than {} appended",
                    self.column.row_count(),
                    new_rows
                ))
            })?
        } else {
            self.store.row_count()
        };

        let nold_str = nold.to_string();
        let nnew_str = new_rows.to_string();
        let scope = ObservationScope::with_fields(
            "INDEX_APPEND",
            &[
                ("column", self.column.name()),
                ("new_rows", nnew_str.as_str()),
                ("old_rows", nold_str.as_str()),
            ],
        );

        if self.store.row_count() == nold {
            let partial_file = index_file_name(new_dir, self.column.name());
            if let Some(partial) = self.load_partial(&partial_file) {
                match merge_partial(&mut self.store, partial, nold, new_rows) {
                    Ok(kind) => {
                        self.source_file = None;
                        if !current {
                            if let Some(column) = self.column.relocate(old_dir) {
                                self.column = column;
                            }
                        }
                        self.record_append(kind);
                        scope.complete_with_fields(&[("kind", kind.as_str())]);
                        return Ok(AppendOutcome {
                            kind,
                            rows_added: new_rows,
                        });
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        log_event(
                            Event::MergeIncompatible,
                            &[("column", self.column.name()), ("reason", reason.as_str())],
                        );
                    }
                }
            }
        }

        match self.rebuild_from(old_dir, current) {
            Ok(()) => {
                self.record_append(AppendKind::Rebuilt);
                scope.complete_with_fields(&[("kind", AppendKind::Rebuilt.as_str())]);
                Ok(AppendOutcome {
                    kind: AppendKind::Rebuilt,
                    rows_added: new_rows,
                })
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    /// Like [`append`](Self::append), returning the rows added or a
    /// negative error code.
    pub fn append_code(&mut self, old_dir: &Path, new_dir: &Path, new_rows: u32) -> i64 {
        match self.append(old_dir, new_dir, new_rows) {
            Ok(outcome) => outcome.rows_added as i64,
            Err(e) => e.errno(),
        }
    }

    /// Loads the partial index file at `path` with every bin decoded. A file
    /// with a bad header, table or bin payload is evicted so a later attempt
    /// does not trip over it.
    fn load_partial(&self, path: &Path) -> Option<IndexStore> {
        if !self.env.backend.exists(path) {
            return None;
        }
        let buffer = self.env.backend.get_mapped_buffer(path).ok()?;
        let decoded = codec::peek_header(&buffer)
            .and_then(|_| codec::decode(buffer))
            .and_then(|mut store| {
                store.activate_all()?;
                Ok(store)
            });
        match decoded {
            Ok(store) => Some(store),
            Err(e) => {
                if e.is_format() {
                    self.evict(path, &e);
                }
                None
            }
        }
    }

    /// Builds from the column in `old_dir` into a fresh store and swaps it
    /// in only on success.
    fn rebuild_from(&mut self, old_dir: &Path, current: bool) -> IndexResult<()> {
        let relocated = if current {
            None
        } else {
            Some(self.column.relocate(old_dir).ok_or_else(|| {
                IndexError::invalid_argument(format!(
                    "no data for column {} in {}",
                    self.column.name(),
                    old_dir.display()
                ))
            })?)
        };

        let column = relocated.as_deref().unwrap_or(self.column.as_ref());
        let store = Self::build_for(column, &self.env)?;

        self.store = store;
        self.source_file = None;
        if let Some(column) = relocated {
            self.column = column;
        }
        Ok(())
    }

    fn record_append(&self, kind: AppendKind) {
        let event = match kind {
            AppendKind::Merged => {
                self.env.metrics.increment_appends_merged();
                Event::AppendMerged
            }
            AppendKind::Adopted => {
                self.env.metrics.increment_appends_adopted();
                Event::AppendAdopted
            }
            AppendKind::Rebuilt => {
                self.env.metrics.increment_appends_rebuilt();
                Event::AppendRebuild
            }
        };
        let rows = self.store.row_count().to_string();
        log_event(event, &[("column", self.column.name()), ("rows", rows.as_str())]);
    }

    fn evict(&self, path: &Path, cause: &IndexError) {
        self.env.backend.flush(path);
        let removed = self.env.backend.remove(path).is_ok();
        self.env.metrics.increment_corrupt_evicted();
        let path_str = path.display().to_string();
        let reason = cause.to_string();
        log_event(
            Event::CorruptEvicted,
            &[
                ("path", path_str.as_str()),
                ("reason", reason.as_str()),
                ("removed", if removed { "true" } else { "false" }),
            ],
        );
    }

    // ==================== Persistence ====================

    /// Writes the index to `<dir>/<column>.idx` and returns the path.
    ///
    /// Writing back to the file the index was loaded from is a no-op.
    pub fn serialize(&mut self, dir: &Path) -> IndexResult<PathBuf> {
        let path = index_file_name(dir, self.column.name());
        if self.source_file.as_deref() == Some(path.as_path()) {
            let path_str = path.display().to_string();
            log_event(Event::SerializeSkipped, &[("path", path_str.as_str())]);
            return Ok(path);
        }

        let path_str = path.display().to_string();
        let scope = ObservationScope::with_fields(
            "INDEX_SERIALIZE",
            &[("column", self.column.name()), ("path", path_str.as_str())],
        );
        match self.write_file(&path) {
            Ok(bytes) => {
                let bytes_str = bytes.to_string();
                scope.complete_with_fields(&[("bytes", bytes_str.as_str())]);
                Ok(path)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn write_file(&mut self, path: &Path) -> IndexResult<u64> {
        let before = self.store.materialized_count();
        let activated = self.store.activate_all();
        self.record_activation(before);
        activated?;
        // Every bin is in memory; the old file is no longer needed.
        self.store.clear_backing();

        let store = &self.store;
        let force_large = self.env.config.force_large_offsets;
        let summary = publish(self.env.backend.as_ref(), path, |handle| {
            codec::encode(store, handle, force_large)
        })?;

        self.env.metrics.add_bytes_written(summary.bytes_written);
        self.store.set_offsets(Some(summary.offsets));
        Ok(summary.bytes_written)
    }

    /// Like [`serialize`](Self::serialize), returning 0 or a negative error
    /// code.
    pub fn serialize_code(&mut self, dir: &Path) -> i64 {
        match self.serialize(dir) {
            Ok(_) => 0,
            Err(e) => e.errno(),
        }
    }

    /// Replaces the bins with the index stored at `path`.
    ///
    /// A file that does not decode is evicted and the current bins are kept.
    pub fn deserialize(&mut self, path: &Path) -> IndexResult<()> {
        let decoded = if self.env.config.use_mmap {
            self.env
                .backend
                .get_mapped_buffer(path)
                .map_err(IndexError::from)
                .and_then(|buffer| {
                    self.env.metrics.add_bytes_read(buffer.len() as u64);
                    codec::decode(buffer)
                })
        } else {
            codec::decode_file(path)
        };

        match decoded {
            Ok(store) => {
                self.install(store);
                self.source_file = Some(path.to_path_buf());
                let path_str = path.display().to_string();
                let bins = self.store.bin_count().to_string();
                log_event(
                    Event::Deserialize,
                    &[("bins", bins.as_str()), ("path", path_str.as_str())],
                );
                Ok(())
            }
            Err(e) => {
                if e.is_format() {
                    self.evict(path, &e);
                }
                Err(e)
            }
        }
    }

    /// Like [`deserialize`](Self::deserialize), returning 0 or a negative
    /// error code.
    pub fn deserialize_code(&mut self, path: &Path) -> i64 {
        match self.deserialize(path) {
            Ok(()) => 0,
            Err(e) => e.errno(),
        }
    }

    /// Replaces the bins with the index encoded in `buffer`.
    pub fn deserialize_buffer(&mut self, buffer: SharedBuffer) -> IndexResult<()> {
        self.env.metrics.add_bytes_read(buffer.len() as u64);
        let store = codec::decode(buffer)?;
        self.install(store);
        self.source_file = None;
        Ok(())
    }

    fn install(&mut self, store: IndexStore) {
        if store.row_count() != self.column.row_count() {
            let expected = self.column.row_count().to_string();
            let found = store.row_count().to_string();
            Logger::warn(
                "INDEX_ROW_COUNT_MISMATCH",
                &[
                    ("column", self.column.name()),
                    ("expected", expected.as_str()),
                    ("found", found.as_str()),
                ],
            );
        }
        self.store = store;
    }

    // ==================== Statistics ====================

    /// Smallest value an index bin can represent.
    pub fn min(&self) -> f64 {
        0.0
    }

    /// Largest bin number; -1 for an index without bins.
    pub fn max(&self) -> f64 {
        self.store.bin_count() as f64 - 1.0
    }

    /// Sum of all indexed values.
    pub fn sum(&mut self) -> IndexResult<f64> {
        Ok(self
            .bin_weights()?
            .iter()
            .enumerate()
            .map(|(v, &cnt)| v as f64 * cnt as f64)
            .sum())
    }

    /// Value of each bin.
    pub fn bin_boundaries(&self) -> Vec<f64> {
        (0..self.store.bin_count()).map(|v| v as f64).collect()
    }

    /// Row count of each bin.
    pub fn bin_weights(&mut self) -> IndexResult<Vec<u64>> {
        let before = self.store.materialized_count();
        let activated = self.store.activate_all();
        self.record_activation(before);
        activated?;
        Ok(self
            .store
            .bins()
            .iter()
            .map(|bin| bin.bitvector().map_or(0, BitVector::cnt))
            .collect())
    }

    /// For each value `v`, the number of rows with a value below `v`.
    pub fn cumulative_distribution(&mut self) -> IndexResult<(Vec<f64>, Vec<u64>)> {
        let weights = self.bin_weights()?;
        let mut below = 0;
        let counts = weights
            .iter()
            .map(|&cnt| {
                let c = below;
                below += cnt;
                c
            })
            .collect();
        Ok((self.bin_boundaries(), counts))
    }

    /// Row count per bin with the boundaries between bins: `counts[i]` rows
    /// fall in `[bounds[i-1], bounds[i])`.
    pub fn distribution(&mut self) -> IndexResult<(Vec<f64>, Vec<u64>)> {
        let counts = self.bin_weights()?;
        let bounds = (1..counts.len()).map(|v| v as f64).collect();
        Ok((bounds, counts))
    }
}

fn describe(query: &Query) -> String {
    match query {
        Query::Continuous(d) => d.to_string(),
        Query::Discrete(values) => format!("x in {:?}", values),
    }
}

impl fmt::Debug for DirectIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectIndex")
            .field("column", &self.column.name())
            .field("rows", &self.store.row_count())
            .field("bins", &self.store.bin_count())
            .field("materialized", &self.store.materialized_count())
            .field("source_file", &self.source_file)
            .finish()
    }
}

impl fmt::Display for DirectIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.store.bin_count();
        writeln!(
            f,
            "direct index for {} contains {} bit vector{}",
            self.column.name(),
            n,
            if n == 1 { "" } else { "s" }
        )?;
        for (i, bin) in self.store.bins().iter().enumerate() {
            match bin {
                Bin::Materialized(bv) => {
                    writeln!(f, "{}\t{}\t{}", i, bv.cnt(), bv.serialized_size())?
                }
                Bin::Unmaterialized { range } => {
                    writeln!(f, "{}\t-\t{}", i, range.end - range.start)?
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnType, DataDirColumn, MemoryColumn};
    use crate::index::locate::RangeDescriptor;
    use crate::index::IndexErrorCode;
    use std::fs;
    use tempfile::TempDir;

    fn memory_index(values: &[u8]) -> DirectIndex {
        let column = MemoryColumn::new("a", values);
        DirectIndex::build(Box::new(column), &IndexEnv::default()).unwrap()
    }

    #[test]
    fn test_build_and_query() {
        let mut index = memory_index(&[3, 1, 3, 0, 2, 3]);
        assert_eq!(index.bin_count(), 4);
        assert_eq!(index.metrics().snapshot().indexes_built, 1);

        let hits = index
            .evaluate(&Query::Continuous(RangeDescriptor::ge(3.0)))
            .unwrap();
        assert_eq!(hits.iter().collect::<Vec<_>>(), vec![0, 2, 5]);
        assert_eq!(
            index.estimate(&Query::Discrete(vec![1.0, 2.0])),
            Estimate::exact(2)
        );
        assert_eq!(index.undecidable(&Query::Continuous(RangeDescriptor::all())), 0.0);
        assert_eq!(index.metrics().snapshot().queries_evaluated, 1);
    }

    #[test]
    fn test_statistics() {
        let mut index = memory_index(&[3, 1, 3, 0, 2, 3]);
        assert_eq!(index.min(), 0.0);
        assert_eq!(index.max(), 3.0);
        assert_eq!(index.sum().unwrap(), 12.0);
        assert_eq!(index.bin_boundaries(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(index.bin_weights().unwrap(), vec![1, 1, 1, 3]);

        let (bounds, below) = index.cumulative_distribution().unwrap();
        assert_eq!(bounds, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(below, vec![0, 1, 2, 3]);

        let (bounds, counts) = index.distribution().unwrap();
        assert_eq!(bounds, vec![1.0, 2.0, 3.0]);
        assert_eq!(counts, vec![1, 1, 1, 3]);
    }

    #[test]
    fn test_display_lists_bins() {
        let index = memory_index(&[1, 1]);
        let text = index.to_string();
        assert!(text.starts_with("direct index for a contains 2 bit vectors"));
        assert!(text.contains("1\t2\t"));
    }

    #[test]
    fn test_serialize_and_open() {
        let temp_dir = TempDir::new().unwrap();
        let mut index = memory_index(&[2, 0, 2, 1]);
        let path = index.serialize(temp_dir.path()).unwrap();
        assert_eq!(path, temp_dir.path().join("a.idx"));
        assert!(index.store().offsets().is_some());
        assert!(index.metrics().snapshot().index_bytes_written > 0);

        let column = MemoryColumn::new("a", &[2u8, 0, 2, 1]);
        let mut reopened = DirectIndex::open(Box::new(column), &path, &IndexEnv::default()).unwrap();
        assert_eq!(reopened.source_file(), Some(path.as_path()));
        let hits = reopened
            .evaluate(&Query::Discrete(vec![2.0]))
            .unwrap();
        assert_eq!(hits.iter().collect::<Vec<_>>(), vec![0, 2]);

        // Writing back to the source file is a no-op.
        let before = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(reopened.serialize(temp_dir.path()).unwrap(), path);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn test_corrupt_file_is_evicted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.idx");
        fs::write(&path, b"#IBIX\x15\x04\x00garbage").unwrap();

        let mut index = memory_index(&[1, 0]);
        let err = index.deserialize(&path).unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroIndexFormatInvalid);
        assert!(!path.exists());
        assert_eq!(index.bin_count(), 2, "current bins are kept");
        assert_eq!(index.metrics().snapshot().corrupt_files_evicted, 1);
        assert!(index.deserialize_code(&path) < 0);
        assert_eq!(index.metrics().snapshot().corrupt_files_evicted, 1);
    }

    #[test]
    fn test_append_rejects_bad_arguments() {
        let mut index = memory_index(&[1]);
        let dir = TempDir::new().unwrap();
        assert_eq!(
            index.append_code(dir.path(), dir.path(), 0),
            IndexErrorCode::AeroIndexInvalidArgument.errno()
        );
        assert!(index.append(Path::new(""), dir.path(), 1).is_err());
    }

    #[test]
    fn test_append_rebuilds_without_partial() {
        let old_dir = TempDir::new().unwrap();
        let new_dir = TempDir::new().unwrap();
        DataDirColumn::write_values(old_dir.path(), "a", ColumnType::UByte, &[1u8, 0, 2]).unwrap();

        let column = DataDirColumn::new(old_dir.path(), "a", ColumnType::UByte, 2);
        let env = IndexEnv::default();
        let mut index = DirectIndex::build(Box::new(column), &env).unwrap();
        assert_eq!(index.row_count(), 2);

        // The old directory now holds all three rows; the partition reports 3.
        let column = DataDirColumn::new(old_dir.path(), "a", ColumnType::UByte, 3);
        index = DirectIndex::from_store(Box::new(column), index.store().clone(), &env);

        let outcome = index.append(old_dir.path(), new_dir.path(), 1).unwrap();
        assert_eq!(outcome.kind, AppendKind::Rebuilt);
        assert_eq!(outcome.rows_added, 1);
        assert_eq!(index.row_count(), 3);
        assert_eq!(index.bin_count(), 3);
    }

    #[test]
    fn test_failed_write_keeps_published_file() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::default();
        let mut index = memory_index(&[2, 0, 2, 1]);
        let path = index.serialize(temp_dir.path()).unwrap();
        let published = fs::read(&path).unwrap();

        let err = publish(&backend, &path, |handle| {
            handle.write_bytes(b"#IBIS partial")?;
            Err::<(), _>(IndexError::io_write("disk full"))
        })
        .unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroIndexIoWrite);
        assert_eq!(fs::read(&path).unwrap(), published);
        assert!(!temp_file_name(&path).exists());
    }

    #[test]
    fn test_failed_first_write_publishes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.idx");
        let err = publish(&FileBackend::default(), &path, |_| {
            Err::<(), _>(IndexError::io_seek("seek past end"))
        })
        .unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroIndexIoSeek);
        assert!(!path.exists());
        assert!(!temp_file_name(&path).exists());
    }

    #[test]
    fn test_rebuild_sees_rows_appended_in_place() {
        let dir = TempDir::new().unwrap();
        let new_dir = TempDir::new().unwrap();
        DataDirColumn::write_values(dir.path(), "a", ColumnType::UByte, &[1u8, 0]).unwrap();

        let backend = Arc::new(FileBackend::new(1));
        let env = IndexEnv::new(backend.clone(), IndexConfig::default().with_mmap_threshold(1));
        let column = DataDirColumn::new(dir.path(), "a", ColumnType::UByte, 2);
        let index = DirectIndex::build(Box::new(column), &env).unwrap();
        assert_eq!(backend.cached_files(), 0, "column files are not kept cached");

        // The value file grows in place to three rows.
        DataDirColumn::write_values(dir.path(), "a", ColumnType::UByte, &[1u8, 0, 2]).unwrap();
        let column = DataDirColumn::new(dir.path(), "a", ColumnType::UByte, 3);
        let mut index = DirectIndex::from_store(Box::new(column), index.store().clone(), &env);

        let outcome = index.append(dir.path(), new_dir.path(), 1).unwrap();
        assert_eq!(outcome.kind, AppendKind::Rebuilt);
        assert_eq!(index.row_count(), 3);
        let hits = index.evaluate(&Query::Discrete(vec![2.0])).unwrap();
        assert_eq!(hits.iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_failed_rebuild_keeps_store() {
        let old_dir = TempDir::new().unwrap();
        let new_dir = TempDir::new().unwrap();
        let mut index = memory_index(&[1, 0]);

        // A memory column cannot be relocated to another directory.
        let err = index.append(old_dir.path(), new_dir.path(), 1).unwrap_err();
        assert_eq!(err.code(), IndexErrorCode::AeroIndexInvalidArgument);
        assert_eq!(index.row_count(), 2);
        assert_eq!(index.bin_count(), 2);
    }
}
