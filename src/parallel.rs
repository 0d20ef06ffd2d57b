//! Parallel ingestion engine built on Rayon fork/join.
//!
//! A byte range larger than the leaf threshold is cut at its midpoint,
//! the cut is moved forward to the next line boundary, and both halves are
//! processed with [`rayon::join`]. Ranges at or below the threshold are
//! read and parsed line by line. Recursion depth is bounded by
//! `log2(range / leaf_threshold)`.

use crate::alias::{AliasRegistry, FrozenAliases, ResolveSource};
use crate::chunk::{
    align_to_line_start, line_end_after, read_header, split_chunks, ByteRange, RangeSource,
};
use crate::config::{AliasOrder, IngestConfig, LoadMode};
use crate::store::{RecordSink, RecordStore};
use crate::tsv::{classify_line, is_blank, source_field, ColumnLayout, Result};
use memchr::memchr_iter;
use rustc_hash::FxHashSet;
use std::borrow::Cow;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Statistics from one load.
#[derive(Debug, Default, Clone)]
pub struct LoadStats {
    pub mode: LoadMode,
    pub bytes: u64,
    pub chunks: usize,
    pub leaves: usize,
    /// Non-blank data lines seen.
    pub data_lines: usize,
    pub records: usize,
    /// Non-blank lines too short to hold the group column.
    pub skipped_rows: usize,
    pub aliases: usize,
    pub used_mmap: bool,
    pub elapsed: Duration,
}

impl fmt::Display for LoadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mode: {}, Bytes: {}, Chunks: {}, Leaves: {}, Lines: {}, Records: {}, Skipped: {}, Aliases: {}, Mmap: {}, Time: {:.2}s",
            self.mode,
            self.bytes,
            self.chunks,
            self.leaves,
            self.data_lines,
            self.records,
            self.skipped_rows,
            self.aliases,
            if self.used_mmap { "yes" } else { "no" },
            self.elapsed.as_secs_f64()
        )
    }
}

/// Per-task counters, summed as the fork/join tree unwinds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LeafCounts {
    leaves: usize,
    data_lines: usize,
    records: usize,
    skipped_rows: usize,
}

impl LeafCounts {
    fn merge(self, other: Self) -> Self {
        Self {
            leaves: self.leaves + other.leaves,
            data_lines: self.data_lines + other.data_lines,
            records: self.records + other.records,
            skipped_rows: self.skipped_rows + other.skipped_rows,
        }
    }
}

/// Recursively split `range` and run `leaf` on every piece.
///
/// Results are merged left before right, so order-sensitive merges see
/// pieces in file order.
fn fork_join<S, T, F, M>(
    source: &S,
    range: ByteRange,
    leaf_threshold: u64,
    leaf: &F,
    merge: &M,
) -> Result<T>
where
    S: RangeSource + ?Sized,
    T: Send,
    F: Fn(ByteRange) -> Result<T> + Sync,
    M: Fn(T, T) -> T + Sync,
{
    if range.len() <= leaf_threshold {
        return leaf(range);
    }

    let mid = line_end_after(source, range.start + range.len() / 2, range.end)?;
    if mid >= range.end {
        // No line starts after the midpoint: the range cannot be cut.
        return leaf(range);
    }

    let (left, right) = rayon::join(
        || fork_join(source, ByteRange::new(range.start, mid), leaf_threshold, leaf, merge),
        || fork_join(source, ByteRange::new(mid, range.end), leaf_threshold, leaf, merge),
    );
    Ok(merge(left?, right?))
}

/// Call `f` for every line of `data`, without the `\n` terminator.
#[inline]
fn for_each_line<F>(data: &[u8], mut f: F) -> Result<()>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    let mut pos = 0;
    for nl in memchr_iter(b'\n', data) {
        f(&data[pos..nl])?;
        pos = nl + 1;
    }
    if pos < data.len() {
        f(&data[pos..])?;
    }
    Ok(())
}

/// Read one leaf range, aligned so it starts on a line boundary.
fn leaf_bytes<S: RangeSource + ?Sized>(
    source: &S,
    range: ByteRange,
) -> Result<(u64, Cow<'_, [u8]>)> {
    let start = align_to_line_start(source, range.start, range.end)?;
    let bytes = source.read_range(start, range.end)?;
    Ok((start, bytes))
}

/// Everything a leaf needs, shared by reference across tasks.
struct Ingest<'a, S: RangeSource + ?Sized> {
    source: &'a S,
    layout: ColumnLayout,
    registry: &'a AliasRegistry,
    /// Set once the file-order pre-pass has registered every source.
    frozen: Option<FrozenAliases>,
    sink: &'a RecordSink,
    leaf_threshold: u64,
}

impl<S: RangeSource + ?Sized> Ingest<'_, S> {
    fn resolver(&self) -> &dyn ResolveSource {
        match &self.frozen {
            Some(frozen) => frozen,
            None => self.registry,
        }
    }

    fn parse_leaf(&self, range: ByteRange) -> Result<LeafCounts> {
        let (start, bytes) = leaf_bytes(self.source, range)?;
        trace!(start, end = range.end, "parsing leaf");
        let resolver = self.resolver();

        let mut counts = LeafCounts {
            leaves: 1,
            ..Default::default()
        };
        let mut records = Vec::new();

        for_each_line(&bytes, |raw| {
            let line = String::from_utf8_lossy(raw);
            if is_blank(&line) {
                return Ok(());
            }
            counts.data_lines += 1;
            match classify_line(&line, &self.layout, resolver)? {
                Some(record) => records.push(record),
                None => counts.skipped_rows += 1,
            }
            Ok(())
        })?;

        counts.records = records.len();
        self.sink.append(start, records)?;
        Ok(counts)
    }

    /// Distinct source identifiers of a leaf in first-seen order.
    fn collect_sources(&self, range: ByteRange) -> Result<Vec<String>> {
        let (_, bytes) = leaf_bytes(self.source, range)?;
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut ordered = Vec::new();

        for_each_line(&bytes, |raw| {
            let line = String::from_utf8_lossy(raw);
            if let Some(original) = source_field(&line, &self.layout) {
                if !seen.contains(original) {
                    seen.insert(original.to_string());
                    ordered.push(original.to_string());
                }
            }
            Ok(())
        })?;

        Ok(ordered)
    }

    fn parse_range(&self, range: ByteRange) -> Result<LeafCounts> {
        fork_join(
            self.source,
            range,
            self.leaf_threshold,
            &|r: ByteRange| self.parse_leaf(r),
            &LeafCounts::merge,
        )
    }

    /// Register every source identifier of `range` in file order.
    fn register_range(&self, range: ByteRange) -> Result<()> {
        let ordered = fork_join(
            self.source,
            range,
            self.leaf_threshold,
            &|r: ByteRange| self.collect_sources(r),
            &|mut left: Vec<String>, right: Vec<String>| {
                left.extend(right);
                left
            },
        )?;
        self.registry.register_all(ordered.iter().map(String::as_str))
    }
}

/// Parse a whole report from `source` into a frozen [`RecordStore`].
///
/// In [`LoadMode::Chunked`] the data region is first cut into chunks of
/// about `config.chunk_size` bytes which are processed one after another,
/// each with its own fork/join tree; otherwise the whole data region forms
/// a single tree. With [`AliasOrder::FileOrder`] a pre-pass registers the
/// source identifiers in file order before any record is built.
pub fn ingest<S: RangeSource + ?Sized>(
    source: &S,
    config: &IngestConfig,
) -> Result<(RecordStore, LoadStats)> {
    config.validate()?;
    let started = Instant::now();

    let (header, data_start) = read_header(source)?;
    let layout = ColumnLayout::from_header(&header, &config.columns)?;
    debug!(?layout, data_start, "resolved header columns");

    let ranges = match config.mode {
        LoadMode::Chunked => split_chunks(source, data_start, config.chunk_size)?,
        LoadMode::InMemory => {
            let whole = ByteRange::new(data_start, source.len());
            if whole.is_empty() {
                Vec::new()
            } else {
                vec![whole]
            }
        }
    };
    debug!(chunks = ranges.len(), mode = %config.mode, "planned byte ranges");

    let registry = AliasRegistry::new();
    let sink = RecordSink::new();
    let mut engine = Ingest {
        source,
        layout,
        registry: &registry,
        frozen: None,
        sink: &sink,
        leaf_threshold: config.leaf_threshold,
    };

    if config.alias_order == AliasOrder::FileOrder {
        for range in &ranges {
            engine.register_range(*range)?;
        }
        engine.frozen = Some(registry.frozen()?);
        debug!(aliases = registry.len(), "registered source aliases in file order");
    }

    let mut counts = LeafCounts::default();
    for (idx, range) in ranges.iter().enumerate() {
        debug!(chunk = idx, start = range.start, end = range.end, "processing chunk");
        counts = counts.merge(engine.parse_range(*range)?);
    }

    let store = sink.freeze(&registry)?;
    let stats = LoadStats {
        mode: config.mode,
        bytes: source.len(),
        chunks: ranges.len(),
        leaves: counts.leaves,
        data_lines: counts.data_lines,
        records: counts.records,
        skipped_rows: counts.skipped_rows,
        aliases: store.aliases().len(),
        used_mmap: false,
        elapsed: started.elapsed(),
    };
    info!(%stats, "ingestion complete");

    Ok((store, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SliceSource;
    use crate::tsv::LoadError;
    use std::io;

    /// In-memory source whose reads fail once they touch `fail_at`.
    struct FailingSource<'a> {
        inner: SliceSource<'a>,
        fail_at: u64,
    }

    impl RangeSource for FailingSource<'_> {
        fn len(&self) -> u64 {
            self.inner.len()
        }

        fn read_range(&self, start: u64, end: u64) -> io::Result<Cow<'_, [u8]>> {
            if start <= self.fail_at && self.fail_at < end {
                return Err(io::Error::other("device read failed"));
            }
            self.inner.read_range(start, end)
        }

        fn find_newline(&self, pos: u64, limit: u64) -> io::Result<Option<u64>> {
            self.inner.find_newline(pos, limit)
        }
    }

    fn long_report(rows: usize) -> String {
        let mut content = String::from("File.Name\tPrecursor.Id\tGenes\tPrecursor.Normalised\n");
        for i in 0..rows {
            content.push_str(&format!(
                "D:\\r\\2024011{}_PLC_M_{}_Slot2-4{}_1_1.d\tPEP{}K2\tGAPDH\t{}.5\n",
                i % 3,
                i % 5,
                i % 3,
                i,
                i
            ));
        }
        content
    }

    const REPORT: &str = "File.Name\tPrecursor.Id\tGenes\tPrecursor.Normalised\n\
        D:\\r\\20240114_PLC_M_1_Slot2-43_1_16419.d\tAAK2\tGAPDH\t3.5\n\
        D:\\r\\20240114_PLC_M_2_Slot2-44_1_16420.d\tAAK2\tGAPDH\t4.5\n\
        D:\\r\\20240114_PLC_M_1_Slot2-43_1_16419.d\tLLR3\tGAPDH\tabc\n\
        \n\
        D:\\r\\20240115_PLC_M_1_Slot1-01_1_16500.d\tQQK2\tACTB\t7\n\
        short\n\
        D:\\r\\20240114_PLC_M_2_Slot2-44_1_16420.d\tQQK2\tACTB\t8.25";

    fn load(config: &IngestConfig) -> (RecordStore, LoadStats) {
        ingest(&SliceSource::new(REPORT.as_bytes()), config).unwrap()
    }

    #[test]
    fn test_for_each_line() {
        let mut lines = Vec::new();
        for_each_line(b"a\nbb\n\nccc", |l| {
            lines.push(l.to_vec());
            Ok(())
        })
        .unwrap();
        assert_eq!(lines, vec![b"a".to_vec(), b"bb".to_vec(), b"".to_vec(), b"ccc".to_vec()]);
    }

    #[test]
    fn test_ingest_counts() {
        let (store, stats) = load(&IngestConfig::new());
        assert_eq!(store.len(), 5);
        assert_eq!(stats.records, 5);
        assert_eq!(stats.data_lines, 6);
        assert_eq!(stats.skipped_rows, 1);
        assert_eq!(stats.aliases, 3);
    }

    #[test]
    fn test_ingest_aliases_in_file_order() {
        let (store, _) = load(&IngestConfig::new().with_leaf_threshold(16));
        assert_eq!(
            store.alias_of("D:\\r\\20240114_PLC_M_1_Slot2-43_1_16419.d"),
            Some("PLC_M_1")
        );
        assert_eq!(
            store.alias_of("D:\\r\\20240114_PLC_M_2_Slot2-44_1_16420.d"),
            Some("PLC_M_2")
        );
        assert_eq!(
            store.alias_of("D:\\r\\20240115_PLC_M_1_Slot1-01_1_16500.d"),
            Some("PLC_M_1(1)")
        );
    }

    #[test]
    fn test_ingest_preserves_file_order() {
        let (store, stats) = load(&IngestConfig::new().with_leaf_threshold(8));
        assert!(stats.leaves > 1);
        let series: Vec<&str> = store.all().iter().map(|r| r.series_id()).collect();
        assert_eq!(series, vec!["AAK2", "AAK2", "LLR3", "QQK2", "QQK2"]);
        assert_eq!(store.all()[2].value, 0.0);
        assert_eq!(store.all()[4].value, 8.25);
    }

    #[test]
    fn test_ingest_invariant_to_splitting() {
        let (baseline, _) = load(&IngestConfig::new());
        for leaf in [1, 7, 33, 100, 4096] {
            for chunk in [1, 50, 120, 1 << 20] {
                for mode in [LoadMode::InMemory, LoadMode::Chunked] {
                    let config = IngestConfig::new()
                        .with_mode(mode)
                        .with_chunk_size(chunk)
                        .with_leaf_threshold(leaf);
                    let (store, _) = load(&config);
                    assert_eq!(store.all(), baseline.all(), "leaf={leaf} chunk={chunk}");
                    assert_eq!(store.aliases(), baseline.aliases());
                }
            }
        }
    }

    #[test]
    fn test_ingest_first_seen_order() {
        let config = IngestConfig::new().with_alias_order(AliasOrder::FirstSeen);
        let (store, _) = load(&config);
        assert_eq!(store.len(), 5);
        let mut aliases: Vec<&str> = store.aliases().values().map(|a| &**a).collect();
        aliases.sort_unstable();
        assert_eq!(aliases, vec!["PLC_M_1", "PLC_M_1(1)", "PLC_M_2"]);
    }

    #[test]
    fn test_ingest_header_only() {
        let source = SliceSource::new(b"File.Name\tPrecursor.Id\tGenes\tPrecursor.Normalised\n");
        let (store, stats) = ingest(&source, &IngestConfig::new()).unwrap();
        assert!(store.is_empty());
        assert_eq!(stats.chunks, 0);
    }

    #[test]
    fn test_ingest_missing_column() {
        let source = SliceSource::new(b"File.Name\tGenes\tPrecursor.Normalised\nA\tG\t1\n");
        let err = ingest(&source, &IngestConfig::new()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumns { .. }));
        assert!(err.to_string().contains("Precursor.Id"));
    }

    #[test]
    fn test_read_failure_in_inner_leaf_fails_load() {
        let content = long_report(200);
        assert!(content.len() > 4000);

        for order in [AliasOrder::FileOrder, AliasOrder::FirstSeen] {
            for mode in [LoadMode::InMemory, LoadMode::Chunked] {
                let source = FailingSource {
                    inner: SliceSource::new(content.as_bytes()),
                    fail_at: 2000,
                };
                let config = IngestConfig::new()
                    .with_mode(mode)
                    .with_chunk_size(1024)
                    .with_leaf_threshold(64)
                    .with_alias_order(order);

                match ingest(&source, &config) {
                    Err(LoadError::Io(e)) => assert!(e.to_string().contains("device read failed")),
                    Err(other) => panic!("unexpected error: {}", other),
                    Ok((store, _)) => panic!("load succeeded with {} records", store.len()),
                }
            }
        }
    }

    #[test]
    fn test_file_order_parse_uses_frozen_aliases() {
        let content = long_report(200);
        let source = SliceSource::new(content.as_bytes());
        let (file_order, _) = ingest(&source, &IngestConfig::new().with_leaf_threshold(64)).unwrap();
        let (first_seen, _) = ingest(
            &source,
            &IngestConfig::new()
                .with_leaf_threshold(64)
                .with_alias_order(AliasOrder::FirstSeen),
        )
        .unwrap();

        assert_eq!(file_order.len(), 200);
        assert_eq!(file_order.aliases().len(), first_seen.aliases().len());
        assert_eq!(
            file_order.alias_of("D:\\r\\20240110_PLC_M_0_Slot2-40_1_1.d"),
            Some("PLC_M_0")
        );
        for record in file_order.all() {
            assert_eq!(
                file_order.alias_of(record.original_source_id()),
                Some(record.source_alias())
            );
        }
    }

    #[test]
    fn test_ingest_empty_source() {
        let source = SliceSource::new(b"");
        assert!(matches!(
            ingest(&source, &IngestConfig::new()),
            Err(LoadError::EmptyFile)
        ));
    }
}
