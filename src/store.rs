//! Record collection: shared sink during ingestion, frozen store afterwards.

use crate::alias::AliasRegistry;
use crate::record::Record;
use crate::tsv::{LoadError, Result};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Append-only collection filled by parallel leaf tasks.
///
/// Each leaf appends its whole batch under one lock acquisition, tagged
/// with the byte offset the batch was parsed from. Freezing orders the
/// batches by offset, so the final store is in file order no matter how
/// the tasks were scheduled.
#[derive(Debug, Default)]
pub struct RecordSink {
    batches: Mutex<Vec<(u64, Vec<Record>)>>,
}

impl RecordSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the records parsed from the range starting at `offset`.
    pub fn append(&self, offset: u64, records: Vec<Record>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| LoadError::Internal("record sink lock poisoned".to_string()))?;
        batches.push((offset, records));
        Ok(())
    }

    /// Consume the sink and build the read-only store.
    pub fn freeze(self, registry: &AliasRegistry) -> Result<RecordStore> {
        let mut batches = self
            .batches
            .into_inner()
            .map_err(|_| LoadError::Internal("record sink lock poisoned".to_string()))?;
        batches.sort_unstable_by_key(|(offset, _)| *offset);

        let total = batches.iter().map(|(_, b)| b.len()).sum();
        let mut records = Vec::with_capacity(total);
        for (_, batch) in batches {
            records.extend(batch);
        }

        Ok(RecordStore::new(records, registry.snapshot()?))
    }
}

/// Frozen, query-able collection of parsed records.
///
/// Records keep file order. A group index maps each group key to the
/// positions of its records so filtered queries skip unrelated groups.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<Record>,
    by_group: FxHashMap<String, Vec<usize>>,
    aliases: BTreeMap<Arc<str>, Arc<str>>,
}

impl RecordStore {
    /// Build a store and its group index.
    pub fn new(records: Vec<Record>, aliases: BTreeMap<Arc<str>, Arc<str>>) -> Self {
        let mut by_group: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (idx, record) in records.iter().enumerate() {
            match by_group.get_mut(record.group_key.as_str()) {
                Some(indices) => indices.push(idx),
                None => {
                    by_group.insert(record.group_key.clone(), vec![idx]);
                }
            }
        }

        Self {
            records,
            by_group,
            aliases,
        }
    }

    /// All records, in file order.
    #[inline]
    pub fn all(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the report held no usable data line.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted original-identifier to alias mapping.
    pub fn aliases(&self) -> &BTreeMap<Arc<str>, Arc<str>> {
        &self.aliases
    }

    /// Alias assigned to an original identifier.
    pub fn alias_of(&self, original: &str) -> Option<&str> {
        self.aliases.get(original).map(|a| &**a)
    }

    /// Number of distinct group keys.
    pub fn group_count(&self) -> usize {
        self.by_group.len()
    }

    /// Distinct group keys, unordered.
    pub fn group_keys(&self) -> impl Iterator<Item = &str> {
        self.by_group.keys().map(String::as_str)
    }

    /// Records of one group, in file order.
    pub fn group_records<'a>(&'a self, group: &str) -> impl Iterator<Item = &'a Record> + 'a {
        self.by_group
            .get(group)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(move |&idx| &self.records[idx])
    }
}
