//! Core record type for one parsed report row.

use std::fmt;
use std::sync::Arc;

/// One parsed data line of a precursor report.
///
/// Records are created once by the line classifier and never mutated.
/// The source strings are shared with the alias registry, so cloning a
/// record is cheap for the high-cardinality source columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Source file identifier exactly as written in the report.
    pub original_source_id: Arc<str>,
    /// Short, deduplicated display name for the source.
    pub source_alias: Arc<str>,
    /// Series identifier (precursor id).
    pub series_id: String,
    /// Quantity for this (group, series, source) triple.
    pub value: f64,
    /// Group key (gene name).
    pub group_key: String,
}

impl Record {
    /// Create a new record.
    #[inline]
    pub fn new(
        original_source_id: impl Into<Arc<str>>,
        source_alias: impl Into<Arc<str>>,
        series_id: impl Into<String>,
        value: f64,
        group_key: impl Into<String>,
    ) -> Self {
        Self {
            original_source_id: original_source_id.into(),
            source_alias: source_alias.into(),
            series_id: series_id.into(),
            value,
            group_key: group_key.into(),
        }
    }

    /// Get the source identifier as written in the report.
    #[inline]
    pub fn original_source_id(&self) -> &str {
        &self.original_source_id
    }

    /// Get the short source alias.
    #[inline]
    pub fn source_alias(&self) -> &str {
        &self.source_alias
    }

    /// Get the series (precursor) identifier.
    #[inline]
    pub fn series_id(&self) -> &str {
        &self.series_id
    }

    /// Get the group key (gene).
    #[inline]
    pub fn group_key(&self) -> &str {
        &self.group_key
    }

    /// True when this record belongs to `group` and `series`, measured for `alias`.
    #[inline]
    pub fn matches(&self, group: &str, series: &str, alias: &str) -> bool {
        self.group_key == group && self.series_id == series && &*self.source_alias == alias
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.group_key, self.original_source_id, self.source_alias, self.series_id, self.value
        )
    }
}
