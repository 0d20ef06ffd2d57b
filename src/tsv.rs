//! Header resolution and line classification for tab-separated reports.

use crate::alias::ResolveSource;
use crate::config::ColumnNames;
use crate::record::Record;
use std::io;
use thiserror::Error;

/// Errors that can occur while loading or querying a report.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Empty file: no header line")]
    EmptyFile,

    #[error("Required columns not found in header: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No report has been loaded")]
    NotLoaded,

    #[error("Internal invariant violated: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LoadError>;

/// Positions of the four required columns, resolved once from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub group: usize,
    pub source: usize,
    pub series: usize,
    pub value: usize,
}

impl ColumnLayout {
    /// Locate the required columns by exact, case-sensitive name.
    ///
    /// Every missing name is reported, not just the first.
    pub fn from_header(header: &str, names: &ColumnNames) -> Result<Self> {
        let header = strip_cr(header);
        let columns: Vec<&str> = header.split('\t').collect();
        let find = |name: &str| columns.iter().position(|c| *c == name);

        let group = find(&names.group);
        let source = find(&names.source);
        let series = find(&names.series);
        let value = find(&names.value);

        match (group, source, series, value) {
            (Some(group), Some(source), Some(series), Some(value)) => Ok(Self {
                group,
                source,
                series,
                value,
            }),
            _ => {
                let missing = [
                    (group, &names.group),
                    (source, &names.source),
                    (series, &names.series),
                    (value, &names.value),
                ]
                .into_iter()
                .filter(|(idx, _)| idx.is_none())
                .map(|(_, name)| name.clone())
                .collect();
                Err(LoadError::MissingColumns { missing })
            }
        }
    }
}

#[inline]
fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// True for lines that are empty after trimming whitespace.
#[inline]
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Split a data line into fields, or `None` if it cannot hold a record.
///
/// Trailing empty fields are dropped before the length check, so a row
/// whose group column is the empty last field counts as too short.
#[inline]
fn split_fields<'a>(line: &'a str, layout: &ColumnLayout) -> Option<Vec<&'a str>> {
    let line = strip_cr(line);
    if is_blank(line) {
        return None;
    }

    let mut fields: Vec<&str> = line.split('\t').collect();
    while fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }

    if fields.len() <= layout.group {
        return None;
    }
    Some(fields)
}

/// Parse a quantity, substituting `0.0` for anything unparseable.
///
/// Only plain decimal notation is accepted: spellings such as `inf`,
/// `Infinity` or `NaN` that `f64::from_str` would take become `0.0`.
#[inline]
pub fn parse_value(field: &str) -> f64 {
    let field = field.trim();
    let unsigned = field.strip_prefix(['+', '-']).unwrap_or(field);
    if !unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return 0.0;
    }
    field.parse().unwrap_or(0.0)
}

/// The source identifier a line would register, if the line holds a record.
///
/// Mirrors the acceptance rules of [`classify_line`] exactly, so a pre-pass
/// built on it registers the same set of identifiers.
pub fn source_field<'a>(line: &'a str, layout: &ColumnLayout) -> Option<&'a str> {
    let fields = split_fields(line, layout)?;
    Some(fields.get(layout.source).copied().unwrap_or(""))
}

/// Classify one raw line into a record.
///
/// Returns `Ok(None)` for blank or short rows. Missing source and series
/// fields become empty strings and a missing or malformed value becomes
/// `0.0`; none of these fail the line.
pub fn classify_line<R: ResolveSource + ?Sized>(
    line: &str,
    layout: &ColumnLayout,
    registry: &R,
) -> Result<Option<Record>> {
    let Some(fields) = split_fields(line, layout) else {
        return Ok(None);
    };

    let group_key = fields[layout.group];
    let original = fields.get(layout.source).copied().unwrap_or("");
    let series_id = fields.get(layout.series).copied().unwrap_or("");
    let value = fields.get(layout.value).map_or(0.0, |f| parse_value(f));

    let source = registry.source_name(original)?;

    Ok(Some(Record {
        original_source_id: source.original,
        source_alias: source.alias,
        series_id: series_id.to_string(),
        value,
        group_key: group_key.to_string(),
    }))
}
