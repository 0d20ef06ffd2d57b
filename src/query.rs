//! Read-only queries over a frozen [`RecordStore`].
//!
//! These are the operations a front end needs to offer selections and
//! draw a grouped bar chart: which series exist for a group, which source
//! aliases exist, and a (series x alias) table of values.

use crate::store::RecordStore;
use rustc_hash::{FxHashMap, FxHashSet};

/// Values for every requested (series, alias) combination of one group.
///
/// Rows follow the requested series order, columns the requested alias
/// order. Combinations without a record hold `0.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTable {
    pub group: String,
    pub series_ids: Vec<String>,
    pub aliases: Vec<String>,
    /// Row-major: `values[row * aliases.len() + col]`.
    values: Vec<f64>,
}

impl PivotTable {
    /// Value for one combination, or `None` if either key was not requested.
    pub fn get(&self, series_id: &str, alias: &str) -> Option<f64> {
        let row = self.series_ids.iter().position(|s| s == series_id)?;
        let col = self.aliases.iter().position(|a| a == alias)?;
        Some(self.values[row * self.aliases.len() + col])
    }

    /// One row of values, in alias order.
    pub fn row(&self, row: usize) -> &[f64] {
        let width = self.aliases.len();
        &self.values[row * width..(row + 1) * width]
    }

    /// All cells as `(series, alias, value)`, row by row.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str, f64)> + '_ {
        self.series_ids.iter().enumerate().flat_map(move |(row, series)| {
            self.aliases
                .iter()
                .zip(self.row(row))
                .map(move |(alias, &value)| (series.as_str(), alias.as_str(), value))
        })
    }

    /// True when no series or no alias was requested.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl RecordStore {
    /// Distinct series identifiers recorded for `group`, in no particular order.
    pub fn distinct_series_ids(&self, group: &str) -> FxHashSet<&str> {
        self.group_records(group).map(|r| r.series_id()).collect()
    }

    /// Distinct series identifiers of `group`, sorted for display.
    pub fn sorted_series_ids(&self, group: &str) -> Vec<&str> {
        let mut ids: Vec<&str> = self.distinct_series_ids(group).into_iter().collect();
        ids.sort_unstable();
        ids
    }

    /// All group keys, sorted.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self.group_keys().collect();
        groups.sort_unstable();
        groups
    }

    /// All source aliases, sorted.
    pub fn source_aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.aliases().values().map(|a| &**a).collect();
        aliases.sort_unstable();
        aliases.dedup();
        aliases
    }

    /// Source aliases that have at least one record in `group`, sorted.
    pub fn aliases_for_group(&self, group: &str) -> Vec<&str> {
        let set: FxHashSet<&str> = self.group_records(group).map(|r| r.source_alias()).collect();
        let mut aliases: Vec<&str> = set.into_iter().collect();
        aliases.sort_unstable();
        aliases
    }

    /// Build the (series x alias) value table for `group`.
    ///
    /// When several records share a (group, series, alias) triple, the one
    /// latest in file order wins.
    pub fn pivot<S, A>(&self, group: &str, series_ids: &[S], aliases: &[A]) -> PivotTable
    where
        S: AsRef<str>,
        A: AsRef<str>,
    {
        let wanted_series: FxHashSet<&str> = series_ids.iter().map(|s| s.as_ref()).collect();
        let wanted_aliases: FxHashSet<&str> = aliases.iter().map(|a| a.as_ref()).collect();

        let mut found: FxHashMap<(&str, &str), f64> = FxHashMap::default();
        for record in self.group_records(group) {
            let key = (record.series_id(), record.source_alias());
            if wanted_series.contains(key.0) && wanted_aliases.contains(key.1) {
                found.insert(key, record.value);
            }
        }

        let mut values = Vec::with_capacity(series_ids.len() * aliases.len());
        for series in series_ids {
            for alias in aliases {
                let value = found
                    .get(&(series.as_ref(), alias.as_ref()))
                    .copied()
                    .unwrap_or(0.0);
                values.push(value);
            }
        }

        PivotTable {
            group: group.to_string(),
            series_ids: series_ids.iter().map(|s| s.as_ref().to_string()).collect(),
            aliases: aliases.iter().map(|a| a.as_ref().to_string()).collect(),
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::record::Record;
    use crate::store::RecordStore;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn rec(group: &str, series: &str, alias: &str, value: f64) -> Record {
        Record::new(format!("{}.d", alias), alias, series, value, group)
    }

    fn store(records: Vec<Record>) -> RecordStore {
        let aliases: BTreeMap<Arc<str>, Arc<str>> = records
            .iter()
            .map(|r| (Arc::clone(&r.original_source_id), Arc::clone(&r.source_alias)))
            .collect();
        RecordStore::new(records, aliases)
    }

    #[test]
    fn test_pivot_fills_missing_with_zero() {
        let store = store(vec![rec("G", "S1", "A1", 3.5)]);
        let table = store.pivot("G", &["S1", "S2"], &["A1", "A2"]);

        assert_eq!(table.get("S1", "A1"), Some(3.5));
        assert_eq!(table.get("S1", "A2"), Some(0.0));
        assert_eq!(table.get("S2", "A1"), Some(0.0));
        assert_eq!(table.get("S2", "A2"), Some(0.0));
        assert_eq!(table.get("S3", "A1"), None);
        assert_eq!(table.cells().count(), 4);
    }

    #[test]
    fn test_pivot_ignores_other_groups() {
        let store = store(vec![rec("G", "S1", "A1", 1.0), rec("H", "S1", "A2", 9.0)]);
        let table = store.pivot("G", &["S1"], &["A1", "A2"]);
        assert_eq!(table.row(0), &[1.0, 0.0]);
    }

    #[test]
    fn test_pivot_duplicate_rows_last_wins() {
        let store = store(vec![rec("G", "S1", "A1", 1.0), rec("G", "S1", "A1", 2.0)]);
        let table = store.pivot("G", &["S1"], &["A1"]);
        assert_eq!(table.get("S1", "A1"), Some(2.0));
    }

    #[test]
    fn test_pivot_keeps_requested_order() {
        let store = store(vec![rec("G", "S1", "A1", 1.0), rec("G", "S2", "A2", 2.0)]);
        let table = store.pivot("G", &["S2", "S1"], &["A2", "A1"]);
        let cells: Vec<(&str, &str, f64)> = table.cells().collect();
        assert_eq!(
            cells,
            vec![
                ("S2", "A2", 2.0),
                ("S2", "A1", 0.0),
                ("S1", "A2", 0.0),
                ("S1", "A1", 1.0),
            ]
        );
    }

    #[test]
    fn test_pivot_empty_request() {
        let store = store(vec![rec("G", "S1", "A1", 1.0)]);
        let table = store.pivot::<&str, &str>("G", &[], &["A1"]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_distinct_series_ids() {
        let store = store(vec![
            rec("G", "S2", "A1", 1.0),
            rec("G", "S1", "A2", 0.0),
            rec("G", "S2", "A2", 1.0),
            rec("H", "S9", "A1", 1.0),
        ]);

        let ids = store.distinct_series_ids("G");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("S1") && ids.contains("S2"));
        assert_eq!(store.sorted_series_ids("G"), vec!["S1", "S2"]);
        assert!(store.distinct_series_ids("missing").is_empty());
    }

    #[test]
    fn test_groups_and_aliases() {
        let store = store(vec![
            rec("G", "S1", "B", 1.0),
            rec("H", "S1", "A", 1.0),
            rec("G", "S2", "A", 1.0),
        ]);
        assert_eq!(store.groups(), vec!["G", "H"]);
        assert_eq!(store.source_aliases(), vec!["A", "B"]);
        assert_eq!(store.aliases_for_group("H"), vec!["A"]);
        assert_eq!(store.aliases_for_group("G"), vec!["A", "B"]);
    }
}
