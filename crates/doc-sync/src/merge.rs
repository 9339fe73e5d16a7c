//! Merge-on-update: upsert-by-identifier reconciliation of incoming changes
//! against a cached collection.
//!
//! The table holds exactly one record per identifier, always the most
//! recently applied one. Tombstones stay in the table so they supersede
//! cached versions of the same document, and are dropped only when the
//! table is materialized for consumers.

use crate::record::{Record, Timestamp};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct MergeTable {
    records: HashMap<String, Record>,
}

impl MergeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table from previously cached records.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut table = Self::new();
        table.apply(records);
        table
    }

    /// Upsert every record of an update batch by identifier.
    pub fn apply(&mut self, updates: impl IntoIterator<Item = Record>) {
        for record in updates {
            self.records.insert(record.id().to_string(), record);
        }
    }

    /// Newest `_modified` in the table, tombstones included.
    ///
    /// Used as the start point of incremental listeners.
    pub fn latest_modified(&self) -> Option<Timestamp> {
        self.records.values().filter_map(Record::modified).max()
    }

    /// Every identifier in the table, tombstoned ones included.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Live records, oldest first.
    pub fn ordered(&self) -> Vec<Record> {
        let mut live: Vec<&Record> = self.records.values().filter(|r| !r.is_deleted()).collect();
        live.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        live.into_iter().cloned().collect()
    }

    /// Live records, newest first, as emitted to consumers.
    pub fn newest_first(&self) -> Vec<Record> {
        let mut records = self.ordered();
        records.reverse();
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Fields;
    use serde_json::json;

    fn record(id: &str, modified: i64, title: &str) -> Record {
        let mut fields = Fields::new();
        fields.insert("_modified".into(), json!(modified));
        fields.insert("title".into(), json!(title));
        Record::new(id, fields)
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(Record::id).collect()
    }

    #[test]
    fn test_repeated_updates_keep_one_entry() {
        let mut table = MergeTable::from_records(vec![record("a", 1, "v1")]);
        table.apply(vec![record("a", 2, "v2")]);
        table.apply(vec![record("b", 3, "x"), record("a", 4, "v3")]);

        let ordered = table.ordered();
        assert_eq!(ids(&ordered), vec!["b", "a"]);
        assert_eq!(ordered[1].get("title"), Some(&json!("v3")));
    }

    #[test]
    fn test_tombstone_hides_cached_record() {
        let mut table = MergeTable::from_records(vec![record("a", 1, "v1"), record("b", 2, "x")]);
        table.apply(vec![Record::tombstone("a", 5)]);

        assert_eq!(ids(&table.ordered()), vec!["b"]);
        assert_eq!(table.len(), 2);
        let mut known: Vec<&str> = table.ids().collect();
        known.sort();
        assert_eq!(known, vec!["a", "b"]);
        assert_eq!(table.latest_modified(), Some(5));
    }

    #[test]
    fn test_newest_first_reverses_order() {
        let table = MergeTable::from_records(vec![
            record("c", 3, ""),
            record("a", 1, ""),
            record("b", 2, ""),
        ]);
        assert_eq!(ids(&table.newest_first()), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_empty_table_has_no_start_point() {
        let table = MergeTable::new();
        assert!(table.is_empty());
        assert_eq!(table.latest_modified(), None);
    }
}
