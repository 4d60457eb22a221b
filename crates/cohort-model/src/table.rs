//! Immutable wide tables keyed by entity.
//!
//! A [`WideTable`] has one row per key and a fixed, ordered column list.
//! Absent cells are null; blank strings are never stored. Every transform
//! returns a new table instead of mutating the receiver; `insert_row` and
//! `set` exist only for building a table.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ModelError, Result};
use crate::ids::EntityId;

pub type Row = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideTable {
    name: String,
    key_column: String,
    columns: Vec<String>,
    rows: BTreeMap<EntityId, Row>,
}

impl WideTable {
    pub fn new(
        name: impl Into<String>,
        key_column: impl Into<String>,
        columns: impl IntoIterator<Item = String>,
    ) -> Self {
        let key_column = key_column.into();
        let mut seen = BTreeSet::new();
        let columns = columns
            .into_iter()
            .filter(|column| *column != key_column && seen.insert(column.clone()))
            .collect();
        Self {
            name: name.into(),
            key_column,
            columns,
            rows: BTreeMap::new(),
        }
    }

    /// Add a row. Duplicate keys are a validation error; unknown columns are
    /// appended to the column list.
    pub fn insert_row(&mut self, key: EntityId, values: Row) -> Result<()> {
        if self.rows.contains_key(&key) {
            return Err(ModelError::DuplicateKey {
                table: self.name.clone(),
                key: key.to_string(),
            });
        }
        let mut row = Row::new();
        for (column, value) in values {
            if column == self.key_column {
                continue;
            }
            self.ensure_column(&column);
            if !value.trim().is_empty() {
                row.insert(column, value);
            }
        }
        self.rows.insert(key, row);
        Ok(())
    }

    /// Upsert one cell, creating the row when needed. A blank value clears it.
    pub fn set(&mut self, key: &EntityId, column: &str, value: impl Into<String>) {
        if column == self.key_column {
            return;
        }
        self.ensure_column(column);
        let value = value.into();
        let row = self.rows.entry(key.clone()).or_default();
        if value.trim().is_empty() {
            row.remove(column);
        } else {
            row.insert(column.to_string(), value);
        }
    }

    fn ensure_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    /// Non-key columns in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        column == self.key_column || self.columns.iter().any(|c| c == column)
    }

    /// Key column followed by the other columns.
    pub fn header(&self) -> Vec<String> {
        std::iter::once(self.key_column.clone())
            .chain(self.columns.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityId> {
        self.rows.keys()
    }

    pub fn contains_key(&self, key: &EntityId) -> bool {
        self.rows.contains_key(key)
    }

    pub fn row(&self, key: &EntityId) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Row)> {
        self.rows.iter()
    }

    /// Cell value; the key column resolves to the row key.
    pub fn get(&self, key: &EntityId, column: &str) -> Option<&str> {
        let (key, row) = self.rows.get_key_value(key)?;
        if column == self.key_column {
            return Some(key.as_str());
        }
        row.get(column).map(String::as_str)
    }

    /// Count of non-null cells in a column.
    pub fn non_null_count(&self, column: &str) -> usize {
        self.rows
            .values()
            .filter(|row| row.contains_key(column))
            .count()
    }

    /// Rows rendered in header order; nulls become empty strings.
    pub fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|(key, row)| {
                std::iter::once(key.to_string())
                    .chain(
                        self.columns
                            .iter()
                            .map(|column| row.get(column).cloned().unwrap_or_default()),
                    )
                    .collect()
            })
            .collect()
    }

    /// Long-format cells `(key, column, value)` for every non-null cell.
    pub fn melt(&self) -> Vec<(EntityId, String, String)> {
        let mut cells = Vec::new();
        for (key, row) in &self.rows {
            for column in &self.columns {
                if let Some(value) = row.get(column) {
                    cells.push((key.clone(), column.clone(), value.clone()));
                }
            }
        }
        cells
    }

    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Copy with the given columns present (all-null when new).
    pub fn with_columns(&self, columns: &[String]) -> Self {
        let mut table = self.clone();
        for column in columns {
            if *column != table.key_column {
                table.ensure_column(column);
            }
        }
        table
    }

    /// Copy keeping only `columns`, in that order.
    pub fn select(&self, columns: &[String]) -> Self {
        let mut table = Self::new(self.name.clone(), self.key_column.clone(), columns.to_vec());
        for (key, row) in &self.rows {
            let kept = row
                .iter()
                .filter(|(column, _)| table.columns.contains(*column))
                .map(|(c, v)| (c.clone(), v.clone()))
                .collect();
            table.rows.insert(key.clone(), kept);
        }
        table
    }

    /// Copy keeping only the rows for which `keep` holds.
    pub fn filtered<F>(&self, keep: F) -> Self
    where
        F: Fn(&EntityId, &Row) -> bool,
    {
        let mut table = self.clone();
        table.rows.retain(|key, row| keep(key, row));
        table
    }

    /// Copy with `column` set to `value` on every row.
    pub fn with_constant(&self, column: &str, value: &str) -> Self {
        self.with_derived(column, |_, _| Some(value.to_string()))
    }

    /// Copy with `column` computed from each row; `None` leaves the cell null.
    pub fn with_derived<F>(&self, column: &str, derive: F) -> Self
    where
        F: Fn(&EntityId, &Row) -> Option<String>,
    {
        let mut table = self.clone();
        table.ensure_column(column);
        for (key, row) in table.rows.iter_mut() {
            match derive(key, row).filter(|v| !v.trim().is_empty()) {
                Some(value) => {
                    row.insert(column.to_string(), value);
                }
                None => {
                    row.remove(column);
                }
            }
        }
        table
    }

    /// Left join on the row key. Every row of `self` is kept; shared
    /// non-key columns are a conflict.
    pub fn left_join(&self, other: &WideTable) -> Result<Self> {
        self.join_with(other, |key, _| Some(key.clone()))
    }

    /// Left join where `self.column` matches the key of `other`.
    pub fn left_join_on(&self, column: &str, other: &WideTable) -> Result<Self> {
        self.join_with(other, |key, row| {
            if column == self.key_column {
                Some(key.clone())
            } else {
                row.get(column).map(|value| EntityId::new(value.as_str()))
            }
        })
    }

    fn join_with<F>(&self, other: &WideTable, lookup: F) -> Result<Self>
    where
        F: Fn(&EntityId, &Row) -> Option<EntityId>,
    {
        for column in &other.columns {
            if self.has_column(column) {
                return Err(ModelError::ColumnConflict {
                    column: column.clone(),
                });
            }
        }
        let mut table = self.clone();
        table.columns.extend(other.columns.iter().cloned());
        for (key, row) in table.rows.iter_mut() {
            let Some(other_key) = lookup(key, row) else {
                continue;
            };
            if let Some(other_row) = other.rows.get(&other_key) {
                row.extend(other_row.iter().map(|(c, v)| (c.clone(), v.clone())));
            }
        }
        Ok(table)
    }

    /// Re-key rows by a value derived from each row. The old key becomes an
    /// ordinary column. Missing or duplicate new keys are validation errors.
    pub fn rekey<F>(&self, key_column: &str, derive: F) -> Result<Self>
    where
        F: Fn(&EntityId, &Row) -> Option<String>,
    {
        let mut columns = vec![self.key_column.clone()];
        columns.extend(self.columns.iter().filter(|c| *c != key_column).cloned());
        let mut table = Self::new(self.name.clone(), key_column, columns);
        for (key, row) in &self.rows {
            let new_key = derive(key, row)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ModelError::InvalidIdentifier {
                    kind: key_column.to_string(),
                    value: format!("<missing for {} {key}>", self.key_column),
                })?;
            let mut values = row.clone();
            values.remove(key_column);
            values.insert(self.key_column.clone(), key.to_string());
            table.insert_row(EntityId::new(new_key), values)?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn tumors() -> WideTable {
        let mut table = WideTable::new("tumor", "encounter_num", cols(&["a", "b"]));
        table
            .insert_row(EntityId::from("10"), row(&[("a", "1"), ("b", "")]))
            .unwrap();
        table
            .insert_row(EntityId::from("9"), row(&[("a", "2"), ("b", "x")]))
            .unwrap();
        table
    }

    #[test]
    fn blank_values_are_null() {
        let table = tumors();
        assert_eq!(table.get(&EntityId::from("10"), "b"), None);
        assert_eq!(table.non_null_count("b"), 1);
        assert_eq!(table.records()[1], cols(&["10", "1", ""]));
    }

    #[test]
    fn rows_are_ordered_by_key() {
        let table = tumors();
        let keys: Vec<&str> = table.keys().map(EntityId::as_str).collect();
        assert_eq!(keys, vec!["9", "10"]);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut table = tumors();
        let err = table
            .insert_row(EntityId::from("9"), Row::new())
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateKey { .. }));
    }

    #[test]
    fn left_join_keeps_left_rows() {
        let mut dates = WideTable::new("dates", "encounter_num", cols(&["d"]));
        dates
            .insert_row(EntityId::from("9"), row(&[("d", "2015-01-01")]))
            .unwrap();
        dates
            .insert_row(EntityId::from("77"), row(&[("d", "2016-01-01")]))
            .unwrap();
        let joined = tumors().left_join(&dates).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.columns(), cols(&["a", "b", "d"]).as_slice());
        assert_eq!(joined.get(&EntityId::from("9"), "d"), Some("2015-01-01"));
        assert_eq!(joined.get(&EntityId::from("10"), "d"), None);
    }

    #[test]
    fn join_conflict_is_an_error() {
        let other = WideTable::new("other", "encounter_num", cols(&["a"]));
        assert!(tumors().left_join(&other).is_err());
    }

    #[test]
    fn left_join_on_column() {
        let mut patients = WideTable::new("patients", "study_id", cols(&["lang"]));
        patients
            .insert_row(EntityId::from("S1"), row(&[("lang", "en")]))
            .unwrap();
        let table = tumors().with_constant("study", "S1");
        let joined = table.left_join_on("study", &patients).unwrap();
        assert_eq!(joined.get(&EntityId::from("10"), "lang"), Some("en"));
    }

    #[test]
    fn rekey_moves_old_key_to_column() {
        let table = tumors()
            .rekey("tumor_id", |key, row| {
                Some(format!("{}:{}", key, row.get("a")?))
            })
            .unwrap();
        assert_eq!(table.key_column(), "tumor_id");
        assert_eq!(table.get(&EntityId::from("9:2"), "encounter_num"), Some("9"));
    }

    #[test]
    fn rekey_collisions_are_errors() {
        let result = tumors().rekey("tumor_id", |_, _| Some("same".to_string()));
        assert!(matches!(result, Err(ModelError::DuplicateKey { .. })));
        let result = tumors().rekey("tumor_id", |_, _| None);
        assert!(result.is_err());
    }

    #[test]
    fn transforms_do_not_alias() {
        let table = tumors();
        let derived = table.with_constant("c", "1");
        assert!(!table.has_column("c"));
        assert!(derived.has_column("c"));
        let selected = derived.select(&cols(&["c"]));
        assert_eq!(selected.columns(), cols(&["c"]).as_slice());
        assert_eq!(selected.get(&EntityId::from("9"), "a"), None);
    }

    #[test]
    fn melt_lists_non_null_cells() {
        let cells = tumors().melt();
        assert_eq!(cells.len(), 3);
        assert_eq!(
            cells[0],
            (EntityId::from("9"), "a".to_string(), "2".to_string())
        );
    }
}
