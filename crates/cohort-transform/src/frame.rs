//! Record frames: keyed polars frames handed to output and upload.
//!
//! Every column of a record frame is a nullable `String` column, which is
//! what the import templates and the upload API expect.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use cohort_common::any_to_string_non_empty;
use cohort_ingest::{CsvTable, QUERY_TERM_COLUMNS, QueryTerm};
use cohort_model::{ModelError, WideTable};
use polars::prelude::*;

use crate::codebook::{DICT_COLS, FieldDef};
use crate::patient_set::{PATIENT_SET_COLUMNS, PatientSet};

/// A polars frame with the name and key column of the records it holds.
#[derive(Debug, Clone)]
pub struct RecordFrame {
    pub name: String,
    pub key_column: String,
    pub data: DataFrame,
}

impl RecordFrame {
    pub fn new(name: impl Into<String>, key_column: impl Into<String>, data: DataFrame) -> Self {
        Self {
            name: name.into(),
            key_column: key_column.into(),
            data,
        }
    }

    /// Frame with the table's header; row order follows the table keys.
    pub fn from_table(table: &WideTable) -> Result<Self> {
        let header = table.header();
        let mut values: Vec<Vec<Option<String>>> =
            vec![Vec::with_capacity(table.len()); header.len()];
        for (key, row) in table.iter() {
            values[0].push(Some(key.to_string()));
            for (idx, column) in header.iter().enumerate().skip(1) {
                values[idx].push(row.get(column).cloned());
            }
        }
        let data = string_frame(&header, values)
            .with_context(|| format!("build frame for {}", table.name()))?;
        Ok(Self::new(table.name(), table.key_column(), data))
    }

    pub fn record_count(&self) -> usize {
        self.data.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.data
            .get_column_names()
            .into_iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Rows `offset..offset + len`.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        Self {
            data: self.data.slice(offset as i64, len),
            ..self.clone()
        }
    }

    /// Key values in row order; null keys are empty strings.
    pub fn key_values(&self) -> Result<Vec<String>> {
        (0..self.record_count())
            .map(|idx| column_value_string(&self.data, &self.key_column, idx))
            .collect()
    }

    /// Fail when a key value repeats.
    pub fn ensure_unique_keys(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for key in self.key_values()? {
            if !seen.insert(key.clone()) {
                tracing::error!(
                    frame = %self.name,
                    key_column = %self.key_column,
                    "duplicate record key"
                );
                return Err(ModelError::DuplicateKey {
                    table: self.name.clone(),
                    key,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Cells of one row in column order; nulls are `None`.
    pub fn row_values(&self, idx: usize) -> Result<Vec<Option<String>>> {
        self.data
            .get_columns()
            .iter()
            .map(|column| {
                let value = column
                    .get(idx)
                    .with_context(|| format!("row {idx} of column {}", column.name()))?;
                Ok(any_to_string_non_empty(value))
            })
            .collect()
    }
}

/// Build a frame of nullable string columns.
pub fn string_frame(header: &[String], values: Vec<Vec<Option<String>>>) -> Result<DataFrame> {
    let columns: Vec<Column> = header
        .iter()
        .zip(values)
        .map(|(name, column)| Series::new(name.as_str().into(), column).into())
        .collect();
    DataFrame::new(columns).context("assemble string frame")
}

/// Read a CSV file with every column as text. The key column defaults to
/// the first column.
pub fn read_record_frame(path: &Path, key_column: Option<&str>) -> Result<RecordFrame> {
    let data = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .with_context(|| format!("open {}", path.display()))?
        .finish()
        .with_context(|| format!("read {}", path.display()))?;
    let first = data
        .get_column_names()
        .first()
        .map(ToString::to_string)
        .with_context(|| format!("{} has no columns", path.display()))?;
    let key_column = key_column.map_or(first, ToString::to_string);
    if data.column(&key_column).is_err() {
        anyhow::bail!("{} has no key column '{key_column}'", path.display());
    }
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::debug!(path = %path.display(), rows = data.height(), "read record frame");
    Ok(RecordFrame::new(name, key_column, data))
}

/// Cell as text; nulls and blanks are empty.
pub fn column_value_string(df: &DataFrame, name: &str, idx: usize) -> Result<String> {
    let value = df
        .column(name)
        .with_context(|| format!("missing column {name}"))?
        .get(idx)
        .with_context(|| format!("row {idx} of column {name}"))?;
    Ok(any_to_string_non_empty(value).unwrap_or_default())
}

/// Data dictionary frame with the REDCap header labels, in field order.
pub fn codebook_frame(fields: &[FieldDef]) -> Result<DataFrame> {
    let header: Vec<String> = FieldDef::header_labels()
        .iter()
        .map(ToString::to_string)
        .collect();
    let mut values: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(fields.len()); DICT_COLS.len()];
    for field in fields {
        for (idx, value) in field.values().into_iter().enumerate() {
            values[idx].push((!value.is_empty()).then(|| value.to_string()));
        }
    }
    string_frame(&header, values)
}

/// `result_instance_id, set_index, patient_num` frame.
pub fn patient_set_frame(set: &PatientSet) -> Result<DataFrame> {
    let header: Vec<String> = PATIENT_SET_COLUMNS.iter().map(ToString::to_string).collect();
    let mut values: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(set.len()); header.len()];
    for record in set.records() {
        for (idx, value) in record.into_iter().enumerate() {
            values[idx].push(Some(value));
        }
    }
    string_frame(&header, values)
}

/// Frame of a CSV table as read; blank cells become nulls.
pub fn table_frame(table: &CsvTable) -> Result<DataFrame> {
    let mut values: Vec<Vec<Option<String>>> =
        vec![Vec::with_capacity(table.len()); table.headers.len()];
    for row in &table.rows {
        for (idx, column) in values.iter_mut().enumerate() {
            let cell = table.value(row, idx);
            column.push((!cell.is_empty()).then(|| cell.to_string()));
        }
    }
    string_frame(&table.headers, values)
        .with_context(|| format!("build frame for {}", table.path.display()))
}

/// `id, item_key, concept_path, name_char, name` frame.
pub fn query_terms_frame(terms: &[QueryTerm]) -> Result<DataFrame> {
    let header: Vec<String> = QUERY_TERM_COLUMNS.iter().map(ToString::to_string).collect();
    let mut values: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(terms.len()); header.len()];
    for term in terms {
        for (idx, value) in term.values().into_iter().enumerate() {
            values[idx].push(Some(value));
        }
    }
    string_frame(&header, values)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use cohort_model::EntityId;

    use super::*;

    fn table() -> WideTable {
        let mut table = WideTable::new(
            "tumor",
            "v00_tumorid",
            vec!["v01_studyid".to_string(), "v52_language".to_string()],
        );
        table
            .insert_row(
                EntityId::from("S2:01"),
                BTreeMap::from([("v01_studyid".to_string(), "S2".to_string())]),
            )
            .unwrap();
        table
            .insert_row(
                EntityId::from("S1:01"),
                BTreeMap::from([
                    ("v01_studyid".to_string(), "S1".to_string()),
                    ("v52_language".to_string(), "english".to_string()),
                ]),
            )
            .unwrap();
        table
    }

    #[test]
    fn table_becomes_string_frame() {
        let frame = RecordFrame::from_table(&table()).unwrap();
        assert_eq!(frame.record_count(), 2);
        assert_eq!(
            frame.column_names(),
            vec!["v00_tumorid", "v01_studyid", "v52_language"]
        );
        assert_eq!(frame.key_values().unwrap(), vec!["S1:01", "S2:01"]);
        assert_eq!(
            column_value_string(&frame.data, "v52_language", 1).unwrap(),
            ""
        );
        assert_eq!(
            frame.row_values(0).unwrap(),
            vec![
                Some("S1:01".to_string()),
                Some("S1".to_string()),
                Some("english".to_string())
            ]
        );
    }

    #[test]
    fn duplicate_keys_are_detected() {
        let header = vec!["record_id".to_string(), "x".to_string()];
        let data = string_frame(
            &header,
            vec![
                vec![Some("a".into()), Some("a".into())],
                vec![Some("1".into()), None],
            ],
        )
        .unwrap();
        let frame = RecordFrame::new("meds", "record_id", data);
        assert!(frame.ensure_unique_keys().is_err());
        assert!(frame.slice(1, 1).ensure_unique_keys().is_ok());
    }

    #[test]
    fn codebook_frame_uses_header_labels() {
        let df = codebook_frame(&[FieldDef::text("ht", Some("Height"))]).unwrap();
        assert_eq!(df.width(), 16);
        assert_eq!(column_value_string(&df, "Field Label", 0).unwrap(), "Height");
    }

    #[test]
    fn csv_table_keeps_header_and_blanks_become_null() {
        let table = CsvTable {
            path: "ddict.csv".into(),
            headers: vec!["Variable / Field Name".to_string(), "Field Note".to_string()],
            rows: vec![vec!["rxcui".to_string(), String::new()]],
        };
        let df = table_frame(&table).unwrap();
        let names: Vec<String> = df.get_column_names().into_iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["Variable / Field Name", "Field Note"]);
        assert_eq!(df.column("Field Note").unwrap().null_count(), 1);
    }
}
