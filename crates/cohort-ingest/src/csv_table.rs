use std::path::{Path, PathBuf};

use csv::ReaderBuilder;

use crate::error::{IngestError, Result};

/// A CSV file held as trimmed strings, first row as header.
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('\u{feff}');
    let mut parts = trimmed.split_whitespace();
    let mut normalized = String::new();
    if let Some(first) = parts.next() {
        normalized.push_str(first);
        for part in parts {
            normalized.push(' ');
            normalized.push_str(part);
        }
    }
    normalized
}

fn normalize_cell(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').to_string()
}

pub fn read_csv_table(path: &Path) -> Result<CsvTable> {
    if !path.exists() {
        return Err(IngestError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| IngestError::CsvParse {
            path: path.to_path_buf(),
            source,
        })?;
    let mut records = reader.records();
    let headers: Vec<String> = match records.next() {
        Some(record) => record
            .map_err(|source| IngestError::CsvParse {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .map(normalize_header)
            .collect(),
        None => {
            return Err(IngestError::EmptyCsv {
                path: path.to_path_buf(),
            });
        }
    };
    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|source| IngestError::CsvParse {
            path: path.to_path_buf(),
            source,
        })?;
        let row: Vec<String> = (0..headers.len())
            .map(|idx| record.get(idx).map(normalize_cell).unwrap_or_default())
            .collect();
        if row.iter().all(String::is_empty) {
            continue;
        }
        rows.push(row);
    }
    tracing::debug!(
        path = %path.display(),
        columns = headers.len(),
        rows = rows.len(),
        "read CSV"
    );
    Ok(CsvTable {
        path: path.to_path_buf(),
        headers,
        rows,
    })
}

impl CsvTable {
    /// Column index by name; exact match first, then case-insensitive.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|header| header == name)
            .or_else(|| {
                self.headers
                    .iter()
                    .position(|header| header.eq_ignore_ascii_case(name))
            })
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| IngestError::MissingColumn {
                column: name.to_string(),
                path: self.path.clone(),
            })
    }

    /// Cell text; empty for short rows.
    pub fn value<'a>(&self, row: &'a [String], idx: usize) -> &'a str {
        row.get(idx).map(String::as_str).unwrap_or("")
    }

    /// Cell text, `None` when blank.
    pub fn optional<'a>(&self, row: &'a [String], idx: Option<usize>) -> Option<&'a str> {
        idx.map(|idx| self.value(row, idx)).filter(|v| !v.is_empty())
    }

    /// 1-based data row number for error messages (header is row 1).
    pub fn row_number(row_idx: usize) -> usize {
        row_idx + 2
    }

    pub fn invalid(&self, field: &str, value: &str, row_idx: usize) -> IngestError {
        IngestError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            path: self.path.clone(),
            row: Self::row_number(row_idx),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_header_and_pads_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");
        std::fs::write(&path, "\u{feff}Study_ID , MRN\nS1,0042\n,\nS2\n").unwrap();
        let table = read_csv_table(&path).unwrap();
        assert_eq!(table.headers, vec!["Study_ID", "MRN"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1], vec!["S2".to_string(), String::new()]);
        assert_eq!(table.column_index("mrn"), Some(1));
        assert!(table.require_column("order_id").is_err());
    }

    #[test]
    fn missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        assert!(matches!(
            read_csv_table(&missing),
            Err(IngestError::FileNotFound { .. })
        ));
        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, "").unwrap();
        assert!(matches!(
            read_csv_table(&empty),
            Err(IngestError::EmptyCsv { .. })
        ));
    }
}
