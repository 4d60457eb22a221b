//! Import templates: the exact column set the receiving system accepts.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::table::WideTable;

/// Prefix pandas-style writers give to unnamed trailing columns.
const UNNAMED_PREFIX: &str = "Unnamed: ";

/// Ordered template header. The first column is the record key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTemplate {
    columns: Vec<String>,
}

/// What `conform` had to change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConformReport {
    /// Template columns with no data column; left null.
    pub missing_in_data: Vec<String>,
    /// Data columns not in the template; removed.
    pub dropped_columns: Vec<String>,
}

impl ConformReport {
    pub fn is_exact(&self) -> bool {
        self.missing_in_data.is_empty() && self.dropped_columns.is_empty()
    }
}

impl ImportTemplate {
    /// Build from a raw CSV header.
    ///
    /// Blank and `Unnamed: N` columns are discarded; a repeated column name is
    /// a validation error.
    pub fn from_headers<I, S>(headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut columns = Vec::new();
        let mut seen = BTreeSet::new();
        for header in headers {
            let header = header.as_ref().trim();
            if header.is_empty() || header.starts_with(UNNAMED_PREFIX) {
                continue;
            }
            if !seen.insert(header.to_string()) {
                return Err(ModelError::DuplicateTemplateColumn {
                    column: header.to_string(),
                });
            }
            columns.push(header.to_string());
        }
        if columns.is_empty() {
            return Err(ModelError::EmptyTemplate);
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn key_column(&self) -> &str {
        // from_headers guarantees at least one column
        self.columns.first().map(String::as_str).unwrap_or_default()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Return a table with exactly the template columns, in template order.
    ///
    /// The table must already be keyed by the template's first column.
    pub fn conform(&self, table: &WideTable) -> Result<(WideTable, ConformReport)> {
        let key = self.key_column();
        if table.key_column() != key {
            return Err(ModelError::TemplateKeyMismatch {
                expected: table.key_column().to_string(),
                found: key.to_string(),
            });
        }
        let data_columns = &self.columns[1..];
        let missing_in_data = data_columns
            .iter()
            .filter(|column| !table.has_column(column))
            .cloned()
            .collect();
        let dropped_columns = table
            .columns()
            .iter()
            .filter(|column| !self.contains(column))
            .cloned()
            .collect();
        let conformed = table.select(data_columns);
        Ok((
            conformed,
            ConformReport {
                missing_in_data,
                dropped_columns,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::ids::EntityId;

    #[test]
    fn trailing_artifacts_are_removed() {
        let template =
            ImportTemplate::from_headers(["record_id", "a", "", "Unnamed: 3", "b"]).unwrap();
        assert_eq!(template.columns(), ["record_id", "a", "b"]);
        assert_eq!(template.key_column(), "record_id");
    }

    #[test]
    fn duplicate_and_empty_headers_are_errors() {
        assert!(matches!(
            ImportTemplate::from_headers(["record_id", "a", "a"]),
            Err(ModelError::DuplicateTemplateColumn { .. })
        ));
        assert!(matches!(
            ImportTemplate::from_headers(["", "Unnamed: 1"]),
            Err(ModelError::EmptyTemplate)
        ));
    }

    #[test]
    fn conform_keeps_exactly_template_columns() {
        let mut table = WideTable::new("t", "record_id", vec!["b".to_string(), "z".to_string()]);
        table
            .insert_row(
                EntityId::from("1"),
                BTreeMap::from([
                    ("b".to_string(), "x".to_string()),
                    ("z".to_string(), "y".to_string()),
                ]),
            )
            .unwrap();
        let template = ImportTemplate::from_headers(["record_id", "a", "b"]).unwrap();
        let (conformed, report) = template.conform(&table).unwrap();
        assert_eq!(conformed.header(), ["record_id", "a", "b"]);
        assert_eq!(conformed.get(&EntityId::from("1"), "b"), Some("x"));
        assert_eq!(report.missing_in_data, ["a"]);
        assert_eq!(report.dropped_columns, ["z"]);
        assert!(!report.is_exact());
    }

    #[test]
    fn conform_requires_matching_key() {
        let table = WideTable::new("t", "tumor_id", Vec::new());
        let template = ImportTemplate::from_headers(["record_id"]).unwrap();
        assert!(matches!(
            template.conform(&table),
            Err(ModelError::TemplateKeyMismatch { .. })
        ));
    }
}
