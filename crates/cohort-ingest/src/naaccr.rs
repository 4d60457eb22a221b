//! NAACCR fixed-width record ingestion.
//!
//! A record layout gives each NAACCR item a 1-based inclusive column range.
//! Every line of a registry extract yields one EAV cell per dictionary field
//! with a non-blank value, keyed by the value of a configured key item
//! (item 20, patient id number, by default).
//!
//! Column ranges count bytes. Extracts are read as raw bytes; a field that
//! is not valid UTF-8 is decoded as Latin-1.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use cohort_common::parse_i64;
use cohort_model::{AttributeId, EavCell, EntityId, FieldDef, FieldDictionary};

use crate::csv_table::read_csv_table;
use crate::error::{IngestError, Result};

/// Default key item: Patient ID Number.
pub const DEFAULT_KEY_ITEM: u32 = 20;

/// Column range of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutItem {
    pub item: u32,
    pub name: String,
    /// 1-based, inclusive.
    pub column_start: usize,
    /// 1-based, inclusive.
    pub column_end: usize,
}

impl LayoutItem {
    /// The item's text in `line`, `None` when the line is too short.
    pub fn slice<'a>(&self, line: &'a [u8]) -> Option<Cow<'a, str>> {
        line.get(self.column_start - 1..self.column_end)
            .map(decode_field)
    }
}

fn decode_field(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.iter().copied().map(char::from).collect()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordLayout {
    items: BTreeMap<u32, LayoutItem>,
}

impl RecordLayout {
    pub fn from_items(path: &Path, items: impl IntoIterator<Item = LayoutItem>) -> Result<Self> {
        let layout_error = |reason: String| IngestError::Layout {
            path: path.to_path_buf(),
            reason,
        };
        let mut by_item = BTreeMap::new();
        for item in items {
            if item.column_start == 0 || item.column_end < item.column_start {
                return Err(layout_error(format!(
                    "item {} has invalid columns {}..{}",
                    item.item, item.column_start, item.column_end
                )));
            }
            if by_item.contains_key(&item.item) {
                return Err(layout_error(format!("item {} listed twice", item.item)));
            }
            by_item.insert(item.item, item);
        }
        Ok(Self { items: by_item })
    }

    /// Read `item, name, column_start, column_end` rows; rows without a
    /// column range are skipped.
    pub fn read(path: &Path) -> Result<Self> {
        let table = read_csv_table(path)?;
        let item_idx = table.require_column("item")?;
        let name_idx = table.column_index("name");
        let start_idx = table.require_column("column_start")?;
        let end_idx = table.require_column("column_end")?;
        let mut items = Vec::new();
        for (row_idx, row) in table.rows.iter().enumerate() {
            let start = table.value(row, start_idx);
            let end = table.value(row, end_idx);
            if start.is_empty() || end.is_empty() {
                continue;
            }
            let raw_item = table.value(row, item_idx);
            let item = parse_i64(raw_item)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| table.invalid("item", raw_item, row_idx))?;
            let column_start = parse_i64(start)
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| table.invalid("column_start", start, row_idx))?;
            let column_end = parse_i64(end)
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| table.invalid("column_end", end, row_idx))?;
            items.push(LayoutItem {
                item,
                name: table.optional(row, name_idx).unwrap_or_default().to_string(),
                column_start,
                column_end,
            });
        }
        Self::from_items(path, items)
    }

    pub fn get(&self, item: u32) -> Option<&LayoutItem> {
        self.items.get(&item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone)]
struct BoundField {
    item: LayoutItem,
    date_ymd: bool,
}

/// Splits fixed-width lines into EAV cells.
#[derive(Debug, Clone)]
pub struct FixedWidthReader {
    key: LayoutItem,
    fields: Vec<BoundField>,
    dictionary: FieldDictionary,
    unmapped: Vec<u32>,
}

/// Outcome of reading an extract.
#[derive(Debug, Clone, Default)]
pub struct NaaccrRead {
    pub cells: Vec<EavCell>,
    pub line_count: usize,
    /// Lines whose key item is blank or out of range.
    pub skipped_lines: usize,
    /// Lines that are not valid UTF-8.
    pub non_utf8_lines: usize,
}

impl FixedWidthReader {
    /// Bind dictionary items to layout columns.
    ///
    /// The key item is added to the dictionary as `key_field` when the
    /// dictionary does not already map it. Dictionary items missing from
    /// the layout are reported by [`FixedWidthReader::unmapped_items`].
    pub fn new(
        layout_path: &Path,
        layout: &RecordLayout,
        dictionary: &FieldDictionary,
        key_item: u32,
        key_field: &str,
    ) -> Result<Self> {
        let key = layout.get(key_item).cloned().ok_or_else(|| IngestError::Layout {
            path: PathBuf::from(layout_path),
            reason: format!("key item {key_item} has no column range"),
        })?;
        let mut dictionary = dictionary.clone();
        if dictionary.get(&AttributeId::Item(key_item)).is_none() {
            dictionary
                .insert(FieldDef::new(AttributeId::Item(key_item), key_field))
                .map_err(|source| IngestError::Validation {
                    path: layout_path.to_path_buf(),
                    source,
                })?;
        }
        let mut fields = Vec::new();
        let mut unmapped = Vec::new();
        for def in dictionary.iter() {
            let AttributeId::Item(item) = def.attribute else {
                continue;
            };
            match layout.get(item) {
                Some(layout_item) => fields.push(BoundField {
                    item: layout_item.clone(),
                    date_ymd: def
                        .validation
                        .as_deref()
                        .is_some_and(|v| v.eq_ignore_ascii_case("date_ymd")),
                }),
                None => unmapped.push(item),
            }
        }
        if !unmapped.is_empty() {
            tracing::warn!(
                unmapped_count = unmapped.len(),
                "dictionary items without a layout column range"
            );
        }
        Ok(Self {
            key,
            fields,
            dictionary,
            unmapped,
        })
    }

    /// Dictionary used for pivoting, including the key field.
    pub fn dictionary(&self) -> &FieldDictionary {
        &self.dictionary
    }

    pub fn unmapped_items(&self) -> &[u32] {
        &self.unmapped
    }

    /// Cells for one line; empty when the key is blank.
    pub fn line_cells(&self, line: &[u8]) -> Vec<EavCell> {
        let Some(key) = self.key.slice(line) else {
            return Vec::new();
        };
        let key = key.trim();
        if key.is_empty() {
            return Vec::new();
        }
        let entity = EntityId::new(key);
        self.fields
            .iter()
            .filter_map(|field| {
                let raw = field.item.slice(line)?;
                let raw = raw.trim();
                if raw.is_empty() {
                    return None;
                }
                let value = if field.date_ymd {
                    format_ymd(raw)
                } else {
                    raw.to_string()
                };
                Some(EavCell::new(
                    entity.clone(),
                    AttributeId::Item(field.item.item),
                    value,
                ))
            })
            .collect()
    }

    pub fn read(&self, mut reader: impl BufRead) -> std::io::Result<NaaccrRead> {
        let mut result = NaaccrRead::default();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let mut line = buf.as_slice();
            while let [rest @ .., b'\n' | b'\r'] = line {
                line = rest;
            }
            result.line_count += 1;
            if std::str::from_utf8(line).is_err() {
                result.non_utf8_lines += 1;
            }
            let cells = self.line_cells(line);
            if cells.is_empty() {
                result.skipped_lines += 1;
                continue;
            }
            result.cells.extend(cells);
        }
        Ok(result)
    }

    pub fn read_file(&self, path: &Path) -> Result<NaaccrRead> {
        let file = std::fs::File::open(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                IngestError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                IngestError::FileRead {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let result = self
            .read(std::io::BufReader::new(file))
            .map_err(|source| IngestError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(
            line_count = result.line_count,
            cell_count = result.cells.len(),
            skipped_lines = result.skipped_lines,
            non_utf8_lines = result.non_utf8_lines,
            "read NAACCR extract"
        );
        Ok(result)
    }
}

/// `YYYYMMDD` -> `YYYY-MM-DD`; other shapes are returned unchanged.
fn format_ymd(raw: &str) -> String {
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..])
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn layout() -> RecordLayout {
        RecordLayout::from_items(
            Path::new("layout.csv"),
            vec![
                LayoutItem {
                    item: 20,
                    name: "Patient ID Number".into(),
                    column_start: 1,
                    column_end: 4,
                },
                LayoutItem {
                    item: 380,
                    name: "Sequence Number--Central".into(),
                    column_start: 5,
                    column_end: 6,
                },
                LayoutItem {
                    item: 390,
                    name: "Date of Diagnosis".into(),
                    column_start: 7,
                    column_end: 14,
                },
            ],
        )
        .unwrap()
    }

    fn reader() -> FixedWidthReader {
        let dictionary = FieldDictionary::from_template_columns(&[
            "v15_0380_sequence_numbercentral".to_string(),
            "v21_0390_date_of_diagnosis".to_string(),
            "v30_0999_not_in_layout".to_string(),
        ])
        .unwrap()
        .with_validations(&BTreeMap::from([(
            "v21_0390_date_of_diagnosis".to_string(),
            "date_ymd".to_string(),
        )]));
        FixedWidthReader::new(Path::new("layout.csv"), &layout(), &dictionary, 20, "mrn").unwrap()
    }

    #[test]
    fn line_yields_cells_per_field() {
        let reader = reader();
        let cells = reader.line_cells(b"0042  20140302");
        let values: Vec<(String, String)> = cells
            .iter()
            .map(|c| (c.attribute.to_string(), c.value.clone()))
            .collect();
        assert_eq!(
            values,
            vec![
                ("20".to_string(), "0042".to_string()),
                ("390".to_string(), "2014-03-02".to_string()),
            ]
        );
        assert_eq!(cells[0].entity_id.as_str(), "0042");
        assert_eq!(reader.unmapped_items(), &[999]);
        assert_eq!(reader.dictionary().field("mrn").unwrap().attribute, AttributeId::Item(20));
    }

    #[test]
    fn short_lines_and_blank_keys() {
        let reader = reader();
        let cells = reader.line_cells(b"004201");
        assert_eq!(cells.len(), 2);
        assert!(reader.line_cells(b"    01").is_empty());
        let read = reader.read("0042012014\n    \n".as_bytes()).unwrap();
        assert_eq!(read.line_count, 2);
        assert_eq!(read.skipped_lines, 1);
    }

    #[test]
    fn latin1_lines_are_decoded_per_field() {
        let reader = reader();
        let read = reader
            .read(&b"0042\xe9120140302\r\n0043  20150101\n"[..])
            .unwrap();
        assert_eq!(read.line_count, 2);
        assert_eq!(read.non_utf8_lines, 1);
        let values: Vec<(&str, &str)> = read
            .cells
            .iter()
            .map(|c| (c.entity_id.as_str(), c.value.as_str()))
            .collect();
        assert_eq!(
            values,
            vec![
                ("0042", "0042"),
                ("0042", "\u{e9}1"),
                ("0042", "2014-03-02"),
                ("0043", "0043"),
                ("0043", "2015-01-01"),
            ]
        );
    }

    #[test]
    fn invalid_layouts() {
        let bad = RecordLayout::from_items(
            Path::new("l.csv"),
            vec![LayoutItem {
                item: 1,
                name: String::new(),
                column_start: 5,
                column_end: 4,
            }],
        );
        assert!(matches!(bad, Err(IngestError::Layout { .. })));
        let missing_key = FixedWidthReader::new(
            Path::new("l.csv"),
            &layout(),
            &FieldDictionary::new(),
            10,
            "key",
        );
        assert!(missing_key.is_err());
    }

    #[test]
    fn ymd_formatting() {
        assert_eq!(format_ymd("20140302"), "2014-03-02");
        assert_eq!(format_ymd("2014"), "2014");
    }
}
