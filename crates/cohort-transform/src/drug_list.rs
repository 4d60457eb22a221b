//! `code, label` drug lists: built from a medication hierarchy, combined
//! across sites, and set as the choices of a data dictionary field.
//!
//! Labels read `<class> <rx label> <name>`; combined lists are ordered by
//! class, then name, then numeric code.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use cohort_ingest::CsvTable;
use regex::Regex;

use crate::codebook::DICT_COLS;
use crate::medication::{DrugClassification, MedicationHierarchy};

/// Data dictionary field that holds the drug choices.
pub const DRUG_CHOICE_FIELD: &str = "rxcui";

static COUNT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" \[[<\d].*").expect("valid count suffix pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrugEntry {
    pub code: String,
    pub label: String,
}

impl DrugEntry {
    /// `(class, name, numeric code)`; non-numeric codes sort last.
    fn sort_key(&self) -> (&str, &str, u64, &str) {
        let mut parts = self.label.splitn(3, ' ');
        let class = parts.next().unwrap_or_default();
        let _rx_label = parts.next();
        let name = parts.next().unwrap_or_default();
        let numeric = self.code.parse::<u64>().unwrap_or(u64::MAX);
        (class, name, numeric, self.code.as_str())
    }
}

/// Parse one list: `code, label` per line, blank lines skipped.
pub fn parse_drug_list(text: &str, source: &Path) -> Result<Vec<DrugEntry>> {
    let mut entries = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (code, label) = line.split_once(", ").with_context(|| {
            format!("{}:{}: expected 'code, label'", source.display(), idx + 1)
        })?;
        entries.push(DrugEntry {
            code: code.trim().to_string(),
            label: label.trim().to_string(),
        });
    }
    Ok(entries)
}

/// Merge lists; for the same code a later list wins.
pub fn combine_drug_lists(lists: impl IntoIterator<Item = Vec<DrugEntry>>) -> Vec<DrugEntry> {
    let mut by_code: BTreeMap<String, String> = BTreeMap::new();
    for list in lists {
        for entry in list {
            by_code.insert(entry.code, entry.label);
        }
    }
    let mut combined: Vec<DrugEntry> = by_code
        .into_iter()
        .map(|(code, label)| DrugEntry { code, label })
        .collect();
    combined.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    tracing::info!(drug_count = combined.len(), "combined drug lists");
    combined
}

/// Render as `code, label` lines.
pub fn render_drug_list(entries: &[DrugEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("{}, {}\n", entry.code, entry.label))
        .collect()
}

/// Drop a trailing count annotation such as ` [1,234 facts]` or ` [<10]`.
pub fn strip_counts(name: &str) -> &str {
    COUNT_SUFFIX.find(name).map_or(name, |m| &name[..m.start()])
}

/// One entry per drug id, labelled `[<class>] <prefix><id> <name>`.
///
/// Each drug keeps its minimum classification; entries are ordered by
/// class code, then drug name, then numeric id.
pub fn drug_choices(hierarchy: &MedicationHierarchy, drug_code_prefix: &str) -> Vec<DrugEntry> {
    let mut drugs: Vec<&DrugClassification> = hierarchy.drug_table().into_values().collect();
    drugs.sort_by(|a, b| choice_order(a).cmp(&choice_order(b)));
    let entries: Vec<DrugEntry> = drugs
        .into_iter()
        .map(|drug| DrugEntry {
            code: drug.drug_id.clone(),
            label: format!(
                "[{}] {}{} {}",
                drug.class_code,
                drug_code_prefix,
                drug.drug_id,
                strip_counts(&drug.drug_name)
            ),
        })
        .collect();
    tracing::info!(drug_count = entries.len(), "built drug choices");
    entries
}

fn choice_order(drug: &DrugClassification) -> (&str, &str, u64, &str) {
    (
        drug.class_code.as_str(),
        drug.drug_name.as_str(),
        drug.drug_id.parse::<u64>().unwrap_or(u64::MAX),
        drug.drug_id.as_str(),
    )
}

/// Single-line choices cell: `code, label | code, label`.
pub fn choices_cell(entries: &[DrugEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("{}, {}", entry.code, entry.label))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Replace the choices of `field` in a data dictionary.
///
/// Columns are found by header label or by REDCap column name.
pub fn set_field_choices(dictionary: &mut CsvTable, field: &str, choices: &str) -> Result<()> {
    let column = |(name, label): (&str, &str)| {
        dictionary
            .column_index(label)
            .or_else(|| dictionary.column_index(name))
            .with_context(|| format!("{} has no '{label}' column", dictionary.path.display()))
    };
    let name_idx = column(DICT_COLS[0])?;
    let choices_idx = column(DICT_COLS[5])?;
    let path = dictionary.path.clone();
    let row = dictionary
        .rows
        .iter_mut()
        .find(|row| row.get(name_idx).is_some_and(|name| name == field))
        .with_context(|| format!("{} has no field '{field}'", path.display()))?;
    let cell = row
        .get_mut(choices_idx)
        .with_context(|| format!("{}: short row for field '{field}'", path.display()))?;
    *cell = choices.to_string();
    tracing::debug!(field, choices_len = choices.len(), "set field choices");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use cohort_model::{ConceptNode, MedicationConfig};

    use super::*;

    fn list(text: &str) -> Vec<DrugEntry> {
        parse_drug_list(text, Path::new("test.txt")).unwrap()
    }

    #[test]
    fn later_lists_override_and_order_is_class_name_code() {
        let first = list("200, [AN000] RX tamoxifen\n10, [CN101] RX morphine\n");
        let second = list("\n9, [AN000] RX letrozole\n200, [AN000] RX anastrozole\n100, [AN000] RX letrozole\n");
        let combined = combine_drug_lists([first, second]);
        let codes: Vec<&str> = combined.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["200", "9", "100", "10"]);
        assert_eq!(combined[0].label, "[AN000] RX anastrozole");
        assert_eq!(
            render_drug_list(&combined[..1]),
            "200, [AN000] RX anastrozole\n"
        );
    }

    #[test]
    fn malformed_line_names_its_location() {
        let err = parse_drug_list("1, a b c\nbroken\n", Path::new("x.txt")).unwrap_err();
        assert_eq!(err.to_string(), "x.txt:2: expected 'code, label'");
    }

    fn hierarchy() -> MedicationHierarchy {
        let node = |path: &str, code: &str, name: &str| ConceptNode::new(path, code, name);
        let concepts = vec![
            node(r"\i2b2\Medications\[HS000] HORMONES\", "", "[HS000] HORMONES"),
            node(r"\i2b2\Medications\[HS000] HORMONES\RXCUI:10324\", "RXCUI:10324", "tamoxifen [1,234 facts]"),
            node(r"\i2b2\Medications\[AN000] ANTINEOPLASTICS\", "", "[AN000] ANTINEOPLASTICS"),
            node(r"\i2b2\Medications\[AN000] ANTINEOPLASTICS\RXCUI:10324\", "RXCUI:10324", "tamoxifen [1,234 facts]"),
            node(r"\i2b2\Medications\[AN000] ANTINEOPLASTICS\RXCUI:84857\", "RXCUI:84857", "anastrozole [<10 patients]"),
        ];
        MedicationHierarchy::build(&concepts, &MedicationConfig::default())
    }

    #[test]
    fn counts_are_stripped_from_names() {
        assert_eq!(strip_counts("tamoxifen [1,234 facts]"), "tamoxifen");
        assert_eq!(strip_counts("morphine [<10 patients]"), "morphine");
        assert_eq!(strip_counts("vitamin [D] complex"), "vitamin [D] complex");
    }

    #[test]
    fn drug_choices_list_each_drug_once_under_its_first_class() {
        let choices = drug_choices(&hierarchy(), "RXCUI:");
        assert_eq!(
            render_drug_list(&choices),
            "84857, [AN000] RXCUI:84857 anastrozole\n10324, [AN000] RXCUI:10324 tamoxifen\n"
        );
        assert_eq!(
            choices_cell(&choices),
            "84857, [AN000] RXCUI:84857 anastrozole | 10324, [AN000] RXCUI:10324 tamoxifen"
        );
    }

    #[test]
    fn field_choices_are_replaced_in_place() {
        let mut dictionary = CsvTable {
            path: PathBuf::from("med_ddict.csv"),
            headers: vec![
                "Variable / Field Name".to_string(),
                "Form Name".to_string(),
                "Field Type".to_string(),
                "Choices, Calculations, OR Slider Labels".to_string(),
            ],
            rows: vec![
                vec!["record_id".into(), "med".into(), "text".into(), String::new()],
                vec!["rxcui".into(), "med".into(), "dropdown".into(), "1, old".into()],
            ],
        };
        set_field_choices(&mut dictionary, DRUG_CHOICE_FIELD, "7, new | 8, newer").unwrap();
        assert_eq!(dictionary.rows[1][3], "7, new | 8, newer");
        assert_eq!(dictionary.rows[0][3], "");

        let err = set_field_choices(&mut dictionary, "va_class", "x").unwrap_err();
        assert_eq!(err.to_string(), "med_ddict.csv has no field 'va_class'");
    }
}
