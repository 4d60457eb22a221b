//! Codebook normalization into REDCap data dictionary rows.
//!
//! A codebook lists one row per (field, choice): `field_label`,
//! `choice_code`, `code_label`, optionally `field_name` and `form_name`.
//! [`Codebook::convert`] groups the rows into one dropdown [`FieldDef`] per
//! field.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use anyhow::{Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// REDCap field names may not exceed this length.
pub const MAX_FIELD_NAME_LENGTH: usize = 26;

/// Form used when a codebook row names none.
pub const DEFAULT_FORM: &str = "codebook";

/// Data dictionary columns: (name, header label).
pub const DICT_COLS: [(&str, &str); 16] = [
    ("field_name", "Variable / Field Name"),
    ("form_name", "Form Name"),
    ("section_header", "Section Header"),
    ("field_type", "Field Type"),
    ("field_label", "Field Label"),
    (
        "select_choices_or_calculations",
        "Choices, Calculations, OR Slider Labels",
    ),
    ("field_note", "Field Note"),
    (
        "text_validation_type_or_show_slider_number",
        "Text Validation Type OR Show Slider Number",
    ),
    ("text_validation_min", "Text Validation Min"),
    ("text_validation_max", "Text Validation Max"),
    ("identifier", "Identifier?"),
    ("branching_logic", "Branching Logic (Show field only if...)"),
    ("required_field", "Required Field?"),
    ("custom_alignment", "Custom Alignment"),
    ("question_number", "Question Number (surveys only)"),
    ("matrix_group_name", "Matrix Group Name"),
];

static INVALID_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9a-z_]+").expect("valid field name pattern"));
static LEADING_NON_LETTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^a-z]+").expect("valid leading pattern"));
static REPEATED_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("valid underscore pattern"));

/// One data dictionary row. Empty strings are unset cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub field_name: String,
    pub form_name: String,
    pub section_header: String,
    pub field_type: String,
    pub field_label: String,
    pub select_choices_or_calculations: String,
    pub field_note: String,
    pub text_validation_type_or_show_slider_number: String,
    pub text_validation_min: String,
    pub text_validation_max: String,
    pub identifier: String,
    pub branching_logic: String,
    pub required_field: String,
    pub custom_alignment: String,
    pub question_number: String,
    pub matrix_group_name: String,
}

impl FieldDef {
    /// Plain text field labelled `label` (or its name).
    pub fn text(name: impl Into<String>, label: Option<&str>) -> Self {
        let field_name = name.into();
        Self {
            field_label: label.map_or_else(|| field_name.clone(), ToString::to_string),
            field_name,
            field_type: "text".to_string(),
            ..Self::default()
        }
    }

    /// Dropdown with the given `(code, label)` choices.
    pub fn dropdown(name: impl Into<String>, label: Option<&str>, pairs: &[(String, String)]) -> Self {
        Self {
            field_type: "dropdown".to_string(),
            select_choices_or_calculations: encode_choices(pairs),
            ..Self::text(name, label)
        }
    }

    pub fn on_form(mut self, form: impl Into<String>) -> Self {
        self.form_name = form.into();
        self
    }

    pub fn choices(&self) -> Vec<(String, String)> {
        parse_choices(&self.select_choices_or_calculations)
    }

    /// Cells in [`DICT_COLS`] order.
    pub fn values(&self) -> [&str; 16] {
        [
            &self.field_name,
            &self.form_name,
            &self.section_header,
            &self.field_type,
            &self.field_label,
            &self.select_choices_or_calculations,
            &self.field_note,
            &self.text_validation_type_or_show_slider_number,
            &self.text_validation_min,
            &self.text_validation_max,
            &self.identifier,
            &self.branching_logic,
            &self.required_field,
            &self.custom_alignment,
            &self.question_number,
            &self.matrix_group_name,
        ]
        .map(String::as_str)
    }

    /// Header labels in [`DICT_COLS`] order.
    pub fn header_labels() -> [&'static str; 16] {
        DICT_COLS.map(|(_, label)| label)
    }
}

/// Render choices as `code, label` lines.
///
/// `,` and `|` in labels become `*`; no pairs at all yields `1, N/A`.
///
/// ```
/// use cohort_transform::codebook::encode_choices;
///
/// let pairs = vec![("1".to_string(), "Colon".to_string()), ("2".to_string(), "Spleen, other".to_string())];
/// assert_eq!(encode_choices(&pairs), "1, Colon\n2, Spleen* other");
/// assert_eq!(encode_choices(&[]), "1, N/A");
/// ```
pub fn encode_choices(pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return "1, N/A".to_string();
    }
    pairs
        .iter()
        .map(|(code, label)| format!("{code}, {}", label.replace([',', '|'], "*")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse `code, label` lines (newline or `|` separated).
pub fn parse_choices(encoded: &str) -> Vec<(String, String)> {
    encoded
        .split(['\n', '|'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once(',') {
            Some((code, label)) => (code.trim().to_string(), label.trim().to_string()),
            None => (item.to_string(), String::new()),
        })
        .collect()
}

/// Make a valid field name from free text.
///
/// ```
/// use cohort_transform::codebook::name_from_hint;
///
/// assert_eq!(name_from_hint("_stuff___stuff_", 0), "stuff_stuff");
/// assert_eq!(name_from_hint("x1234567890123456789012345678901234567890", 0).len(), 26);
/// assert_eq!(name_from_hint("123", 0), "x");
/// ```
pub fn name_from_hint(hint: &str, suffix_length: usize) -> String {
    let lower = hint.to_lowercase();
    let name = INVALID_RUN.replace_all(&lower, "_");
    let name = LEADING_NON_LETTERS.replace(&name, "");
    // only ASCII remains, so byte truncation is safe
    let max = MAX_FIELD_NAME_LENGTH.saturating_sub(suffix_length);
    let name = &name[..name.len().min(max)];
    let name = REPEATED_UNDERSCORE.replace_all(name, "_");
    let name = name.trim_end_matches('_');
    if name.is_empty() {
        "x".to_string()
    } else {
        name.to_string()
    }
}

/// One codebook row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodebookEntry {
    pub field_label: String,
    pub choice_code: String,
    pub code_label: String,
    pub field_name: Option<String>,
    pub form_name: Option<String>,
}

/// Codebook rows in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Codebook {
    entries: Vec<CodebookEntry>,
}

impl Codebook {
    pub fn new(entries: Vec<CodebookEntry>) -> Self {
        Self { entries }
    }

    /// Build from records with lower-case column names.
    pub fn from_records(records: &[BTreeMap<String, String>]) -> Result<Self> {
        let mut entries = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            let get = |name: &str| record.get(name).map(|v| v.trim().to_string());
            let Some(field_label) = get("field_label").filter(|v| !v.is_empty()) else {
                bail!("codebook row {} has no field_label", idx + 2);
            };
            entries.push(CodebookEntry {
                field_label,
                choice_code: get("choice_code").unwrap_or_default(),
                code_label: get("code_label").unwrap_or_default(),
                field_name: get("field_name").filter(|v| !v.is_empty()),
                form_name: get("form_name").filter(|v| !v.is_empty()),
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One dropdown per field, in order of first appearance.
    ///
    /// Fields are grouped by explicit name when given, otherwise by label.
    /// Generated names that collide get a numeric suffix. Rows without a
    /// choice code add no choice; repeated codes keep their first label.
    pub fn convert(&self) -> Vec<FieldDef> {
        struct Group<'a> {
            label: &'a str,
            name: Option<&'a str>,
            form: Option<&'a str>,
            pairs: Vec<(String, String)>,
            codes: BTreeSet<&'a str>,
        }

        let mut order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, Group<'_>> = BTreeMap::new();
        for entry in &self.entries {
            let key = entry
                .field_name
                .clone()
                .unwrap_or_else(|| entry.field_label.clone());
            let group = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                Group {
                    label: &entry.field_label,
                    name: entry.field_name.as_deref(),
                    form: entry.form_name.as_deref(),
                    pairs: Vec::new(),
                    codes: BTreeSet::new(),
                }
            });
            let code = entry.choice_code.as_str();
            if !code.is_empty() && group.codes.insert(code) {
                group
                    .pairs
                    .push((code.to_string(), entry.code_label.clone()));
            }
        }

        let mut used: BTreeSet<String> = groups
            .values()
            .filter_map(|group| group.name.map(ToString::to_string))
            .collect();
        let mut fields = Vec::with_capacity(order.len());
        for key in &order {
            let Some(group) = groups.get(key) else {
                continue;
            };
            let name = match group.name {
                Some(name) => name.to_string(),
                None => unique_name(group.label, &mut used),
            };
            fields.push(
                FieldDef::dropdown(name, Some(group.label), &group.pairs)
                    .on_form(group.form.unwrap_or(DEFAULT_FORM)),
            );
        }
        tracing::info!(
            row_count = self.entries.len(),
            field_count = fields.len(),
            "converted codebook"
        );
        fields
    }
}

fn unique_name(label: &str, used: &mut BTreeSet<String>) -> String {
    let base = name_from_hint(label, 0);
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 2usize;
    loop {
        let suffix = format!("_{n}");
        let candidate = format!("{}{suffix}", name_from_hint(label, suffix.len()));
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
