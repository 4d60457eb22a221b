//! Field dictionary: attribute id -> import-template field.
//!
//! Built once per run from the import template header (NAACCR fields are
//! named `v<NN>_<ITEM>_<label>`), optionally refined with validation types
//! from the data dictionary, and immutable afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::observation::AttributeId;

static NAACCR_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d{2,3}_(\d{3,4})_").expect("valid NAACCR field pattern"));

/// How a field's values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Coded,
    Date,
    Numeric,
    Text,
}

impl ValueType {
    /// Map a REDCap `text_validation_type_or_show_slider_number` value.
    pub fn from_validation(validation: &str) -> Self {
        let lower = validation.trim().to_lowercase();
        if lower.starts_with("date") {
            Self::Date
        } else if lower == "integer" || lower == "number" || lower.starts_with("number_") {
            Self::Numeric
        } else {
            Self::Coded
        }
    }
}

/// One dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub attribute: AttributeId,
    pub field_name: String,
    pub value_type: ValueType,
    pub validation: Option<String>,
}

impl FieldDef {
    pub fn new(attribute: AttributeId, field_name: impl Into<String>) -> Self {
        Self {
            attribute,
            field_name: field_name.into(),
            value_type: ValueType::default(),
            validation: None,
        }
    }

    pub fn with_validation(mut self, validation: impl Into<String>) -> Self {
        let validation = validation.into();
        self.value_type = ValueType::from_validation(&validation);
        self.validation = Some(validation);
        self
    }
}

/// Typed mapping of attribute id to field descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDictionary {
    entries: BTreeMap<AttributeId, FieldDef>,
}

/// Extract the NAACCR item number from a template field name.
///
/// ```
/// use cohort_model::dictionary::naaccr_item_of;
///
/// assert_eq!(naaccr_item_of("v15_0380_sequence_numbercentral"), Some(380));
/// assert_eq!(naaccr_item_of("v01_studyid"), None);
/// ```
pub fn naaccr_item_of(field_name: &str) -> Option<u32> {
    NAACCR_FIELD
        .captures(field_name)
        .and_then(|caps| caps.get(1))
        .and_then(|item| item.as_str().parse::<u32>().ok())
}

impl FieldDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build entries for every NAACCR-style column of an import template.
    pub fn from_template_columns(columns: &[String]) -> Result<Self> {
        let mut dictionary = Self::new();
        let mut names: Vec<&String> = columns.iter().collect();
        names.sort();
        for name in names {
            if let Some(item) = naaccr_item_of(name) {
                dictionary.insert(FieldDef::new(AttributeId::Item(item), name.clone()))?;
            }
        }
        Ok(dictionary)
    }

    /// Add an entry. Attribute ids and field names must both stay unique.
    pub fn insert(&mut self, def: FieldDef) -> Result<()> {
        if let Some(existing) = self.entries.get(&def.attribute) {
            return Err(ModelError::DictionaryConflict(format!(
                "attribute {} maps to both '{}' and '{}'",
                def.attribute, existing.field_name, def.field_name
            )));
        }
        if self.field(&def.field_name).is_some() {
            return Err(ModelError::DictionaryConflict(format!(
                "field '{}' mapped twice",
                def.field_name
            )));
        }
        self.entries.insert(def.attribute.clone(), def);
        Ok(())
    }

    /// Return a copy with validation types applied by field name.
    pub fn with_validations(&self, validations: &BTreeMap<String, String>) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(attribute, def)| {
                let def = match validations.get(&def.field_name) {
                    Some(validation) if !validation.trim().is_empty() => {
                        def.clone().with_validation(validation.trim())
                    }
                    _ => def.clone(),
                };
                (attribute.clone(), def)
            })
            .collect();
        Self { entries }
    }

    /// Copy holding only the given attributes.
    pub fn restricted_to(&self, attributes: &BTreeSet<AttributeId>) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(attribute, _)| attributes.contains(*attribute))
            .map(|(attribute, def)| (attribute.clone(), def.clone()))
            .collect();
        Self { entries }
    }

    pub fn get(&self, attribute: &AttributeId) -> Option<&FieldDef> {
        self.entries.get(attribute)
    }

    pub fn field(&self, field_name: &str) -> Option<&FieldDef> {
        self.entries
            .values()
            .find(|def| def.field_name == field_name)
    }

    pub fn attributes(&self) -> BTreeSet<AttributeId> {
        self.entries.keys().cloned().collect()
    }

    /// Field names in attribute order.
    pub fn field_names(&self) -> Vec<String> {
        self.entries
            .values()
            .map(|def| def.field_name.clone())
            .collect()
    }

    /// Field names of entries with the given value type.
    pub fn field_names_of(&self, value_type: ValueType) -> Vec<String> {
        self.entries
            .values()
            .filter(|def| def.value_type == value_type)
            .map(|def| def.field_name.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDef> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
