//! Warehouse facts and entity-attribute-value observations.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, PatientNum};

/// Identifies what an observation measures.
///
/// `Item` is a NAACCR item number; `Concept` is any other coded scheme or
/// concept path (for example `SEER_SITE`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeId {
    Item(u32),
    Concept(String),
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item(item) => write!(f, "{item}"),
            Self::Concept(name) => f.write_str(name),
        }
    }
}

/// The value half of an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObservationValue {
    /// Categorical code (e.g. `01`).
    Code(String),
    /// Numeric measurement (`nval_num`).
    Number(f64),
    /// No value; the observation's timestamp is the datum (dated items).
    Marker,
}

/// One EAV row after concept-code parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub subject_id: PatientNum,
    pub entity_id: EntityId,
    pub attribute: AttributeId,
    pub value: ObservationValue,
    pub timestamp: Option<NaiveDateTime>,
}

impl Observation {
    /// The categorical code, when this is a non-blank coded observation.
    pub fn code(&self) -> Option<&str> {
        match &self.value {
            ObservationValue::Code(code) if !code.trim().is_empty() => Some(code.as_str()),
            _ => None,
        }
    }

    pub fn is_dated(&self) -> bool {
        matches!(self.value, ObservationValue::Marker) && self.timestamp.is_some()
    }
}

/// A reduced EAV cell ready for pivoting: entity, attribute, rendered value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EavCell {
    pub entity_id: EntityId,
    pub attribute: AttributeId,
    pub value: String,
}

impl EavCell {
    pub fn new(entity_id: EntityId, attribute: AttributeId, value: impl Into<String>) -> Self {
        Self {
            entity_id,
            attribute,
            value: value.into(),
        }
    }
}

/// Raw warehouse fact row (`observation_fact` export).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub patient_num: PatientNum,
    pub encounter_num: EntityId,
    pub concept_cd: String,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub instance_num: Option<i64>,
    pub nval_num: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(value: ObservationValue, timestamp: Option<NaiveDateTime>) -> Observation {
        Observation {
            subject_id: PatientNum::new(1),
            entity_id: EntityId::from("10"),
            attribute: AttributeId::Item(390),
            value,
            timestamp,
        }
    }

    #[test]
    fn blank_codes_are_not_codes() {
        assert_eq!(
            observation(ObservationValue::Code("01".into()), None).code(),
            Some("01")
        );
        assert_eq!(observation(ObservationValue::Code(" ".into()), None).code(), None);
        assert_eq!(observation(ObservationValue::Marker, None).code(), None);
    }

    #[test]
    fn dated_requires_marker_and_timestamp() {
        let ts = chrono::NaiveDate::from_ymd_opt(2015, 1, 2)
            .and_then(|d| d.and_hms_opt(0, 0, 0));
        assert!(observation(ObservationValue::Marker, ts).is_dated());
        assert!(!observation(ObservationValue::Marker, None).is_dated());
        assert!(!observation(ObservationValue::Code("1".into()), ts).is_dated());
    }

    #[test]
    fn attribute_display() {
        assert_eq!(AttributeId::Item(380).to_string(), "380");
        assert_eq!(AttributeId::Concept("SEER_SITE".into()).to_string(), "SEER_SITE");
    }
}
