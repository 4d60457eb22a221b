use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Warehouse-internal patient number (`patient_num`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatientNum(i64);

impl PatientNum {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn parse(value: &str) -> Result<Self, ModelError> {
        let trimmed = value.trim();
        trimmed
            .parse::<i64>()
            .ok()
            .or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.fract() == 0.0)
                    .map(|v| v as i64)
            })
            .map(Self)
            .ok_or_else(|| ModelError::InvalidIdentifier {
                kind: "patient_num".to_string(),
                value: value.to_string(),
            })
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for PatientNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row key of a wide table: a tumor encounter, a patient, or a composite
/// record id.
///
/// Ordering is numeric for all-digit keys (so encounter `9` sorts before
/// `10`) and lexical otherwise; numeric keys sort before non-numeric ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u128> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse::<u128>().ok()
    }
}

impl Ord for EntityId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(left), Some(right)) => left.cmp(&right).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for EntityId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<PatientNum> for EntityId {
    fn from(value: PatientNum) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External study identifier assigned to a consented participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudyId(String);

impl StudyId {
    pub fn new(value: impl Into<String>) -> Result<Self, ModelError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ModelError::InvalidIdentifier {
                kind: "study_id".to_string(),
                value,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Medical record number.
///
/// All-digit MRNs are canonicalised without leading zeros, so `"000123"`
/// and `"123"` name the same patient.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mrn(String);

impl Mrn {
    pub fn new(value: impl Into<String>) -> Result<Self, ModelError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ModelError::InvalidIdentifier {
                kind: "MRN".to_string(),
                value,
            });
        }
        let canonical = if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            let stripped = trimmed.trim_start_matches('0');
            if stripped.is_empty() { "0" } else { stripped }
        } else {
            trimmed
        };
        Ok(Self(canonical.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Mrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_sort_numerically() {
        let mut ids: Vec<EntityId> = ["10", "9", "abc", "100", "2"]
            .into_iter()
            .map(EntityId::from)
            .collect();
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(EntityId::as_str).collect();
        assert_eq!(sorted, vec!["2", "9", "10", "100", "abc"]);
    }

    #[test]
    fn entity_id_leading_zero_keys_stay_distinct() {
        let a = EntityId::from("01");
        let b = EntityId::from("1");
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn mrn_strips_leading_zeros() {
        assert_eq!(Mrn::new("000123").unwrap(), Mrn::new("123").unwrap());
        assert_eq!(Mrn::new("0000").unwrap().as_str(), "0");
        assert_eq!(Mrn::new(" A0012 ").unwrap().as_str(), "A0012");
        assert!(Mrn::new("  ").is_err());
    }

    #[test]
    fn patient_num_accepts_float_exports() {
        assert_eq!(PatientNum::parse("42").unwrap().get(), 42);
        assert_eq!(PatientNum::parse("42.0").unwrap().get(), 42);
        assert!(PatientNum::parse("42.5").is_err());
        assert!(PatientNum::parse("").is_err());
    }

    #[test]
    fn study_id_rejects_blank() {
        assert!(StudyId::new(" ").is_err());
        assert_eq!(StudyId::new(" S-01 ").unwrap().as_str(), "S-01");
    }
}
