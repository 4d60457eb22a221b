//! Patient-set rows for registering a cohort as a query result.

use std::collections::BTreeSet;

use anyhow::Result;
use cohort_model::{ModelError, PatientNum};
use serde::{Deserialize, Serialize};

/// Output columns of a patient-set load file.
pub const PATIENT_SET_COLUMNS: [&str; 3] = ["result_instance_id", "set_index", "patient_num"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatientSetMember {
    pub result_instance_id: i64,
    /// 1-based position in the input list.
    pub set_index: usize,
    pub patient_num: PatientNum,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientSet {
    pub result_instance_id: i64,
    pub members: Vec<PatientSetMember>,
}

impl PatientSet {
    /// Number the patients in input order. Repeated patients are a
    /// validation error.
    pub fn build(result_instance_id: i64, patients: &[PatientNum]) -> Result<Self> {
        let mut seen = BTreeSet::new();
        let duplicates: BTreeSet<String> = patients
            .iter()
            .filter(|patient| !seen.insert(**patient))
            .map(ToString::to_string)
            .collect();
        if !duplicates.is_empty() {
            return Err(ModelError::DuplicateIdentifier {
                kind: "patient_num in patient list".to_string(),
                values: duplicates.into_iter().collect(),
            }
            .into());
        }
        let members = patients
            .iter()
            .enumerate()
            .map(|(idx, patient)| PatientSetMember {
                result_instance_id,
                set_index: idx + 1,
                patient_num: *patient,
            })
            .collect();
        tracing::info!(
            result_instance_id,
            set_size = patients.len(),
            "built patient set"
        );
        Ok(Self {
            result_instance_id,
            members,
        })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Rows in [`PATIENT_SET_COLUMNS`] order.
    pub fn records(&self) -> Vec<[String; 3]> {
        self.members
            .iter()
            .map(|m| {
                [
                    m.result_instance_id.to_string(),
                    m.set_index.to_string(),
                    m.patient_num.to_string(),
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patients(nums: &[i64]) -> Vec<PatientNum> {
        nums.iter().copied().map(PatientNum::new).collect()
    }

    #[test]
    fn members_are_numbered_from_one() {
        let set = PatientSet::build(42, &patients(&[30, 10, 20])).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.members[0].set_index, 1);
        assert_eq!(set.members[0].patient_num, PatientNum::new(30));
        assert_eq!(set.records()[2], ["42".to_string(), "3".to_string(), "20".to_string()]);
    }

    #[test]
    fn duplicate_patients_are_rejected() {
        let err = PatientSet::build(1, &patients(&[1, 2, 1])).unwrap_err();
        assert!(err.to_string().contains("duplicate patient_num"));
    }
}
