//! Identifier crosswalk and per-subject date shifts.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::ids::{Mrn, PatientNum, StudyId};

/// Subject-level de-identification offset in whole days.
///
/// `apply` subtracts the shift, `invert` adds it back, so
/// `invert(apply(t)) == t` for every timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct DateShift(i64);

impl DateShift {
    pub fn days(days: i64) -> Self {
        Self(days)
    }

    pub fn as_days(self) -> i64 {
        self.0
    }

    /// `identified - shift`.
    pub fn apply(self, identified: NaiveDateTime) -> Option<NaiveDateTime> {
        identified.checked_sub_signed(TimeDelta::try_days(self.0)?)
    }

    /// `deidentified + shift`.
    pub fn invert(self, deidentified: NaiveDateTime) -> Option<NaiveDateTime> {
        deidentified.checked_add_signed(TimeDelta::try_days(self.0)?)
    }
}

/// Consented participant roster row (`study_id, mrn`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub study_id: StudyId,
    pub mrn: Mrn,
}

/// Survey order row (`order_id, mrn`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyOrderEntry {
    pub order_id: String,
    pub mrn: Mrn,
}

/// Roster joined with survey orders: the MRN list to resolve.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsentedMrn {
    pub study_id: StudyId,
    pub order_id: String,
    pub mrn: Mrn,
}

/// Identity source row: MRN to warehouse patient and its date shift.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub patient_num: PatientNum,
    pub mrn: Mrn,
    pub date_shift: DateShift,
}

/// One crosswalk row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrosswalkEntry {
    pub patient_num: PatientNum,
    pub study_id: StudyId,
    pub date_shift: DateShift,
}

/// Read-only crosswalk keyed by patient number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Crosswalk {
    by_patient: BTreeMap<PatientNum, CrosswalkEntry>,
}

impl Crosswalk {
    /// Build a crosswalk. Both patient numbers and study ids must be unique.
    pub fn from_entries(entries: impl IntoIterator<Item = CrosswalkEntry>) -> Result<Self> {
        let mut by_patient = BTreeMap::new();
        let mut study_ids = BTreeSet::new();
        let mut dup_patients = BTreeSet::new();
        let mut dup_studies = BTreeSet::new();
        for entry in entries {
            if !study_ids.insert(entry.study_id.clone()) {
                dup_studies.insert(entry.study_id.to_string());
            }
            if by_patient.contains_key(&entry.patient_num) {
                dup_patients.insert(entry.patient_num.to_string());
                continue;
            }
            by_patient.insert(entry.patient_num, entry);
        }
        if !dup_patients.is_empty() {
            return Err(ModelError::DuplicateIdentifier {
                kind: "patient_num in crosswalk".to_string(),
                values: dup_patients.into_iter().collect(),
            });
        }
        if !dup_studies.is_empty() {
            return Err(ModelError::DuplicateIdentifier {
                kind: "study_id in crosswalk".to_string(),
                values: dup_studies.into_iter().collect(),
            });
        }
        Ok(Self { by_patient })
    }

    pub fn get(&self, patient: PatientNum) -> Option<&CrosswalkEntry> {
        self.by_patient.get(&patient)
    }

    pub fn study_id(&self, patient: PatientNum) -> Option<&StudyId> {
        self.get(patient).map(|entry| &entry.study_id)
    }

    pub fn shift(&self, patient: PatientNum) -> Option<DateShift> {
        self.get(patient).map(|entry| entry.date_shift)
    }

    pub fn contains(&self, patient: PatientNum) -> bool {
        self.by_patient.contains_key(&patient)
    }

    /// Entries ordered by study id.
    pub fn entries(&self) -> Vec<&CrosswalkEntry> {
        let mut entries: Vec<&CrosswalkEntry> = self.by_patient.values().collect();
        entries.sort_by(|a, b| a.study_id.cmp(&b.study_id));
        entries
    }

    pub fn len(&self) -> usize {
        self.by_patient.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_patient.is_empty()
    }
}
