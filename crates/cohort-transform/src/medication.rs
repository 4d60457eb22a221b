//! Medication hierarchy resolution and exposure records.
//!
//! Classes are concept nodes whose display name starts with a bracketed
//! short code (`[AN000] ANTINEOPLASTICS`). Drugs are nodes with a drug code
//! (`RXCUI:...`) directly below a class that are not classes themselves.
//! A medication code may sit below several drugs (and a drug below several
//! classes); every code resolves to the minimum candidate by
//! (class code, class name, drug name, drug id, drug path).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use anyhow::Result;
use chrono::NaiveDateTime;
use cohort_common::{format_minute, format_precise};
use cohort_model::{
    ConceptNode, Crosswalk, EntityId, Fact, MedicationConfig, PatientNum, WideTable,
    normalize_path,
};
use regex::Regex;

static CLASS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([A-Za-z0-9]{2,7})\]\s*(.*)$").expect("valid class name pattern")
});

/// Record key column of medication exposure records.
pub const RECORD_ID: &str = "record_id";

/// A classification node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DrugClass {
    pub code: String,
    pub name: String,
    pub path: String,
}

impl DrugClass {
    /// Recognise a class node by its display name.
    pub fn from_node(node: &ConceptNode) -> Option<Self> {
        let caps = CLASS_NAME.captures(node.display_name.trim())?;
        Some(Self {
            code: caps.get(1)?.as_str().to_string(),
            name: caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
            path: node.concept_path.clone(),
        })
    }
}

/// A drug node together with one of its classes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DrugClassification {
    pub class_code: String,
    pub class_name: String,
    pub drug_name: String,
    /// Drug code without its prefix (the RXCUI).
    pub drug_id: String,
    pub drug_path: String,
}

/// Resolved classification of one medication code. `None` fields mean the
/// code has no drug ancestor under a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCode {
    pub concept_cd: String,
    pub display_name: String,
    pub classification: Option<DrugClassification>,
}

/// Medication concepts below the configured root.
#[derive(Debug, Clone, Default)]
pub struct MedicationHierarchy {
    concepts: Vec<ConceptNode>,
    classes: BTreeMap<String, DrugClass>,
    drugs: Vec<DrugClassification>,
}

impl MedicationHierarchy {
    pub fn build(concepts: &[ConceptNode], config: &MedicationConfig) -> Self {
        let root = normalize_path(&config.root_path);
        let concepts: Vec<ConceptNode> = concepts
            .iter()
            .filter(|node| node.concept_path.starts_with(&root))
            .cloned()
            .collect();
        let classes: BTreeMap<String, DrugClass> = concepts
            .iter()
            .filter_map(DrugClass::from_node)
            .map(|class| (class.path.clone(), class))
            .collect();

        let mut drugs = Vec::new();
        for node in &concepts {
            if classes.contains_key(&node.concept_path) {
                continue;
            }
            let Some(drug_id) = node.concept_code.strip_prefix(&config.drug_code_prefix) else {
                continue;
            };
            let Some(class) = classes.get(&node.parent_path()) else {
                continue;
            };
            drugs.push(DrugClassification {
                class_code: class.code.clone(),
                class_name: class.name.clone(),
                drug_name: node.display_name.clone(),
                drug_id: drug_id.to_string(),
                drug_path: node.concept_path.clone(),
            });
        }
        drugs.sort();
        drugs.dedup();

        let distinct_drugs: BTreeSet<&str> = drugs.iter().map(|d| d.drug_id.as_str()).collect();
        tracing::info!(
            concept_count = concepts.len(),
            class_count = classes.len(),
            drug_nodes = drugs.len(),
            distinct_drugs = distinct_drugs.len(),
            "built medication hierarchy"
        );
        if !concepts.is_empty() && drugs.is_empty() {
            tracing::warn!(
                concept_count = concepts.len(),
                class_count = classes.len(),
                "no drug concepts found directly below a class; every medication is unclassified"
            );
        }
        Self {
            concepts,
            classes,
            drugs,
        }
    }

    pub fn classes(&self) -> impl Iterator<Item = &DrugClass> {
        self.classes.values()
    }

    /// Drug nodes in classification order.
    pub fn drugs(&self) -> &[DrugClassification] {
        &self.drugs
    }

    /// Concept codes of every medication concept.
    pub fn medication_codes(&self) -> BTreeSet<&str> {
        self.concepts
            .iter()
            .map(|node| node.concept_code.as_str())
            .filter(|code| !code.is_empty())
            .collect()
    }

    /// One row per drug id, classified by the minimum candidate.
    pub fn drug_table(&self) -> BTreeMap<&str, &DrugClassification> {
        let mut table: BTreeMap<&str, &DrugClassification> = BTreeMap::new();
        // drugs is sorted, so the first entry per id is the minimum
        for drug in &self.drugs {
            table.entry(drug.drug_id.as_str()).or_insert(drug);
        }
        table
    }

    /// Resolve each requested code to at most one classification.
    ///
    /// Codes outside the hierarchy are absent from the result; codes inside
    /// it without a drug ancestor resolve to `classification: None`.
    pub fn resolve_codes<'a>(
        &self,
        codes: impl IntoIterator<Item = &'a str>,
    ) -> BTreeMap<String, ResolvedCode> {
        let wanted: BTreeSet<&str> = codes.into_iter().collect();
        let mut resolved: BTreeMap<String, ResolvedCode> = BTreeMap::new();
        for node in self
            .concepts
            .iter()
            .filter(|node| wanted.contains(node.concept_code.as_str()))
        {
            let best = self
                .drugs
                .iter()
                .filter(|drug| node.concept_path.starts_with(&drug.drug_path))
                .min();
            let entry = resolved
                .entry(node.concept_code.clone())
                .or_insert_with(|| ResolvedCode {
                    concept_cd: node.concept_code.clone(),
                    display_name: node.display_name.clone(),
                    classification: None,
                });
            if node.display_name < entry.display_name {
                entry.display_name = node.display_name.clone();
            }
            if let Some(best) = best {
                let better = entry
                    .classification
                    .as_ref()
                    .is_none_or(|current| best < current);
                if better {
                    entry.classification = Some(best.clone());
                }
            }
        }
        let unclassified = resolved
            .values()
            .filter(|code| code.classification.is_none())
            .count();
        tracing::info!(
            code_count = resolved.len(),
            unclassified,
            "resolved medication codes"
        );
        resolved
    }
}

/// One collapsed exposure: facts sharing (instance, patient, start).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Exposure {
    pub patient_num: PatientNum,
    pub start: NaiveDateTime,
    pub instance_num: Option<i64>,
    pub concept_cd: String,
    pub end: Option<NaiveDateTime>,
}

/// Collapse medication facts to exposures.
///
/// Only facts whose concept code is in `medication_codes` count. Within a
/// group the minimum concept code and the latest end date are kept. Facts
/// without a start date cannot form an exposure and are skipped.
pub fn collapse_exposures(facts: &[Fact], medication_codes: &BTreeSet<&str>) -> Vec<Exposure> {
    let mut groups: BTreeMap<(Option<i64>, PatientNum, NaiveDateTime), Exposure> =
        BTreeMap::new();
    let mut undated = 0usize;
    for fact in facts
        .iter()
        .filter(|f| medication_codes.contains(f.concept_cd.as_str()))
    {
        let Some(start) = fact.start_date else {
            undated += 1;
            continue;
        };
        groups
            .entry((fact.instance_num, fact.patient_num, start))
            .and_modify(|exposure| {
                if fact.concept_cd < exposure.concept_cd {
                    exposure.concept_cd = fact.concept_cd.clone();
                }
                exposure.end = exposure.end.max(fact.end_date);
            })
            .or_insert_with(|| Exposure {
                patient_num: fact.patient_num,
                start,
                instance_num: fact.instance_num,
                concept_cd: fact.concept_cd.clone(),
                end: fact.end_date,
            });
    }
    if undated > 0 {
        tracing::warn!(undated, "medication facts without a start date skipped");
    }
    let mut exposures: Vec<Exposure> = groups.into_values().collect();
    exposures.sort();
    exposures
}

/// Exposure records plus coverage counts.
#[derive(Debug, Clone)]
pub struct ExposureRecords {
    pub table: WideTable,
    /// Exposures of patients missing from the crosswalk.
    pub dropped_exposures: usize,
    pub dropped_patients: BTreeSet<PatientNum>,
    pub unclassified: usize,
}

/// Build de-identified exposure records keyed by `record_id`.
pub fn exposure_records(
    exposures: &[Exposure],
    resolved: &BTreeMap<String, ResolvedCode>,
    crosswalk: &Crosswalk,
    access_group: &str,
) -> Result<ExposureRecords> {
    let columns = [
        "redcap_data_access_group",
        "exposure_start",
        "exposure_end",
        "raw_med_name",
        "rxcui",
        "drug_name",
        "va_class",
        "medication_exposure_complete",
    ]
    .map(String::from);
    let mut table = WideTable::new("medication_exposure", RECORD_ID, columns);
    let mut dropped_exposures = 0usize;
    let mut dropped_patients = BTreeSet::new();
    let mut unclassified = 0usize;

    for exposure in exposures {
        let Some(code) = resolved.get(&exposure.concept_cd) else {
            continue;
        };
        let entry = crosswalk.get(exposure.patient_num);
        let Some((entry, start)) =
            entry.and_then(|e| e.date_shift.apply(exposure.start).map(|start| (e, start)))
        else {
            dropped_exposures += 1;
            dropped_patients.insert(exposure.patient_num);
            continue;
        };
        let instance = exposure
            .instance_num
            .map(|n| n.to_string())
            .unwrap_or_default();
        // exposures are distinct per start to the second, so the id must be too
        let record_id = format!("{}_{}_{}", entry.study_id, format_precise(start), instance);
        let start = format_minute(start);

        let mut row = BTreeMap::new();
        row.insert("redcap_data_access_group".to_string(), access_group.to_string());
        if let Some(end) = exposure.end.and_then(|end| entry.date_shift.apply(end)) {
            row.insert("exposure_end".to_string(), format_minute(end));
        }
        row.insert("exposure_start".to_string(), start);
        row.insert("raw_med_name".to_string(), code.display_name.clone());
        match &code.classification {
            Some(drug) => {
                row.insert("rxcui".to_string(), drug.drug_id.clone());
                row.insert("drug_name".to_string(), drug.drug_name.clone());
                row.insert("va_class".to_string(), drug.class_code.clone());
            }
            None => unclassified += 1,
        }
        row.insert("medication_exposure_complete".to_string(), "2".to_string());
        table.insert_row(EntityId::new(record_id), row)?;
    }

    if dropped_exposures > 0 {
        tracing::warn!(
            dropped_exposures,
            patients = dropped_patients.len(),
            "exposures of patients outside the crosswalk dropped"
        );
    }
    tracing::info!(
        record_count = table.len(),
        unclassified,
        "built medication exposure records"
    );
    Ok(ExposureRecords {
        table,
        dropped_exposures,
        dropped_patients,
        unclassified,
    })
}
