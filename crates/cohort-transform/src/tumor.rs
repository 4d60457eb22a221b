//! Per-tumor record assembly.
//!
//! Registry observations are pivoted per tumor encounter, joined with
//! windowed vitals and patient-level fields, re-keyed by tumor id and
//! conformed to the tumor import template.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use cohort_ingest::{code_suffix, facts_to_observations};
use cohort_model::{
    AttributeId, ConceptNode, ConformReport, Crosswalk, DemographicTerm, DiagnosticReport,
    DriftSummary, EntityId, Fact, FieldDef, FieldDictionary, ImportTemplate, Observation,
    PatientNum, RunConfig, TumorConfig, WideTable, normalize_path,
};

use crate::pivot::{PivotReport, pivot_registry};
use crate::window::{FieldNaming, WindowSpec, index_events, measurements, resolve_windows, vitals_table};

/// Key column of the intermediate per-encounter tables.
pub const ENCOUNTER_KEY: &str = "encounter_num";

const ACCESS_GROUP_FIELD: &str = "redcap_data_access_group";

/// Unknown demographic code and its replacement.
const UNKNOWN_CODE: &str = "@";
const NO_INFORMATION: &str = "NI";

/// Build the tumor field dictionary from the template header.
///
/// NAACCR columns become item entries; validation types come from the data
/// dictionary. The SEER site concept is added when the template carries
/// its field.
pub fn tumor_dictionary(
    template: &ImportTemplate,
    validations: &BTreeMap<String, String>,
    config: &TumorConfig,
) -> Result<FieldDictionary> {
    let mut dictionary = FieldDictionary::from_template_columns(template.columns())
        .context("build field dictionary from tumor template")?
        .with_validations(validations);
    if template.contains(&config.seer_field) {
        dictionary
            .insert(FieldDef::new(seer_attribute(config), config.seer_field.clone()))
            .context("add SEER site field")?;
    }
    tracing::info!(field_count = dictionary.len(), "built tumor field dictionary");
    Ok(dictionary)
}

fn seer_attribute(config: &TumorConfig) -> AttributeId {
    AttributeId::Concept(config.seer_prefix.trim_end_matches(':').to_string())
}

/// `<study_id>:<central sequence | hospital sequence | XX>`.
pub fn tumor_id(study_id: &str, central: Option<&str>, hospital: Option<&str>) -> String {
    let sequence = central
        .filter(|s| !s.trim().is_empty())
        .or(hospital.filter(|s| !s.trim().is_empty()))
        .unwrap_or("XX");
    format!("{study_id}:{sequence}")
}

/// Patient-level demographic codes: `(patient, field) -> "c1,c2"`.
///
/// A fact counts for a term when its concept code belongs to a concept
/// below the term's path. Codes are the part after the first `:`; the
/// unknown code `@` is reported as `NI`.
pub fn demographics(
    facts: &[Fact],
    concepts: &[ConceptNode],
    terms: &[DemographicTerm],
) -> BTreeMap<(PatientNum, String), String> {
    let mut fields_by_code: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for term in terms {
        let prefix = normalize_path(&term.concept_path);
        for node in concepts
            .iter()
            .filter(|node| node.concept_path.starts_with(&prefix))
            .filter(|node| !node.concept_code.is_empty())
        {
            fields_by_code
                .entry(node.concept_code.as_str())
                .or_default()
                .insert(term.field_name.as_str());
        }
    }

    let mut codes: BTreeMap<(PatientNum, String), BTreeSet<String>> = BTreeMap::new();
    for fact in facts {
        let Some(fields) = fields_by_code.get(fact.concept_cd.as_str()) else {
            continue;
        };
        let code = match code_suffix(&fact.concept_cd).trim() {
            UNKNOWN_CODE => NO_INFORMATION,
            code => code,
        };
        for field in fields {
            codes
                .entry((fact.patient_num, (*field).to_string()))
                .or_default()
                .insert(code.to_string());
        }
    }
    codes
        .into_iter()
        .map(|(key, values)| (key, values.into_iter().collect::<Vec<_>>().join(",")))
        .collect()
}

/// One row per crosswalk subject keyed by study id: consent flags and
/// demographics.
pub fn patient_table(
    crosswalk: &Crosswalk,
    demographics: &BTreeMap<(PatientNum, String), String>,
    config: &TumorConfig,
) -> Result<WideTable> {
    let columns = config
        .consent_fields
        .iter()
        .cloned()
        .chain(config.demographics.iter().map(|term| term.field_name.clone()));
    let mut table = WideTable::new("patient", config.study_id_field.clone(), columns);
    for entry in crosswalk.entries() {
        let mut row: BTreeMap<String, String> = config
            .consent_fields
            .iter()
            .map(|field| (field.clone(), "1".to_string()))
            .collect();
        for term in &config.demographics {
            if let Some(value) = demographics.get(&(entry.patient_num, term.field_name.clone())) {
                row.insert(term.field_name.clone(), value.clone());
            }
        }
        table.insert_row(EntityId::new(entry.study_id.as_str()), row)?;
    }
    Ok(table)
}

/// Inputs of one tumor assembly run.
#[derive(Debug, Clone, Copy)]
pub struct TumorInputs<'a> {
    pub facts: &'a [Fact],
    pub concepts: &'a [ConceptNode],
    pub crosswalk: &'a Crosswalk,
    pub template: &'a ImportTemplate,
    pub dictionary: &'a FieldDictionary,
}

/// Assembled tumor records and everything worth reporting about them.
#[derive(Debug, Clone)]
pub struct TumorRecords {
    pub table: WideTable,
    pub pivot: PivotReport,
    pub conform: ConformReport,
    pub drift: DriftSummary<u32>,
    pub diagnostics: DiagnosticReport,
}

/// Assemble one conformed record per tumor.
pub fn assemble_tumors(inputs: &TumorInputs<'_>, config: &RunConfig) -> Result<TumorRecords> {
    let tumor = &config.tumor;
    let mut diagnostics = DiagnosticReport::new();

    let prefixes = [tumor.naaccr_prefix.as_str(), tumor.seer_prefix.as_str()];
    let (observations, unparsed) =
        facts_to_observations(inputs.facts, &tumor.naaccr_prefix, &prefixes);
    diagnostics.warn("registry", unparsed, "registry concept codes could not be parsed");

    let registry = pivot_registry(
        "tumor",
        ENCOUNTER_KEY,
        &observations,
        inputs.dictionary,
        inputs.crosswalk,
    )?;
    diagnostics.warn(
        "registry",
        registry.report.unknown_cell_count,
        "registry cells with items missing from the dictionary",
    );
    diagnostics.warn(
        "registry",
        registry.unshifted_subjects.len(),
        "patients with registry dates but no date shift",
    );
    diagnostics.info(
        "registry",
        registry.report.collision_count,
        "tumor items with conflicting values (minimum kept)",
    );
    diagnostics.info(
        "registry",
        registry.mixed_attributes.len(),
        "items observed both coded and dated (coded kept)",
    );

    let drift = item_drift(&observations, inputs.dictionary);
    diagnostics.info("drift", drift.data_only.len(), "items in data but not in the dictionary");
    diagnostics.info(
        "drift",
        drift.dictionary_only.len(),
        "dictionary items without data",
    );

    // study ids
    let subjects = entity_subjects(&observations);
    let with_study = registry.table.with_derived(&tumor.study_id_field, |key, _| {
        subjects
            .get(key)
            .and_then(|patient| inputs.crosswalk.study_id(*patient))
            .map(ToString::to_string)
    });
    let tumors = with_study.filtered(|_, row| row.contains_key(&tumor.study_id_field));
    let unconsented = with_study.len() - tumors.len();
    diagnostics.warn("crosswalk", unconsented, "tumors of patients outside the crosswalk");
    if unconsented > 0 {
        tracing::warn!(unconsented, "dropped tumors without a study id");
    }

    // vitals
    let index_code = format!("{}{}:", tumor.naaccr_prefix, tumor.diagnosis_item);
    let events = index_events(inputs.facts, &index_code);
    let vitals_root = normalize_path(&config.vitals.concept_path);
    let vital_codes: BTreeSet<String> = inputs
        .concepts
        .iter()
        .filter(|node| node.concept_path.starts_with(&vitals_root))
        .filter(|node| !node.concept_code.is_empty())
        .map(|node| node.concept_code.clone())
        .collect();
    let vitals = measurements(inputs.facts, &vital_codes);
    let hits = resolve_windows(&events, &vitals, &WindowSpec::from(&config.vitals));
    let naming = FieldNaming::from(&config.vitals);
    let (vitals_by_tumor, unshifted_vitals) = vitals_table(
        &hits,
        inputs.crosswalk,
        &naming,
        &config.vitals.offsets_years,
        ENCOUNTER_KEY,
    );
    diagnostics.warn("vitals", unshifted_vitals, "windowed vitals without a date shift");
    tracing::info!(
        index_events = events.len(),
        measurements = vitals.len(),
        windows = hits.len(),
        "resolved vitals windows"
    );

    // patient fields
    let demographic_codes = demographics(inputs.facts, inputs.concepts, &tumor.demographics);
    let patients = patient_table(inputs.crosswalk, &demographic_codes, tumor)?;

    let joined = tumors
        .left_join(&vitals_by_tumor)?
        .left_join_on(&tumor.study_id_field, &patients)?;

    let keyed = joined.rekey(&tumor.tumor_id_field, |_, row| {
        let study = row.get(&tumor.study_id_field)?;
        Some(tumor_id(
            study,
            row.get(&tumor.central_sequence_field).map(String::as_str),
            row.get(&tumor.hospital_sequence_field).map(String::as_str),
        ))
    })?;
    let data_columns: Vec<String> = keyed
        .columns()
        .iter()
        .filter(|column| *column != ENCOUNTER_KEY)
        .cloned()
        .collect();
    let keyed = keyed.select(&data_columns);

    let (conformed, conform) = inputs
        .template
        .conform(&keyed)
        .context("conform tumor records to the import template")?;
    diagnostics.info(
        "template",
        conform.missing_in_data.len(),
        "template columns without data",
    );
    diagnostics.info(
        "template",
        conform.dropped_columns.len(),
        "data columns not in the template",
    );

    let table = finish_form_fields(&conformed, inputs.template, config, &mut diagnostics);
    tracing::info!(
        record_count = table.len(),
        column_count = table.columns().len(),
        warnings = diagnostics.warning_count(),
        "assembled tumor records"
    );
    Ok(TumorRecords {
        table,
        pivot: registry.report,
        conform,
        drift,
        diagnostics,
    })
}

fn entity_subjects(observations: &[Observation]) -> BTreeMap<EntityId, PatientNum> {
    let mut subjects: BTreeMap<EntityId, PatientNum> = BTreeMap::new();
    for obs in observations {
        subjects
            .entry(obs.entity_id.clone())
            .and_modify(|patient| *patient = (*patient).min(obs.subject_id))
            .or_insert(obs.subject_id);
    }
    subjects
}

fn item_numbers<'a>(attributes: impl Iterator<Item = &'a AttributeId>) -> BTreeSet<u32> {
    attributes
        .filter_map(|attribute| match attribute {
            AttributeId::Item(item) => Some(*item),
            AttributeId::Concept(_) => None,
        })
        .collect()
}

/// Item numbers seen in data versus item numbers in the dictionary.
pub fn item_drift(observations: &[Observation], dictionary: &FieldDictionary) -> DriftSummary<u32> {
    let in_data = item_numbers(observations.iter().map(|obs| &obs.attribute));
    let in_dictionary = item_numbers(dictionary.iter().map(|def| &def.attribute));
    let drift = DriftSummary::compare(&in_data, &in_dictionary);
    if drift.has_drift() {
        tracing::warn!(
            data_only = drift.data_only.len(),
            dictionary_only = drift.dictionary_only.len(),
            both = drift.both.len(),
            "registry items differ from the field dictionary"
        );
    }
    drift
}

/// Access group and form-completion fields, set only where the template
/// has the column.
fn finish_form_fields(
    table: &WideTable,
    template: &ImportTemplate,
    config: &RunConfig,
    diagnostics: &mut DiagnosticReport,
) -> WideTable {
    let mut table = table.clone();
    if template.contains(ACCESS_GROUP_FIELD) {
        table = table.with_constant(ACCESS_GROUP_FIELD, &config.site_access_group);
    } else {
        diagnostics.warn("template", 1, "template has no data access group column");
    }
    for rule in &config.tumor.completion {
        if !template.contains(&rule.field) {
            tracing::warn!(field = %rule.field, "completion field missing from template");
            diagnostics.warn("template", 1, format!("completion field {} missing", rule.field));
            continue;
        }
        table = match &rule.when_present {
            None => table.with_constant(&rule.field, &rule.value),
            Some(source) => table.with_derived(&rule.field, |_, row| {
                row.contains_key(source).then(|| rule.value.clone())
            }),
        };
    }
    table
}

#[cfg(test)]
mod tests {
    use cohort_model::{CrosswalkEntry, DateShift, StudyId};

    use super::*;

    #[test]
    fn tumor_id_prefers_central_then_hospital() {
        assert_eq!(tumor_id("S1", Some("01"), Some("02")), "S1:01");
        assert_eq!(tumor_id("S1", Some(""), Some("02")), "S1:02");
        assert_eq!(tumor_id("S1", None, None), "S1:XX");
    }

    #[test]
    fn demographic_codes_are_sorted_and_unknown_is_ni() {
        let concepts = vec![
            ConceptNode::new(r"\i2b2\Demographics\Language\english\", "DEM|LANGUAGE:english", "English"),
            ConceptNode::new(r"\i2b2\Demographics\Language\spanish\", "DEM|LANGUAGE:spanish", "Spanish"),
            ConceptNode::new(r"\i2b2\Demographics\Language\unknown\", "DEM|LANGUAGE:@", "Unknown"),
        ];
        let fact = |patient: i64, code: &str| Fact {
            patient_num: PatientNum::new(patient),
            encounter_num: EntityId::from("1"),
            concept_cd: code.to_string(),
            start_date: None,
            end_date: None,
            instance_num: None,
            nval_num: None,
        };
        let facts = vec![
            fact(1, "DEM|LANGUAGE:spanish"),
            fact(1, "DEM|LANGUAGE:english"),
            fact(2, "DEM|LANGUAGE:@"),
            fact(2, "OTHER:1"),
        ];
        let terms = vec![DemographicTerm::new(r"\i2b2\Demographics\Language\", "v52_language")];
        let codes = demographics(&facts, &concepts, &terms);
        assert_eq!(codes[&(PatientNum::new(1), "v52_language".to_string())], "english,spanish");
        assert_eq!(codes[&(PatientNum::new(2), "v52_language".to_string())], "NI");
    }

    #[test]
    fn patient_table_has_consent_flags() {
        let crosswalk = Crosswalk::from_entries(vec![CrosswalkEntry {
            patient_num: PatientNum::new(1),
            study_id: StudyId::new("S1").unwrap(),
            date_shift: DateShift::days(1),
        }])
        .unwrap();
        let config = TumorConfig::default();
        let table = patient_table(&crosswalk, &BTreeMap::new(), &config).unwrap();
        assert_eq!(table.key_column(), "v01_studyid");
        assert_eq!(table.get(&EntityId::from("S1"), "v02_breastsurvey"), Some("1"));
        assert_eq!(table.get(&EntityId::from("S1"), "v52_language"), None);
    }

    #[test]
    fn dictionary_adds_seer_field_when_templated() {
        let template = ImportTemplate::from_headers([
            "v00_tumorid",
            "v13_seer_site_summary",
            "v15_0380_sequence_numbercentral",
        ])
        .unwrap();
        let dictionary =
            tumor_dictionary(&template, &BTreeMap::new(), &TumorConfig::default()).unwrap();
        assert_eq!(dictionary.len(), 2);
        assert_eq!(
            dictionary
                .get(&AttributeId::Concept("SEER_SITE".into()))
                .map(|def| def.field_name.as_str()),
            Some("v13_seer_site_summary")
        );
    }
}
