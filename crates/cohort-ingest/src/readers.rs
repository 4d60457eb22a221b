//! Readers for the CSV inputs of a run.
//!
//! Each reader checks its required columns up front and reports the first
//! unparseable value with file and row. Column names match
//! case-insensitively, since survey-order exports use upper-case headers.

use std::collections::BTreeMap;
use std::path::Path;

use cohort_common::{parse_f64, parse_i64, parse_timestamp};
use cohort_model::{
    ConceptNode, Crosswalk, CrosswalkEntry, DateShift, EntityId, Fact, IdentityRecord,
    ImportTemplate, Mrn, PatientNum, RosterEntry, StudyId, SurveyOrderEntry,
};

use crate::csv_table::{CsvTable, read_csv_table};
use crate::error::{IngestError, Result};

/// Data-dictionary column holding the REDCap validation type.
pub const VALIDATION_COLUMN: &str = "text_validation_type_or_show_slider_number";

fn patient_num(table: &CsvTable, row: &[String], idx: usize, row_idx: usize) -> Result<PatientNum> {
    let raw = table.value(row, idx);
    PatientNum::parse(raw).map_err(|_| table.invalid("patient_num", raw, row_idx))
}

fn mrn(table: &CsvTable, row: &[String], idx: usize, row_idx: usize) -> Result<Mrn> {
    let raw = table.value(row, idx);
    Mrn::new(raw).map_err(|_| table.invalid("mrn", raw, row_idx))
}

fn study_id(table: &CsvTable, row: &[String], idx: usize, row_idx: usize) -> Result<StudyId> {
    let raw = table.value(row, idx);
    StudyId::new(raw).map_err(|_| table.invalid("study_id", raw, row_idx))
}

fn date_shift(table: &CsvTable, row: &[String], idx: usize, row_idx: usize) -> Result<DateShift> {
    let raw = table.value(row, idx);
    parse_i64(raw)
        .map(DateShift::days)
        .ok_or_else(|| table.invalid("date_shift", raw, row_idx))
}

/// Consented roster: `study_id, mrn`.
pub fn read_roster(path: &Path) -> Result<Vec<RosterEntry>> {
    let table = read_csv_table(path)?;
    let study_idx = table.require_column("study_id")?;
    let mrn_idx = table.require_column("mrn")?;
    let mut entries = Vec::with_capacity(table.len());
    for (row_idx, row) in table.rows.iter().enumerate() {
        entries.push(RosterEntry {
            study_id: study_id(&table, row, study_idx, row_idx)?,
            mrn: mrn(&table, row, mrn_idx, row_idx)?,
        });
    }
    Ok(entries)
}

/// Survey orders: `order_id, mrn` (any header case).
pub fn read_survey_order(path: &Path) -> Result<Vec<SurveyOrderEntry>> {
    let table = read_csv_table(path)?;
    let order_idx = table.require_column("order_id")?;
    let mrn_idx = table.require_column("mrn")?;
    let mut entries = Vec::with_capacity(table.len());
    for (row_idx, row) in table.rows.iter().enumerate() {
        entries.push(SurveyOrderEntry {
            order_id: table.value(row, order_idx).to_string(),
            mrn: mrn(&table, row, mrn_idx, row_idx)?,
        });
    }
    Ok(entries)
}

/// Identity-source export: `patient_num, mrn, date_shift`.
pub fn read_identity(path: &Path) -> Result<Vec<IdentityRecord>> {
    let table = read_csv_table(path)?;
    let patient_idx = table.require_column("patient_num")?;
    let mrn_idx = table.require_column("mrn")?;
    let shift_idx = table.require_column("date_shift")?;
    let mut records = Vec::with_capacity(table.len());
    for (row_idx, row) in table.rows.iter().enumerate() {
        records.push(IdentityRecord {
            patient_num: patient_num(&table, row, patient_idx, row_idx)?,
            mrn: mrn(&table, row, mrn_idx, row_idx)?,
            date_shift: date_shift(&table, row, shift_idx, row_idx)?,
        });
    }
    Ok(records)
}

/// Crosswalk file: `patient_num, study_id, date_shift`.
pub fn read_crosswalk(path: &Path) -> Result<Crosswalk> {
    let table = read_csv_table(path)?;
    let patient_idx = table.require_column("patient_num")?;
    let study_idx = table.require_column("study_id")?;
    let shift_idx = table.require_column("date_shift")?;
    let mut entries = Vec::with_capacity(table.len());
    for (row_idx, row) in table.rows.iter().enumerate() {
        entries.push(CrosswalkEntry {
            patient_num: patient_num(&table, row, patient_idx, row_idx)?,
            study_id: study_id(&table, row, study_idx, row_idx)?,
            date_shift: date_shift(&table, row, shift_idx, row_idx)?,
        });
    }
    Crosswalk::from_entries(entries).map_err(|source| IngestError::Validation {
        path: path.to_path_buf(),
        source,
    })
}

/// Patient list: `patient_num`, in file order.
pub fn read_patient_list(path: &Path) -> Result<Vec<PatientNum>> {
    let table = read_csv_table(path)?;
    let patient_idx = table.require_column("patient_num")?;
    table
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, row)| patient_num(&table, row, patient_idx, row_idx))
        .collect()
}

/// Import template header.
pub fn read_import_template(path: &Path) -> Result<ImportTemplate> {
    let table = read_csv_table(path)?;
    ImportTemplate::from_headers(&table.headers).map_err(|source| IngestError::Validation {
        path: path.to_path_buf(),
        source,
    })
}

/// Field validation types from a REDCap data dictionary, by field name.
/// Fields without a validation type are omitted.
pub fn read_validations(path: &Path) -> Result<BTreeMap<String, String>> {
    let table = read_csv_table(path)?;
    let field_idx = table.require_column("field_name")?;
    let validation_idx = table.require_column(VALIDATION_COLUMN)?;
    Ok(table
        .rows
        .iter()
        .filter_map(|row| {
            let field = table.value(row, field_idx);
            let validation = table.value(row, validation_idx);
            (!field.is_empty() && !validation.is_empty())
                .then(|| (field.to_string(), validation.to_string()))
        })
        .collect())
}

/// Warehouse `observation_fact` export.
///
/// Required: `patient_num, encounter_num, concept_cd, start_date`.
/// Optional: `end_date, instance_num, nval_num`.
pub fn read_facts(path: &Path) -> Result<Vec<Fact>> {
    let table = read_csv_table(path)?;
    let patient_idx = table.require_column("patient_num")?;
    let encounter_idx = table.require_column("encounter_num")?;
    let concept_idx = table.require_column("concept_cd")?;
    let start_idx = table.require_column("start_date")?;
    let end_idx = table.column_index("end_date");
    let instance_idx = table.column_index("instance_num");
    let nval_idx = table.column_index("nval_num");

    let mut facts = Vec::with_capacity(table.len());
    for (row_idx, row) in table.rows.iter().enumerate() {
        let start_date = match table.optional(row, Some(start_idx)) {
            Some(raw) => {
                Some(parse_timestamp(raw).ok_or_else(|| table.invalid("start_date", raw, row_idx))?)
            }
            None => None,
        };
        let end_date = match table.optional(row, end_idx) {
            Some(raw) => {
                Some(parse_timestamp(raw).ok_or_else(|| table.invalid("end_date", raw, row_idx))?)
            }
            None => None,
        };
        let instance_num = match table.optional(row, instance_idx) {
            Some(raw) => Some(parse_i64(raw).ok_or_else(|| table.invalid("instance_num", raw, row_idx))?),
            None => None,
        };
        let nval_num = match table.optional(row, nval_idx) {
            Some(raw) => Some(parse_f64(raw).ok_or_else(|| table.invalid("nval_num", raw, row_idx))?),
            None => None,
        };
        facts.push(Fact {
            patient_num: patient_num(&table, row, patient_idx, row_idx)?,
            encounter_num: EntityId::new(table.value(row, encounter_idx)),
            concept_cd: table.value(row, concept_idx).to_string(),
            start_date,
            end_date,
            instance_num,
            nval_num,
        });
    }
    tracing::info!(fact_count = facts.len(), path = %path.display(), "loaded facts");
    Ok(facts)
}

/// Warehouse `concept_dimension` export: `concept_path, concept_cd, name_char`.
pub fn read_concepts(path: &Path) -> Result<Vec<ConceptNode>> {
    let table = read_csv_table(path)?;
    let path_idx = table.require_column("concept_path")?;
    let code_idx = table.require_column("concept_cd")?;
    let name_idx = table.require_column("name_char")?;
    Ok(table
        .rows
        .iter()
        .filter(|row| !table.value(row, path_idx).is_empty())
        .map(|row| {
            ConceptNode::new(
                table.value(row, path_idx),
                table.value(row, code_idx),
                table.value(row, name_idx),
            )
        })
        .collect())
}

/// Generic reader: rows as `header -> value` maps (blank cells omitted).
pub fn read_records(path: &Path, required: &[&str]) -> Result<Vec<BTreeMap<String, String>>> {
    let table = read_csv_table(path)?;
    for column in required {
        table.require_column(column)?;
    }
    Ok(table
        .rows
        .iter()
        .map(|row| {
            table
                .headers
                .iter()
                .zip(row)
                .filter(|(header, value)| !header.is_empty() && !value.is_empty())
                .map(|(header, value)| (header.to_lowercase(), value.clone()))
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn roster_and_survey_order() {
        let dir = tempfile::tempdir().unwrap();
        let roster = read_roster(&write(&dir, "c.csv", "study_id,mrn\nS1,00123\nS2,456\n")).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].mrn.as_str(), "123");
        let orders =
            read_survey_order(&write(&dir, "o.csv", "ORDER_ID,MRN\nA7,123\n")).unwrap();
        assert_eq!(orders[0].order_id, "A7");
    }

    #[test]
    fn bad_values_report_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "i.csv", "patient_num,mrn,date_shift\n1,10,5\n2,20,soon\n");
        let err = read_identity(&path).unwrap_err();
        match err {
            IngestError::InvalidValue { field, row, .. } => {
                assert_eq!(field, "date_shift");
                assert_eq!(row, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn crosswalk_duplicates_are_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "cw.csv",
            "patient_num,study_id,date_shift\n1,S1,3\n1,S2,3\n",
        );
        assert!(matches!(
            read_crosswalk(&path),
            Err(IngestError::Validation { .. })
        ));
    }

    #[test]
    fn template_drops_unnamed_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "t.csv", "record_id,a,b,\n");
        let template = read_import_template(&path).unwrap();
        assert_eq!(template.columns(), ["record_id", "a", "b"]);
    }

    #[test]
    fn facts_with_optional_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "f.csv",
            "patient_num,encounter_num,concept_cd,start_date,nval_num\n\
             1,10,NAACCR|390:,2014-03-02 00:00:00,\n\
             1,11,VITAL:BMI,2014-04-02,27.5\n",
        );
        let facts = read_facts(&path).unwrap();
        assert_eq!(facts.len(), 2);
        assert!(facts[0].end_date.is_none());
        assert_eq!(facts[1].nval_num, Some(27.5));
        assert_eq!(facts[1].start_date.unwrap().to_string(), "2014-04-02 00:00:00");
    }

    #[test]
    fn validations_skip_blank_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "dd.csv",
            "field_name,form_name,text_validation_type_or_show_slider_number\n\
             v21_0390_date_of_diagnosis,registry,date_ymd\n\
             v20_0490_diagnostic_confirmation,registry,\n",
        );
        let validations = read_validations(&path).unwrap();
        assert_eq!(validations.len(), 1);
        assert_eq!(validations["v21_0390_date_of_diagnosis"], "date_ymd");
    }
}
