//! Integration tests for the command stages.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use cohort_cli::pipeline::{
    CrosswalkFiles, DrugChoiceFiles, NaaccrFiles, build_crosswalk, build_drug_choices,
    build_patient_set, build_site_exposures, combine_drug_files, convert_codebook, export_project,
    extract_naaccr, extract_query_terms, upload_files,
};
use cohort_ingest::{read_crosswalk, read_records};
use cohort_model::{ImportType, MedicationConfig, PatientNum, RunConfig, UploadConfig};
use cohort_upload::{ExportApi, ImportApi, ImportResult};

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn crosswalk_is_written_and_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let consented = write(dir.path(), "consented.csv", "study_id,mrn\nS2,1002\nS1,1001\nS3,9999\n");
    let orders = write(
        dir.path(),
        "orders.csv",
        "ORDER_ID,MRN\nO1,1001\nO2,1002\nO3,9999\n",
    );
    let identity = write(
        dir.path(),
        "identity.csv",
        "patient_num,mrn,date_shift\n11,1001,-3\n12,1002,5\n",
    );
    let output = dir.path().join("out").join("crosswalk.csv");

    let summary = build_crosswalk(
        &CrosswalkFiles {
            consented: &consented,
            survey_order: &orders,
            identity: &identity,
            output: &output,
        },
        1,
    )
    .unwrap();

    assert_eq!(summary.records, 2);
    assert_eq!(summary.get("identity lookups"), Some(3));
    assert_eq!(summary.diagnostics.warning_count(), 1);
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "patient_num,study_id,date_shift\n11,S1,-3\n12,S2,5\n"
    );
    let crosswalk = read_crosswalk(&output).unwrap();
    assert_eq!(
        crosswalk.study_id(PatientNum::new(12)).map(ToString::to_string),
        Some("S2".to_string())
    );
}

#[test]
fn repeated_roster_mrn_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let consented = write(dir.path(), "consented.csv", "study_id,mrn\nS1,1001\nS2,1001\n");
    let orders = write(dir.path(), "orders.csv", "order_id,mrn\nO1,1001\n");
    let identity = write(dir.path(), "identity.csv", "patient_num,mrn,date_shift\n11,1001,0\n");
    let output = dir.path().join("crosswalk.csv");
    let result = build_crosswalk(
        &CrosswalkFiles {
            consented: &consented,
            survey_order: &orders,
            identity: &identity,
            output: &output,
        },
        10,
    );
    assert!(result.is_err());
    assert!(!output.exists());
}

#[test]
fn patient_set_keeps_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let patients = write(dir.path(), "patients.csv", "patient_num\n30\n10\n");
    let output = dir.path().join("pset.csv");
    let summary = build_patient_set(&patients, &output, 7).unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "result_instance_id,set_index,patient_num\n7,1,30\n7,2,10\n"
    );
}

#[test]
fn codebook_becomes_dropdown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(
        dir.path(),
        "codebook.csv",
        "Field_Label,Choice_Code,Code_Label\n\
         Smoking status,1,Never\n\
         Smoking status,2,Former\n\
         Site,C50,Breast\n",
    );
    let output = dir.path().join("dictionary.csv");
    let summary = convert_codebook(&input, &output).unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.get("codebook rows"), Some(3));
    // choices cells hold quoted newlines, so read records rather than lines
    let rows = read_records(&output, &["variable / field name", "form name"]).unwrap();
    let fields: Vec<(&str, &str)> = rows
        .iter()
        .map(|row| (row["variable / field name"].as_str(), row["form name"].as_str()))
        .collect();
    assert_eq!(fields, vec![("smoking_status", "codebook"), ("site", "codebook")]);
    assert!(rows[0]["choices, calculations, or slider labels"].contains("1, Never"));
}

#[test]
fn drug_lists_are_combined() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(dir.path(), "a.txt", "200, [AN000] RX tamoxifen\n");
    let second = write(dir.path(), "b.txt", "200, [AN000] RX anastrozole\n9, [AN000] RX letrozole\n");
    let output = dir.path().join("combined.txt");
    let summary = combine_drug_files(&output, &[first, second]).unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.get("input entries"), Some(3));
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "200, [AN000] RX anastrozole\n9, [AN000] RX letrozole\n"
    );
}

#[test]
fn naaccr_extract_is_pivoted_per_patient() {
    let dir = tempfile::tempdir().unwrap();
    let layout = write(
        dir.path(),
        "layout.csv",
        "item,name,column_start,column_end\n\
         20,Patient ID Number,1,8\n\
         380,Sequence Number--Central,9,10\n\
         390,Date of Diagnosis,11,18\n",
    );
    let dictionary = write(
        dir.path(),
        "dd.csv",
        "field_name,text_validation_type_or_show_slider_number\n\
         v15_0380_sequence_numbercentral,\n\
         v21_0390_date_of_diagnosis,date_ymd\n",
    );
    let data = write(dir.path(), "naaccr.dat", "000001230120150410\n\n0000045602\n");
    let output = dir.path().join("naaccr.csv");

    let summary = extract_naaccr(
        &NaaccrFiles {
            layout: &layout,
            dictionary: &dictionary,
            data: &data,
            output: &output,
        },
        20,
    )
    .unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.get("lines"), Some(3));
    let text = fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("record_id,"));
    assert!(text.contains("2015-04-10"));
    assert!(text.lines().any(|line| line.starts_with("00000456,")));
}

#[test]
fn site_exposures_are_written_in_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let site = dir.path();
    write(
        site,
        "bc_med_import_template.csv",
        "record_id,redcap_data_access_group,exposure_start,exposure_end,raw_med_name,\
         rxcui,drug_name,va_class,medication_exposure_complete\n",
    );
    write(
        site,
        "concept_dimension.csv",
        "concept_path,concept_cd,name_char\n\
         \\i2b2\\Medications\\[AN] ANTINEOPLASTICS\\,,[AN] ANTINEOPLASTICS\n\
         \\i2b2\\Medications\\[AN] ANTINEOPLASTICS\\RXCUI:5\\,RXCUI:5,tamoxifen\n",
    );
    write(
        site,
        "observation_fact.csv",
        "patient_num,encounter_num,concept_cd,start_date,end_date,instance_num\n\
         1,10,RXCUI:5,2014-01-01 10:00:00,2014-03-01 00:00:00,1\n\
         1,11,RXCUI:5,2014-02-01 09:30:00,,2\n\
         3,30,RXCUI:5,2014-02-01 09:30:00,,3\n\
         1,12,LOINC:39156-5,2014-02-01 09:30:00,,\n",
    );
    write(site, "consented_crosswalk.csv", "patient_num,study_id,date_shift\n1,S1,-2\n");

    let config = RunConfig {
        chunk_size: 1,
        ..RunConfig::default()
    };
    let summary = build_site_exposures(site, None, &config).unwrap();
    assert_eq!(summary.records, 2);
    let names: Vec<String> = summary
        .outputs
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["med_exposure-0.csv", "med_exposure-1.csv"]);
    assert_eq!(summary.diagnostics.warning_count(), 1);

    let first = fs::read_to_string(site.join("med_exposure-0.csv")).unwrap();
    assert!(first.starts_with("record_id,redcap_data_access_group,"));
    assert!(first.contains(",15,"));
    assert!(first.contains("tamoxifen"));

    let config = RunConfig::default();
    let summary = build_site_exposures(site, None, &config).unwrap();
    assert_eq!(summary.outputs, vec![site.join("med_exposure.csv")]);
    assert_eq!(summary.get("stale files removed"), Some(2));
}

#[derive(Default)]
struct RecordingApi {
    calls: RefCell<Vec<(String, ImportType)>>,
}

impl ImportApi for RecordingApi {
    fn import_records(
        &self,
        csv: &str,
        import_type: ImportType,
    ) -> cohort_upload::Result<ImportResult> {
        self.calls.borrow_mut().push((csv.to_string(), import_type));
        Ok(ImportResult {
            count: csv.lines().count() - 1,
        })
    }
}

#[test]
fn files_are_uploaded_in_batches() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "per_tumor.csv", "v00_tumorid,v01_studyid\nS1:01,S1\nS1:02,S1\nS2:01,S2\n");
    let api = RecordingApi::default();
    let upload = UploadConfig {
        batch_size: 2,
        ..UploadConfig::default()
    };
    let summary = upload_files(&api, &[file], None, &upload).unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.get("batches"), Some(2));
    let calls = api.calls.borrow();
    assert_eq!(calls[1].0, "v00_tumorid,v01_studyid\nS2:01,S2\n");
    assert_eq!(calls[0].1, ImportType::Flat);
}

#[test]
fn drug_choices_are_listed_and_set_on_the_dictionary() {
    let dir = tempfile::tempdir().unwrap();
    let concepts = write(
        dir.path(),
        "bc_meds.csv",
        "concept_path,concept_cd,name_char\n\
         \\i2b2\\Medications\\[AN000] ANTINEOPLASTICS\\,,[AN000] ANTINEOPLASTICS\n\
         \\i2b2\\Medications\\[AN000] ANTINEOPLASTICS\\RXCUI:10324\\,RXCUI:10324,\"tamoxifen [1,234 facts]\"\n\
         \\i2b2\\Medications\\[AN000] ANTINEOPLASTICS\\RXCUI:84857\\,RXCUI:84857,anastrozole\n",
    );
    let ddict = write(
        dir.path(),
        "med_exposure_ddict.csv",
        "Variable / Field Name,Form Name,Field Type,\"Choices, Calculations, OR Slider Labels\"\n\
         record_id,medication_exposure,text,\n\
         rxcui,medication_exposure,dropdown,\"1, placeholder\"\n",
    );
    let output = dir.path().join("rx_choices.txt");
    let ddict_out = dir.path().join("med_exposure_ddict_rx.csv");
    let summary = build_drug_choices(
        &DrugChoiceFiles {
            concepts: &concepts,
            output: &output,
            dictionary: Some(&ddict),
            dictionary_output: Some(&ddict_out),
        },
        &MedicationConfig::default(),
    )
    .unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.outputs, vec![output.clone(), ddict_out.clone()]);
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "84857, [AN000] RXCUI:84857 anastrozole\n10324, [AN000] RXCUI:10324 tamoxifen\n"
    );

    let rows = read_records(&ddict_out, &["variable / field name"]).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[1]["choices, calculations, or slider labels"],
        "84857, [AN000] RXCUI:84857 anastrozole | 10324, [AN000] RXCUI:10324 tamoxifen"
    );
    assert!(!rows[0].contains_key("choices, calculations, or slider labels"));
}

#[test]
fn query_terms_are_written_one_per_key_and_name() {
    let dir = tempfile::tempdir().unwrap();
    let query = write(
        dir.path(),
        "query_definition.xml",
        "<query_definition><panel>\
         <item><item_name>Breast [12 patients]</item_name>\
         <item_key>\\\\i2b2_Diagnoses\\i2b2\\Diagnoses\\C50\\</item_key></item>\
         <item><item_name>Tamoxifen</item_name></item>\
         </panel></query_definition>",
    );
    let output = dir.path().join("terms.csv");
    let summary = extract_query_terms(&query, &output).unwrap();
    assert_eq!(summary.records, 1);
    assert_eq!(summary.get("items with terms"), Some(1));

    let rows = read_records(&output, &["id", "concept_path", "name"]).unwrap();
    assert_eq!(rows[0]["id"], "0");
    assert_eq!(rows[0]["concept_path"], "\\i2b2\\Diagnoses\\C50\\");
    assert_eq!(rows[0]["name_char"], "Breast [12 patients]");
    assert_eq!(rows[0]["name"], "Breast");
}

struct FixedExport(&'static str);

impl ExportApi for FixedExport {
    fn export_records(&self) -> cohort_upload::Result<String> {
        Ok(self.0.to_string())
    }
}

#[test]
fn exported_records_are_saved_as_csv() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("records.csv");
    let csv = "record_id,institution,obsolete\n1,3,\n2,5,1\n";
    let summary = export_project(&FixedExport(csv), &output).unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.get("columns"), Some(3));
    assert_eq!(fs::read_to_string(&output).unwrap(), csv);

    let empty = dir.path().join("none.csv");
    let summary = export_project(&FixedExport(""), &empty).unwrap();
    assert_eq!(summary.records, 0);
    assert!(summary.outputs.is_empty());
    assert!(!empty.exists());
    assert_eq!(summary.diagnostics.warning_count(), 1);
}
