//! Command stages: read inputs, transform, write outputs.
//!
//! Every stage returns a [`CommandSummary`]. Validation errors abort the
//! stage before anything is written; coverage gaps and drift are counted in
//! the summary's diagnostics.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cohort_ingest::{
    FixedWidthReader, RecordLayout, VALIDATION_COLUMN, read_concepts, read_crosswalk,
    read_csv_table, read_facts, read_identity, read_import_template, read_patient_list,
    read_query_terms, read_records, read_roster, read_survey_order, read_validations,
};
use cohort_model::{Crosswalk, FieldDictionary, MedicationConfig, RunConfig, UploadConfig};
use cohort_output::{write_chunked, write_csv, write_frame, write_text};
use cohort_transform::codebook::name_from_hint;
use cohort_transform::frame::{codebook_frame, patient_set_frame, query_terms_frame, table_frame};
use cohort_transform::{
    Codebook, DRUG_CHOICE_FIELD, IdentityTable, MedicationHierarchy, PatientSet, RecordFrame,
    TumorInputs, assemble_tumors, choices_cell, collapse_exposures, combine_drug_lists,
    drug_choices, exposure_records, mix_survey_order, parse_drug_list, pivot, read_record_frame,
    render_drug_list, resolve_crosswalk, set_field_choices, string_frame, tumor_dictionary,
    validate_roster,
};
use cohort_upload::{ExportApi, ImportApi, upload_frame};
use tracing::{debug, info, warn};

use crate::logging::redact_value;
use crate::types::CommandSummary;

/// Columns of a crosswalk file.
pub const CROSSWALK_COLUMNS: [&str; 3] = ["patient_num", "study_id", "date_shift"];

/// Key column of a pivoted NAACCR extract.
pub const NAACCR_KEY_COLUMN: &str = "record_id";

// ============================================================================
// Crosswalk
// ============================================================================

pub struct CrosswalkFiles<'a> {
    pub consented: &'a Path,
    pub survey_order: &'a Path,
    pub identity: &'a Path,
    pub output: &'a Path,
}

/// Roster + survey orders + identity export -> crosswalk CSV.
pub fn build_crosswalk(files: &CrosswalkFiles<'_>, batch_size: usize) -> Result<CommandSummary> {
    let roster = read_roster(files.consented)?;
    validate_roster(&roster)
        .with_context(|| format!("validate {}", files.consented.display()))?;
    let orders = read_survey_order(files.survey_order)?;
    let consented = mix_survey_order(&orders, &roster);
    let identities = IdentityTable::new(read_identity(files.identity)?);
    info!(
        roster_count = roster.len(),
        identity_count = identities.len(),
        "loaded crosswalk inputs"
    );

    let resolution = resolve_crosswalk(&identities, &consented, batch_size)?;
    for study_id in &resolution.unresolved {
        debug!(study_id = redact_value(study_id.as_str()), "no warehouse patient");
    }
    write_crosswalk(&resolution.crosswalk, files.output)?;

    let mut summary = CommandSummary::new("crosswalk");
    summary.records = resolution.crosswalk.len();
    summary.outputs.push(files.output.to_path_buf());
    summary.count("roster", roster.len());
    summary.count("consented MRNs", consented.len());
    summary.count("identity lookups", resolution.lookup_count);
    if !resolution.unresolved.is_empty() {
        summary.diagnostics.warn(
            "crosswalk",
            resolution.unresolved.len(),
            "consented subjects without a warehouse patient",
        );
    }
    Ok(summary)
}

/// Write `patient_num, study_id, date_shift` rows ordered by study id.
pub fn write_crosswalk(crosswalk: &Crosswalk, path: &Path) -> Result<()> {
    let entries = crosswalk.entries();
    let mut values: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(entries.len()); 3];
    for entry in entries {
        values[0].push(Some(entry.patient_num.to_string()));
        values[1].push(Some(entry.study_id.to_string()));
        values[2].push(Some(entry.date_shift.as_days().to_string()));
    }
    let header: Vec<String> = CROSSWALK_COLUMNS.iter().map(ToString::to_string).collect();
    write_csv(&string_frame(&header, values)?, path)
}

// ============================================================================
// Patient set
// ============================================================================

pub fn build_patient_set(
    patients: &Path,
    output: &Path,
    result_instance_id: i64,
) -> Result<CommandSummary> {
    let list = read_patient_list(patients)?;
    let set = PatientSet::build(result_instance_id, &list)
        .with_context(|| format!("validate {}", patients.display()))?;
    write_csv(&patient_set_frame(&set)?, output)?;

    let mut summary = CommandSummary::new("add-result");
    summary.records = set.len();
    summary.outputs.push(output.to_path_buf());
    summary.count("set size", set.len());
    Ok(summary)
}

// ============================================================================
// NAACCR extract
// ============================================================================

pub struct NaaccrFiles<'a> {
    pub layout: &'a Path,
    pub dictionary: &'a Path,
    pub data: &'a Path,
    pub output: &'a Path,
}

/// Fixed-width extract -> one record per key value.
pub fn extract_naaccr(files: &NaaccrFiles<'_>, key_item: u32) -> Result<CommandSummary> {
    let layout = RecordLayout::read(files.layout)?;
    let dictionary = data_dictionary_fields(files.dictionary)?;
    let key_field = layout
        .get(key_item)
        .map_or_else(|| format!("item_{key_item}"), |item| name_from_hint(&item.name, 0));
    let reader = FixedWidthReader::new(files.layout, &layout, &dictionary, key_item, &key_field)?;
    let read = reader.read_file(files.data)?;
    let (table, report) = pivot("naaccr", NAACCR_KEY_COLUMN, &read.cells, reader.dictionary())?;
    let frame = RecordFrame::from_table(&table)?;
    write_frame(&frame, files.output)?;

    let mut summary = CommandSummary::new("naaccr");
    summary.records = frame.record_count();
    summary.outputs.push(files.output.to_path_buf());
    summary.count("lines", read.line_count);
    summary.count("cells", report.cell_count);
    if read.skipped_lines > 0 {
        summary
            .diagnostics
            .warn("naaccr", read.skipped_lines, "lines without a key value");
    }
    if !reader.unmapped_items().is_empty() {
        summary.diagnostics.warn(
            "naaccr",
            reader.unmapped_items().len(),
            "dictionary items missing from the layout",
        );
    }
    if report.collision_count > 0 {
        summary.diagnostics.info(
            "pivot",
            report.collision_count,
            "repeated values per record; minimum kept",
        );
    }
    Ok(summary)
}

/// NAACCR fields of a data dictionary, with their validation types.
fn data_dictionary_fields(path: &Path) -> Result<FieldDictionary> {
    let records = read_records(path, &["field_name"])?;
    let field_names: Vec<String> = records
        .iter()
        .filter_map(|row| row.get("field_name").cloned())
        .collect();
    let validations: BTreeMap<String, String> = records
        .iter()
        .filter_map(|row| Some((row.get("field_name")?.clone(), row.get(VALIDATION_COLUMN)?.clone())))
        .collect();
    let dictionary = FieldDictionary::from_template_columns(&field_names)
        .with_context(|| format!("build field dictionary from {}", path.display()))?;
    Ok(dictionary.with_validations(&validations))
}

// ============================================================================
// Codebook
// ============================================================================

pub fn convert_codebook(input: &Path, output: &Path) -> Result<CommandSummary> {
    let records = read_records(input, &["field_label", "choice_code", "code_label"])?;
    let codebook = Codebook::from_records(&records)
        .with_context(|| format!("read codebook {}", input.display()))?;
    let fields = codebook.convert();
    write_csv(&codebook_frame(&fields)?, output)?;

    let mut summary = CommandSummary::new("codebook");
    summary.records = fields.len();
    summary.outputs.push(output.to_path_buf());
    summary.count("codebook rows", codebook.len());
    Ok(summary)
}

// ============================================================================
// Site records
// ============================================================================

/// Validation types from the site data dictionary; empty when it is absent.
fn site_validations(path: &Path, summary: &mut CommandSummary) -> Result<BTreeMap<String, String>> {
    if path.exists() {
        return Ok(read_validations(path)?);
    }
    warn!(path = %path.display(), "no data dictionary; all fields treated as coded");
    summary
        .diagnostics
        .warn("dictionary", 1, "data dictionary not found; validation types unknown");
    Ok(BTreeMap::new())
}

fn output_path(site_dir: &Path, output: Option<&Path>, configured: &Path, config: &RunConfig) -> PathBuf {
    output.map_or_else(|| config.paths.resolve(site_dir, configured), Path::to_path_buf)
}

/// Per-tumor records for one site.
pub fn assemble_site_tumors(
    site_dir: &Path,
    output: Option<&Path>,
    config: &RunConfig,
) -> Result<CommandSummary> {
    let paths = &config.paths;
    let mut summary = CommandSummary::new("tumor");

    let template = read_import_template(&paths.resolve(site_dir, &paths.tumor_template))?;
    let validations = site_validations(&paths.resolve(site_dir, &paths.data_dictionary), &mut summary)?;
    let dictionary = tumor_dictionary(&template, &validations, &config.tumor)?;
    let facts = read_facts(&paths.resolve(site_dir, &paths.facts))?;
    let concepts = read_concepts(&paths.resolve(site_dir, &paths.concepts))?;
    let crosswalk = read_crosswalk(&paths.resolve(site_dir, &paths.crosswalk))?;
    info!(
        fact_count = facts.len(),
        concept_count = concepts.len(),
        crosswalk_count = crosswalk.len(),
        "loaded site inputs"
    );

    let records = assemble_tumors(
        &TumorInputs {
            facts: &facts,
            concepts: &concepts,
            crosswalk: &crosswalk,
            template: &template,
            dictionary: &dictionary,
        },
        config,
    )?;
    let frame = RecordFrame::from_table(&records.table)?;
    frame.ensure_unique_keys()?;
    let output = output_path(site_dir, output, &paths.tumor_output, config);
    write_frame(&frame, &output)?;

    summary.records = frame.record_count();
    summary.outputs.push(output);
    summary.count("facts", facts.len());
    summary.count("template columns", template.columns().len());
    summary.count("columns without data", records.conform.missing_in_data.len());
    summary.diagnostics.extend(records.diagnostics);
    summary.drift = Some(records.drift);
    Ok(summary)
}

/// Medication exposure records for one site, written in chunks.
pub fn build_site_exposures(
    site_dir: &Path,
    output: Option<&Path>,
    config: &RunConfig,
) -> Result<CommandSummary> {
    let paths = &config.paths;
    let mut summary = CommandSummary::new("meds");

    let template = read_import_template(&paths.resolve(site_dir, &paths.medication_template))?;
    let facts = read_facts(&paths.resolve(site_dir, &paths.facts))?;
    let concepts = read_concepts(&paths.resolve(site_dir, &paths.concepts))?;
    let crosswalk = read_crosswalk(&paths.resolve(site_dir, &paths.crosswalk))?;

    let hierarchy = MedicationHierarchy::build(&concepts, &config.medication);
    let exposures = collapse_exposures(&facts, &hierarchy.medication_codes());
    let resolved = hierarchy.resolve_codes(exposures.iter().map(|e| e.concept_cd.as_str()));
    let records = exposure_records(&exposures, &resolved, &crosswalk, &config.site_access_group)?;
    let (table, conform) = template
        .conform(&records.table)
        .context("conform exposures to the medication template")?;
    let frame = RecordFrame::from_table(&table)?;
    frame.ensure_unique_keys()?;

    let output = output_path(site_dir, output, &paths.medication_output, config);
    let written = write_chunked(&frame, &output, config.chunk_size)?;

    summary.records = written.record_count;
    summary.outputs = written.paths;
    summary.count("drug classes", hierarchy.classes().count());
    summary.count("exposures", exposures.len());
    summary.count("stale files removed", written.removed.len());
    if records.dropped_exposures > 0 {
        summary.diagnostics.warn(
            "crosswalk",
            records.dropped_exposures,
            format!(
                "exposures of {} patients missing from the crosswalk",
                records.dropped_patients.len()
            ),
        );
    }
    if records.unclassified > 0 {
        summary
            .diagnostics
            .warn("medication", records.unclassified, "exposures without a drug class");
    }
    if !conform.missing_in_data.is_empty() {
        summary.diagnostics.info(
            "template",
            conform.missing_in_data.len(),
            "template columns without data",
        );
    }
    if !conform.dropped_columns.is_empty() {
        summary.diagnostics.warn(
            "template",
            conform.dropped_columns.len(),
            "record columns not in the template",
        );
    }
    Ok(summary)
}

// ============================================================================
// Drug lists
// ============================================================================

pub fn combine_drug_files(output: &Path, inputs: &[PathBuf]) -> Result<CommandSummary> {
    let mut lists = Vec::with_capacity(inputs.len());
    for input in inputs {
        let text = std::fs::read_to_string(input)
            .with_context(|| format!("read {}", input.display()))?;
        lists.push(parse_drug_list(&text, input)?);
    }
    let input_entries: usize = lists.iter().map(Vec::len).sum();
    let combined = combine_drug_lists(lists);
    write_text(output, &render_drug_list(&combined))?;

    let mut summary = CommandSummary::new("rx-combine");
    summary.records = combined.len();
    summary.outputs.push(output.to_path_buf());
    summary.count("input files", inputs.len());
    summary.count("input entries", input_entries);
    Ok(summary)
}

pub struct DrugChoiceFiles<'a> {
    pub concepts: &'a Path,
    pub output: &'a Path,
    /// Medication data dictionary to update.
    pub dictionary: Option<&'a Path>,
    /// Updated dictionary; the input is overwritten when unset.
    pub dictionary_output: Option<&'a Path>,
}

/// One choice per drug id from a concept export, optionally set as the
/// drug field choices of the medication data dictionary.
pub fn build_drug_choices(
    files: &DrugChoiceFiles<'_>,
    config: &MedicationConfig,
) -> Result<CommandSummary> {
    let concepts = read_concepts(files.concepts)?;
    let hierarchy = MedicationHierarchy::build(&concepts, config);
    let choices = drug_choices(&hierarchy, &config.drug_code_prefix);
    write_text(files.output, &render_drug_list(&choices))?;

    let mut summary = CommandSummary::new("rx-choices");
    summary.records = choices.len();
    summary.outputs.push(files.output.to_path_buf());
    summary.count("concepts", concepts.len());
    summary.count("drug classes", hierarchy.classes().count());
    summary.count("drug nodes", hierarchy.drugs().len());
    if choices.is_empty() {
        summary
            .diagnostics
            .warn("medication", 1, "no drug concepts below a class");
    }

    if let Some(path) = files.dictionary {
        let mut dictionary = read_csv_table(path)?;
        set_field_choices(&mut dictionary, DRUG_CHOICE_FIELD, &choices_cell(&choices))?;
        let output = files.dictionary_output.unwrap_or(path);
        write_csv(&table_frame(&dictionary)?, output)?;
        info!(path = %output.display(), field = DRUG_CHOICE_FIELD, "updated data dictionary");
        summary.outputs.push(output.to_path_buf());
    }
    Ok(summary)
}

// ============================================================================
// Query terms
// ============================================================================

pub fn extract_query_terms(query: &Path, output: &Path) -> Result<CommandSummary> {
    let terms = read_query_terms(query)?;
    write_csv(&query_terms_frame(&terms)?, output)?;

    let items: BTreeSet<usize> = terms.iter().map(|term| term.id).collect();
    let mut summary = CommandSummary::new("terms");
    summary.records = terms.len();
    summary.outputs.push(output.to_path_buf());
    summary.count("items with terms", items.len());
    if terms.is_empty() {
        warn!(path = %query.display(), "query definition has no item terms");
        summary
            .diagnostics
            .warn("terms", 1, "no items with both a key and a name");
    }
    Ok(summary)
}

// ============================================================================
// Upload
// ============================================================================

/// Upload each file in turn; the first failing batch stops everything.
pub fn upload_files(
    api: &dyn ImportApi,
    files: &[PathBuf],
    key: Option<&str>,
    upload: &UploadConfig,
) -> Result<CommandSummary> {
    let mut summary = CommandSummary::new("upload");
    let mut batches = 0usize;
    for file in files {
        let frame = read_record_frame(file, key)?;
        let result = upload_frame(api, &frame, upload.batch_size, upload.import_type)
            .with_context(|| format!("upload {}", file.display()))?;
        info!(
            path = %file.display(),
            record_count = result.record_count,
            batch_count = result.batch_count,
            "uploaded file"
        );
        summary.records += result.record_count;
        batches += result.batch_count;
        summary.outputs.push(file.clone());
    }
    summary.count("batches", batches);
    Ok(summary)
}

// ============================================================================
// Export
// ============================================================================

/// Fetch every project record and save it as CSV. Nothing is written when
/// the project has no records.
pub fn export_project(api: &dyn ExportApi, output: &Path) -> Result<CommandSummary> {
    let csv = api.export_records().context("export records")?;
    let mut summary = CommandSummary::new("export");
    if csv.trim().is_empty() {
        warn!("export returned no records; nothing written");
        summary.diagnostics.warn("export", 1, "no records exported");
        return Ok(summary);
    }
    write_text(output, &csv)?;
    let frame = read_record_frame(output, None)?;
    info!(
        path = %output.display(),
        record_count = frame.record_count(),
        column_count = frame.data.width(),
        "saved export"
    );
    summary.records = frame.record_count();
    summary.outputs.push(output.to_path_buf());
    summary.count("columns", frame.data.width());
    Ok(summary)
}
