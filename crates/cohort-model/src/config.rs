//! Run configuration.
//!
//! A [`RunConfig`] is built once (defaults, then an optional TOML file, then
//! command-line overrides) and passed by reference into every stage:
//! - Site settings (access group, chunk size, lookup batch size)
//! - Input and output file names relative to a site directory
//! - Tumor record assembly (concept prefixes, tumor id fields, demographics,
//!   form-completion rules)
//! - Vitals windowing (measure, concept path, offsets, tolerance)
//! - Medication hierarchy (root path, drug code prefix)
//! - Upload endpoint settings

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

// ============================================================================
// Run Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Value written to `redcap_data_access_group`.
    pub site_access_group: String,
    /// Rows per output chunk file.
    pub chunk_size: usize,
    /// Maximum identifiers per identity-source lookup.
    pub lookup_batch_size: usize,
    pub paths: PathsConfig,
    pub tumor: TumorConfig,
    pub vitals: VitalsConfig,
    pub medication: MedicationConfig,
    pub upload: UploadConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            site_access_group: "15".to_string(),
            chunk_size: 2000,
            lookup_batch_size: 500,
            paths: PathsConfig::default(),
            tumor: TumorConfig::default(),
            vitals: VitalsConfig::default(),
            medication: MedicationConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl RunConfig {
    /// Reject values that would make a stage misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ModelError::InvalidConfig("chunk_size must be at least 1".into()));
        }
        if self.lookup_batch_size == 0 {
            return Err(ModelError::InvalidConfig(
                "lookup_batch_size must be at least 1".into(),
            ));
        }
        if self.upload.batch_size == 0 {
            return Err(ModelError::InvalidConfig(
                "upload.batch_size must be at least 1".into(),
            ));
        }
        if self.vitals.tolerance_days <= 0 {
            return Err(ModelError::InvalidConfig(
                "vitals.tolerance_days must be positive".into(),
            ));
        }
        if self.vitals.offsets_years.is_empty() {
            return Err(ModelError::InvalidConfig(
                "vitals.offsets_years must not be empty".into(),
            ));
        }
        if self.site_access_group.trim().is_empty() {
            return Err(ModelError::InvalidConfig(
                "site_access_group must not be blank".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Paths
// ============================================================================

/// File names, resolved against a site directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// `patient_num, study_id, date_shift`
    pub crosswalk: PathBuf,
    /// `observation_fact` export.
    pub facts: PathBuf,
    /// `concept_dimension` export.
    pub concepts: PathBuf,
    pub tumor_template: PathBuf,
    pub medication_template: PathBuf,
    /// REDCap data dictionary; used for field validation types when present.
    pub data_dictionary: PathBuf,
    pub tumor_output: PathBuf,
    pub medication_output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            crosswalk: "consented_crosswalk.csv".into(),
            facts: "observation_fact.csv".into(),
            concepts: "concept_dimension.csv".into(),
            tumor_template: "bc_import_template.csv".into(),
            medication_template: "bc_med_import_template.csv".into(),
            data_dictionary: "bc_data_dictionary.csv".into(),
            tumor_output: "per_tumor.csv".into(),
            medication_output: "med_exposure.csv".into(),
        }
    }
}

impl PathsConfig {
    /// Resolve a configured path; absolute paths are kept as-is.
    pub fn resolve(&self, site_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            site_dir.join(path)
        }
    }
}

// ============================================================================
// Tumor Records
// ============================================================================

/// Concept-path prefix whose codes populate one patient field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemographicTerm {
    pub concept_path: String,
    pub field_name: String,
}

impl DemographicTerm {
    pub fn new(concept_path: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            concept_path: concept_path.into(),
            field_name: field_name.into(),
        }
    }
}

/// Sets `<form>_complete` after conforming.
///
/// Without `when_present` the flag is always set; otherwise only on records
/// where that field is non-null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRule {
    pub field: String,
    #[serde(default)]
    pub when_present: Option<String>,
    #[serde(default = "default_complete_value")]
    pub value: String,
}

fn default_complete_value() -> String {
    "2".to_string()
}

impl CompletionRule {
    pub fn always(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            when_present: None,
            value: default_complete_value(),
        }
    }

    pub fn when_present(field: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            when_present: Some(source.into()),
            value: default_complete_value(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TumorConfig {
    /// Prefix of NAACCR concept codes (`NAACCR|380:01`).
    pub naaccr_prefix: String,
    /// Prefix of SEER site concept codes (`SEER_SITE:26000`).
    pub seer_prefix: String,
    /// Field receiving the SEER site code.
    pub seer_field: String,
    /// Item whose start date is the index event (date of diagnosis).
    pub diagnosis_item: u32,
    pub tumor_id_field: String,
    pub study_id_field: String,
    pub central_sequence_field: String,
    pub hospital_sequence_field: String,
    /// Constant `1` patient flags (survey and consent).
    pub consent_fields: Vec<String>,
    pub demographics: Vec<DemographicTerm>,
    pub completion: Vec<CompletionRule>,
}

impl Default for TumorConfig {
    fn default() -> Self {
        Self {
            naaccr_prefix: "NAACCR|".to_string(),
            seer_prefix: "SEER_SITE:".to_string(),
            seer_field: "v13_seer_site_summary".to_string(),
            diagnosis_item: 390,
            tumor_id_field: "v00_tumorid".to_string(),
            study_id_field: "v01_studyid".to_string(),
            central_sequence_field: "v15_0380_sequence_numbercentral".to_string(),
            hospital_sequence_field: "v16_0560_sequence_numberhospital".to_string(),
            consent_fields: vec![
                "v02_breastsurvey".to_string(),
                "v03_medrecordconsent".to_string(),
            ],
            demographics: vec![
                DemographicTerm::new(r"\i2b2\Demographics\Language\", "v52_language"),
                DemographicTerm::new(
                    r"\i2b2\Demographics\Vital Status\Deceased per SSA\",
                    "v53_deceased_per_ssa",
                ),
            ],
            completion: vec![
                CompletionRule::always("admin_complete"),
                CompletionRule::when_present("test_complete", "v20_0490_diagnostic_confirmation"),
                CompletionRule::when_present("demographic_complete", "v52_language"),
                CompletionRule::always("clinical_complete"),
                CompletionRule::always("registry_complete"),
                CompletionRule::always("treatment_complete"),
            ],
        }
    }
}

// ============================================================================
// Vitals
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalsConfig {
    /// Measure label used in generated field names.
    pub measure: String,
    /// Concept path of the measurement.
    pub concept_path: String,
    /// Field number of the first generated field.
    pub base_field_number: u32,
    pub offsets_years: Vec<u32>,
    /// Exclusive bound on distance from the anchor, in days.
    pub tolerance_days: i64,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            measure: "bmi".to_string(),
            concept_path: r"\i2b2\Visit Details\Vitals\BMI\".to_string(),
            base_field_number: 116,
            offsets_years: vec![0, 1, 2],
            tolerance_days: 365,
        }
    }
}

// ============================================================================
// Medication
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicationConfig {
    pub root_path: String,
    pub drug_code_prefix: String,
}

impl Default for MedicationConfig {
    fn default() -> Self {
        Self {
            root_path: r"\i2b2\Medications\".to_string(),
            drug_code_prefix: "RXCUI:".to_string(),
        }
    }
}

// ============================================================================
// Upload
// ============================================================================

/// REDCap record import layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportType {
    #[default]
    Flat,
    Eav,
}

impl ImportType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Eav => "eav",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub url: String,
    /// Environment variable holding the API token.
    pub token_env: String,
    /// Records per import call.
    pub batch_size: usize,
    pub import_type: ImportType,
    /// Timeout per request in seconds.
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            url: "https://redcap.example.org/api/".to_string(),
            token_env: "REDCAP_API_TOKEN".to_string(),
            batch_size: 500,
            import_type: ImportType::Flat,
            timeout_secs: 120,
        }
    }
}
