//! Data model for cohort extraction, de-identification, and re-upload.
//!
//! - **ids**: identifier newtypes (patient number, entity key, study id, MRN)
//! - **observation**: warehouse facts, EAV observations and cells
//! - **dictionary**: field dictionary mapping attribute ids to template fields
//! - **crosswalk**: roster, identity rows, crosswalk entries and date shifts
//! - **concept**: concept hierarchy nodes and path-prefix ancestry
//! - **table**: immutable wide tables keyed by entity
//! - **template**: import template headers and conformance
//! - **diagnostics**: coverage and drift reporting
//! - **config**: explicit run configuration

pub mod concept;
pub mod config;
pub mod crosswalk;
pub mod diagnostics;
pub mod dictionary;
pub mod error;
pub mod ids;
pub mod observation;
pub mod table;
pub mod template;

pub use concept::{ConceptNode, normalize_path, parent_path};
pub use config::{
    CompletionRule, DemographicTerm, ImportType, MedicationConfig, PathsConfig, RunConfig,
    TumorConfig, UploadConfig, VitalsConfig,
};
pub use crosswalk::{
    ConsentedMrn, Crosswalk, CrosswalkEntry, DateShift, IdentityRecord, RosterEntry,
    SurveyOrderEntry,
};
pub use diagnostics::{Diagnostic, DiagnosticReport, DriftSummary, Severity};
pub use dictionary::{FieldDef, FieldDictionary, ValueType};
pub use error::{ModelError, Result};
pub use ids::{EntityId, Mrn, PatientNum, StudyId};
pub use observation::{AttributeId, EavCell, Fact, Observation, ObservationValue};
pub use table::WideTable;
pub use template::{ConformReport, ImportTemplate};
