//! Cohort transforms.
//!
//! - **pivot**: EAV to wide tables, coded and dated registry pivots
//! - **crosswalk**: roster validation, batched identity resolution
//! - **window**: closest measurement per index event, offset and direction
//! - **medication**: drug class resolution over a polyhierarchy, exposures
//! - **tumor**: per-tumor record assembly
//! - **codebook**: codebook to data dictionary conversion
//! - **patient_set**: patient-set load rows
//! - **drug_list**: drug choices per drug id, combined drug lists
//! - **frame**: polars record frames

pub mod codebook;
pub mod crosswalk;
pub mod drug_list;
pub mod frame;
pub mod medication;
pub mod patient_set;
pub mod pivot;
pub mod tumor;
pub mod window;

pub use codebook::{Codebook, CodebookEntry};
pub use crosswalk::{
    CrosswalkResolution, IdentitySource, IdentityTable, mix_survey_order, resolve_crosswalk,
    validate_roster,
};
pub use drug_list::{
    DRUG_CHOICE_FIELD, DrugEntry, choices_cell, combine_drug_lists, drug_choices, parse_drug_list,
    render_drug_list, set_field_choices, strip_counts,
};
pub use frame::{RecordFrame, column_value_string, read_record_frame, string_frame};
pub use medication::{
    DrugClass, DrugClassification, Exposure, ExposureRecords, MedicationHierarchy, ResolvedCode,
    collapse_exposures, exposure_records,
};
pub use patient_set::{PatientSet, PatientSetMember};
pub use pivot::{PivotReport, RegistryPivot, melt, pivot, pivot_registry};
pub use tumor::{TumorInputs, TumorRecords, assemble_tumors, tumor_dictionary};
pub use window::{
    Direction, FieldNaming, IndexEvent, Measurement, WindowHit, WindowSpec, resolve_windows,
};
