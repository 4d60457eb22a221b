//! Input readers for cohort preparation.
//!
//! - **csv_table**: header-first CSV loading with trimmed cells
//! - **readers**: roster, survey order, identity, crosswalk, patient list,
//!   import template, data dictionary, fact and concept exports
//! - **concept_code**: warehouse concept-code parsing into observations
//! - **naaccr**: fixed-width registry extract ingestion
//! - **query_terms**: terms of a saved query definition (XML)

pub mod concept_code;
pub mod csv_table;
pub mod error;
pub mod naaccr;
pub mod query_terms;
pub mod readers;

pub use concept_code::{ConceptCode, code_suffix, facts_to_observations, observation_from_fact};
pub use csv_table::{CsvTable, read_csv_table};
pub use error::{IngestError, Result};
pub use naaccr::{DEFAULT_KEY_ITEM, FixedWidthReader, LayoutItem, NaaccrRead, RecordLayout};
pub use query_terms::{
    QUERY_TERM_COLUMNS, QueryTerm, key_to_path, query_terms_from_str, read_query_terms,
};
pub use readers::{
    VALIDATION_COLUMN, read_concepts, read_crosswalk, read_facts, read_identity,
    read_import_template, read_patient_list, read_records, read_roster, read_survey_order,
    read_validations,
};
