//! CLI argument definitions for cohort preparation.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use cohort_ingest::DEFAULT_KEY_ITEM;
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "cohort-prep",
    version,
    about = "Prepare de-identified cohort data for REDCap import",
    long_about = "Build consented crosswalks, assemble per-tumor and medication exposure\n\
                  records from warehouse exports, normalize codebooks and drug choices,\n\
                  and move records to and from a REDCap-style API."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow identifiers and other row-level values in log output.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,

    /// TOML run configuration (defaults apply when omitted).
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the consented crosswalk (patient_num, study_id, date_shift).
    Crosswalk(CrosswalkArgs),

    /// Write a patient-set load file from a patient list.
    AddResult(AddResultArgs),

    /// Pivot a NAACCR fixed-width extract into one record per patient.
    Naaccr(NaaccrArgs),

    /// Convert a codebook into REDCap data dictionary rows.
    Codebook(CodebookArgs),

    /// Assemble per-tumor records for a site.
    Tumor(TumorArgs),

    /// Build medication exposure records for a site.
    Meds(MedsArgs),

    /// Combine `code, label` drug lists.
    RxCombine(RxCombineArgs),

    /// List one drug choice per drug id and set them on the data dictionary.
    RxChoices(RxChoicesArgs),

    /// List the terms of a saved query definition.
    Terms(TermsArgs),

    /// Upload record CSV files to the import API.
    Upload(UploadArgs),

    /// Export every project record from the API to CSV.
    Export(ExportArgs),
}

#[derive(Parser)]
pub struct CrosswalkArgs {
    /// Consented roster (study_id, mrn).
    #[arg(value_name = "CONSENTED")]
    pub consented: PathBuf,

    /// Survey orders (order_id, mrn).
    #[arg(value_name = "SURVEY_ORDER")]
    pub survey_order: PathBuf,

    /// Identity export (patient_num, mrn, date_shift).
    #[arg(value_name = "IDENTITY")]
    pub identity: PathBuf,

    /// Crosswalk CSV to write.
    #[arg(value_name = "OUT")]
    pub output: PathBuf,

    /// Maximum MRNs per identity lookup.
    #[arg(long = "batch-size", value_name = "N")]
    pub batch_size: Option<usize>,
}

#[derive(Parser)]
pub struct AddResultArgs {
    /// Patient list (patient_num).
    #[arg(value_name = "PATIENTS")]
    pub patients: PathBuf,

    /// Patient-set CSV to write.
    #[arg(value_name = "OUT")]
    pub output: PathBuf,

    /// Query result instance the set belongs to.
    #[arg(long = "result-instance-id", value_name = "ID")]
    pub result_instance_id: i64,
}

#[derive(Parser)]
pub struct NaaccrArgs {
    /// Item layout (item, name, column_start, column_end).
    #[arg(value_name = "LAYOUT")]
    pub layout: PathBuf,

    /// REDCap data dictionary naming the fields to extract.
    #[arg(value_name = "DICTIONARY")]
    pub dictionary: PathBuf,

    /// Fixed-width extract.
    #[arg(value_name = "DATA")]
    pub data: PathBuf,

    /// Record CSV to write.
    #[arg(value_name = "OUT")]
    pub output: PathBuf,

    /// NAACCR item used as the record key.
    #[arg(long = "key-item", value_name = "ITEM", default_value_t = DEFAULT_KEY_ITEM)]
    pub key_item: u32,
}

#[derive(Parser)]
pub struct CodebookArgs {
    /// Codebook CSV (field_label, choice_code, code_label[, field_name, form_name]).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Data dictionary CSV to write.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,
}

#[derive(Parser)]
pub struct TumorArgs {
    /// Site directory holding the warehouse exports and templates.
    #[arg(value_name = "SITE_DIR")]
    pub site_dir: PathBuf,

    /// Output CSV (default: configured tumor output in SITE_DIR).
    #[arg(long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Data access group written to every record.
    #[arg(long = "site", value_name = "GROUP")]
    pub site: Option<String>,
}

#[derive(Parser)]
pub struct MedsArgs {
    /// Site directory holding the warehouse exports and templates.
    #[arg(value_name = "SITE_DIR")]
    pub site_dir: PathBuf,

    /// Output CSV (default: configured medication output in SITE_DIR).
    #[arg(long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Rows per output file.
    #[arg(long = "chunk-size", value_name = "N")]
    pub chunk_size: Option<usize>,

    /// Data access group written to every record.
    #[arg(long = "site", value_name = "GROUP")]
    pub site: Option<String>,
}

#[derive(Parser)]
pub struct RxCombineArgs {
    /// Combined list to write.
    #[arg(value_name = "OUT")]
    pub output: PathBuf,

    /// Lists to combine; later lists win for the same code.
    #[arg(value_name = "INPUTS", required = true)]
    pub inputs: Vec<PathBuf>,
}

#[derive(Parser)]
pub struct RxChoicesArgs {
    /// Concept export (concept_path, concept_cd, name_char).
    #[arg(value_name = "CONCEPTS")]
    pub concepts: PathBuf,

    /// Drug list to write (`code, label` lines).
    #[arg(value_name = "OUT")]
    pub output: PathBuf,

    /// Medication data dictionary whose `rxcui` choices are replaced.
    #[arg(long = "ddict", value_name = "PATH")]
    pub ddict: Option<PathBuf>,

    /// Where to write the updated dictionary (default: overwrite --ddict).
    #[arg(long = "ddict-out", value_name = "PATH", requires = "ddict")]
    pub ddict_out: Option<PathBuf>,
}

#[derive(Parser)]
pub struct TermsArgs {
    /// Query definition XML.
    #[arg(value_name = "QUERY")]
    pub query: PathBuf,

    /// Term CSV to write.
    #[arg(value_name = "OUT")]
    pub output: PathBuf,
}

#[derive(Parser)]
pub struct UploadArgs {
    /// Record CSV files, uploaded in order.
    #[arg(value_name = "CSV", required = true)]
    pub files: Vec<PathBuf>,

    /// Import API url.
    #[arg(long = "url", value_name = "URL")]
    pub url: Option<String>,

    /// Environment variable holding the API token.
    #[arg(long = "token-env", value_name = "NAME")]
    pub token_env: Option<String>,

    /// Records per import call.
    #[arg(long = "batch-size", value_name = "N")]
    pub batch_size: Option<usize>,

    /// Import layout.
    #[arg(long = "type", value_enum)]
    pub import_type: Option<ImportTypeArg>,

    /// Record key column (default: first column).
    #[arg(long = "key", value_name = "FIELD")]
    pub key: Option<String>,
}

#[derive(Parser)]
pub struct ExportArgs {
    /// Record CSV to write.
    #[arg(value_name = "OUT")]
    pub output: PathBuf,

    /// API url.
    #[arg(long = "url", value_name = "URL")]
    pub url: Option<String>,

    /// Environment variable holding the API token.
    #[arg(long = "token-env", value_name = "NAME")]
    pub token_env: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ImportTypeArg {
    Flat,
    Eav,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
