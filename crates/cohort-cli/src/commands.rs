use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use cohort_cli::config::{ConfigOverrides, load_run_config};
use cohort_cli::pipeline::{
    CrosswalkFiles, DrugChoiceFiles, NaaccrFiles, assemble_site_tumors, build_crosswalk,
    build_drug_choices, build_patient_set, build_site_exposures, combine_drug_files,
    convert_codebook, export_project, extract_naaccr, extract_query_terms, upload_files,
};
use cohort_cli::types::CommandSummary;
use cohort_model::ImportType;
use cohort_upload::RedcapClient;
use tracing::{info, info_span};

use crate::cli::{
    AddResultArgs, CodebookArgs, CrosswalkArgs, ExportArgs, ImportTypeArg, MedsArgs, NaaccrArgs,
    RxChoicesArgs, RxCombineArgs, TermsArgs, TumorArgs, UploadArgs,
};

fn finish(summary: Result<CommandSummary>, started: Instant) -> Result<CommandSummary> {
    let summary = summary?;
    info!(
        command = %summary.command,
        record_count = summary.records,
        warning_count = summary.diagnostics.warning_count(),
        duration_ms = started.elapsed().as_millis(),
        "command complete"
    );
    Ok(summary)
}

pub fn run_crosswalk(args: &CrosswalkArgs, config_path: Option<&Path>) -> Result<CommandSummary> {
    let overrides = ConfigOverrides {
        lookup_batch_size: args.batch_size,
        ..ConfigOverrides::default()
    };
    let config = load_run_config(config_path, &overrides)?;
    let span = info_span!("crosswalk", batch_size = config.lookup_batch_size);
    let _guard = span.enter();
    let started = Instant::now();
    let files = CrosswalkFiles {
        consented: &args.consented,
        survey_order: &args.survey_order,
        identity: &args.identity,
        output: &args.output,
    };
    finish(build_crosswalk(&files, config.lookup_batch_size), started)
}

pub fn run_add_result(args: &AddResultArgs) -> Result<CommandSummary> {
    let span = info_span!("add_result", result_instance_id = args.result_instance_id);
    let _guard = span.enter();
    let started = Instant::now();
    finish(
        build_patient_set(&args.patients, &args.output, args.result_instance_id),
        started,
    )
}

pub fn run_naaccr(args: &NaaccrArgs) -> Result<CommandSummary> {
    let span = info_span!("naaccr", key_item = args.key_item);
    let _guard = span.enter();
    let started = Instant::now();
    let files = NaaccrFiles {
        layout: &args.layout,
        dictionary: &args.dictionary,
        data: &args.data,
        output: &args.output,
    };
    finish(extract_naaccr(&files, args.key_item), started)
}

pub fn run_codebook(args: &CodebookArgs) -> Result<CommandSummary> {
    let span = info_span!("codebook", input = %args.input.display());
    let _guard = span.enter();
    let started = Instant::now();
    finish(convert_codebook(&args.input, &args.output), started)
}

pub fn run_tumor(args: &TumorArgs, config_path: Option<&Path>) -> Result<CommandSummary> {
    let overrides = ConfigOverrides {
        site_access_group: args.site.clone(),
        ..ConfigOverrides::default()
    };
    let config = load_run_config(config_path, &overrides)?;
    let span = info_span!(
        "tumor",
        site = %config.site_access_group,
        site_dir = %args.site_dir.display()
    );
    let _guard = span.enter();
    let started = Instant::now();
    finish(
        assemble_site_tumors(&args.site_dir, args.output.as_deref(), &config),
        started,
    )
}

pub fn run_meds(args: &MedsArgs, config_path: Option<&Path>) -> Result<CommandSummary> {
    let overrides = ConfigOverrides {
        site_access_group: args.site.clone(),
        chunk_size: args.chunk_size,
        ..ConfigOverrides::default()
    };
    let config = load_run_config(config_path, &overrides)?;
    let span = info_span!(
        "meds",
        site = %config.site_access_group,
        chunk_size = config.chunk_size,
        site_dir = %args.site_dir.display()
    );
    let _guard = span.enter();
    let started = Instant::now();
    finish(
        build_site_exposures(&args.site_dir, args.output.as_deref(), &config),
        started,
    )
}

pub fn run_rx_combine(args: &RxCombineArgs) -> Result<CommandSummary> {
    let span = info_span!("rx_combine", input_count = args.inputs.len());
    let _guard = span.enter();
    let started = Instant::now();
    finish(combine_drug_files(&args.output, &args.inputs), started)
}

pub fn run_rx_choices(args: &RxChoicesArgs, config_path: Option<&Path>) -> Result<CommandSummary> {
    let config = load_run_config(config_path, &ConfigOverrides::default())?;
    let span = info_span!(
        "rx_choices",
        root_path = %config.medication.root_path,
        concepts = %args.concepts.display()
    );
    let _guard = span.enter();
    let started = Instant::now();
    let files = DrugChoiceFiles {
        concepts: &args.concepts,
        output: &args.output,
        dictionary: args.ddict.as_deref(),
        dictionary_output: args.ddict_out.as_deref(),
    };
    finish(build_drug_choices(&files, &config.medication), started)
}

pub fn run_terms(args: &TermsArgs) -> Result<CommandSummary> {
    let span = info_span!("terms", query = %args.query.display());
    let _guard = span.enter();
    let started = Instant::now();
    finish(extract_query_terms(&args.query, &args.output), started)
}

pub fn run_upload(args: &UploadArgs, config_path: Option<&Path>) -> Result<CommandSummary> {
    let overrides = ConfigOverrides {
        upload_url: args.url.clone(),
        upload_token_env: args.token_env.clone(),
        upload_batch_size: args.batch_size,
        import_type: args.import_type.map(|kind| match kind {
            ImportTypeArg::Flat => ImportType::Flat,
            ImportTypeArg::Eav => ImportType::Eav,
        }),
        ..ConfigOverrides::default()
    };
    let config = load_run_config(config_path, &overrides)?;
    let span = info_span!(
        "upload",
        url = %config.upload.url,
        batch_size = config.upload.batch_size,
        import_type = config.upload.import_type.as_str()
    );
    let _guard = span.enter();
    let started = Instant::now();
    let client = RedcapClient::from_config(&config.upload)?;
    finish(
        upload_files(&client, &args.files, args.key.as_deref(), &config.upload),
        started,
    )
}

pub fn run_export(args: &ExportArgs, config_path: Option<&Path>) -> Result<CommandSummary> {
    let overrides = ConfigOverrides {
        upload_url: args.url.clone(),
        upload_token_env: args.token_env.clone(),
        ..ConfigOverrides::default()
    };
    let config = load_run_config(config_path, &overrides)?;
    let span = info_span!("export", url = %config.upload.url);
    let _guard = span.enter();
    let started = Instant::now();
    let client = RedcapClient::from_config(&config.upload)?;
    finish(export_project(&client, &args.output), started)
}
