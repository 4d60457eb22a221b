//! Batch loop: slice, encode, import, verify.

use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use cohort_model::ImportType;
use cohort_output::encode_csv;
use cohort_transform::{RecordFrame, column_value_string, string_frame};

use crate::api::ImportApi;
use crate::error::UploadError;

/// Columns of an EAV import batch.
pub const EAV_COLUMNS: [&str; 3] = ["record", "field_name", "value"];

/// One batch ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    pub csv: String,
    /// Records the API must report back.
    pub record_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub frame: String,
    pub batch_count: usize,
    pub record_count: usize,
}

/// Encode a batch in the given layout.
///
/// Flat batches are the frame rows as they are. EAV batches have one
/// `record, field_name, value` row per non-blank cell outside the key
/// column, and count the distinct records among those rows.
pub fn encode_batch(batch: &RecordFrame, import_type: ImportType) -> Result<EncodedBatch> {
    match import_type {
        ImportType::Flat => {
            let bytes = encode_csv(&batch.data)?;
            Ok(EncodedBatch {
                csv: String::from_utf8(bytes).context("CSV is not UTF-8")?,
                record_count: batch.record_count(),
            })
        }
        ImportType::Eav => {
            let columns: Vec<String> = batch
                .column_names()
                .into_iter()
                .filter(|name| *name != batch.key_column)
                .collect();
            let mut cells: [Vec<Option<String>>; 3] = Default::default();
            let mut records = BTreeSet::new();
            for idx in 0..batch.record_count() {
                let record = column_value_string(&batch.data, &batch.key_column, idx)?;
                for column in &columns {
                    let value = column_value_string(&batch.data, column, idx)?;
                    if value.trim().is_empty() {
                        continue;
                    }
                    records.insert(record.clone());
                    cells[0].push(Some(record.clone()));
                    cells[1].push(Some(column.clone()));
                    cells[2].push(Some(value));
                }
            }
            let header: Vec<String> = EAV_COLUMNS.iter().map(ToString::to_string).collect();
            let df = string_frame(&header, cells.into())?;
            let bytes = encode_csv(&df)?;
            Ok(EncodedBatch {
                csv: String::from_utf8(bytes).context("CSV is not UTF-8")?,
                record_count: records.len(),
            })
        }
    }
}

/// Upload `frame` in batches of `batch_size` records.
///
/// Keys must be unique before anything is sent. A failing batch stops the
/// upload; later batches are not attempted.
pub fn upload_frame(
    api: &dyn ImportApi,
    frame: &RecordFrame,
    batch_size: usize,
    import_type: ImportType,
) -> Result<UploadSummary> {
    if batch_size == 0 {
        bail!("batch size must be at least 1");
    }
    frame.ensure_unique_keys()?;

    let rows = frame.record_count();
    let batch_total = rows.div_ceil(batch_size);
    let mut summary = UploadSummary {
        frame: frame.name.clone(),
        ..UploadSummary::default()
    };

    for (number, offset) in (0..rows).step_by(batch_size).enumerate() {
        let number = number + 1;
        let encoded = encode_batch(&frame.slice(offset, batch_size), import_type)?;
        if encoded.record_count == 0 {
            tracing::warn!(frame = %frame.name, batch = number, "batch has no values, skipped");
            continue;
        }
        let result = api
            .import_records(&encoded.csv, import_type)
            .and_then(|result| {
                if result.count == encoded.record_count {
                    Ok(result)
                } else {
                    Err(UploadError::CountMismatch {
                        submitted: encoded.record_count,
                        reported: result.count,
                    })
                }
            })
            .inspect_err(|err| {
                tracing::error!(
                    frame = %frame.name,
                    batch = number,
                    batch_total,
                    error = %err,
                    "import batch failed"
                );
            })
            .with_context(|| format!("upload {} batch {number} of {batch_total}", frame.name))?;

        summary.batch_count += 1;
        summary.record_count += result.count;
        tracing::info!(
            frame = %frame.name,
            batch = number,
            batch_total,
            record_count = result.count,
            "imported batch"
        );
    }
    Ok(summary)
}
