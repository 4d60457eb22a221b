//! CSV encoding of polars frames.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cohort_transform::RecordFrame;
use polars::prelude::*;

use crate::common::ensure_parent_dir;

/// Encode a frame as CSV with a header line. Nulls become empty cells.
pub fn encode_csv(df: &DataFrame) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut df = df.clone();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(&mut df)
        .context("encode CSV")?;
    Ok(buffer)
}

/// Write a frame to `path`, replacing any existing file.
pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let bytes = encode_csv(df)?;
    fs::write(path, bytes).with_context(|| format!("failed to write CSV: {}", path.display()))?;
    tracing::debug!(path = %path.display(), rows = df.height(), "wrote CSV");
    Ok(())
}

/// Write a record frame as one file.
pub fn write_frame(frame: &RecordFrame, path: &Path) -> Result<PathBuf> {
    write_csv(&frame.data, path)?;
    tracing::info!(
        frame = %frame.name,
        path = %path.display(),
        record_count = frame.record_count(),
        "wrote records"
    );
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use cohort_transform::string_frame;

    use super::*;

    #[test]
    fn nulls_are_empty_and_commas_are_quoted() {
        let header = vec!["record_id".to_string(), "label".to_string()];
        let df = string_frame(
            &header,
            vec![
                vec![Some("1".into()), Some("2".into())],
                vec![Some("a, b".into()), None],
            ],
        )
        .unwrap();
        let text = String::from_utf8(encode_csv(&df).unwrap()).unwrap();
        assert_eq!(text, "record_id,label\n1,\"a, b\"\n2,\n");
    }
}
