//! Fixed-size chunk files.
//!
//! A frame of `n` rows written to `out.csv` with chunk size `k < n` becomes
//! `out-<offset>.csv` files, one per `k` rows, where `<offset>` is the first
//! row of the chunk zero-padded to the number of digits in `n`. Every chunk
//! carries the header. When `n <= k` the frame goes to `out.csv` itself.
//!
//! Writing replaces the previous result: chunk files of an earlier run that
//! the new run does not produce are removed, and so is the unchunked file
//! when chunks are written (and vice versa).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use cohort_transform::RecordFrame;

use crate::common::ensure_parent_dir;
use crate::csv::write_csv;

/// Files written and removed by [`write_chunked`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedOutput {
    pub paths: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub record_count: usize,
}

impl ChunkedOutput {
    pub fn is_chunked(&self) -> bool {
        self.paths.len() > 1
    }
}

/// `<stem>-<offset>.<ext>` next to `path`.
///
/// ```
/// use std::path::Path;
/// use cohort_output::chunk_path;
///
/// let path = chunk_path(Path::new("out/med_exposure.csv"), 2000, 4);
/// assert_eq!(path, Path::new("out/med_exposure-2000.csv"));
/// assert_eq!(chunk_path(Path::new("m.csv"), 0, 3), Path::new("m-000.csv"));
/// ```
pub fn chunk_path(path: &Path, offset: usize, digits: usize) -> PathBuf {
    let stem = file_stem(path);
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{offset:0digits$}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{offset:0digits$}"),
    };
    path.with_file_name(name)
}

/// Write `frame` to `path`, split into files of at most `chunk_size` rows.
pub fn write_chunked(frame: &RecordFrame, path: &Path, chunk_size: usize) -> Result<ChunkedOutput> {
    if chunk_size == 0 {
        bail!("chunk size must be at least 1");
    }
    ensure_parent_dir(path)?;
    let rows = frame.record_count();
    let mut output = ChunkedOutput {
        record_count: rows,
        ..ChunkedOutput::default()
    };

    if rows <= chunk_size {
        write_csv(&frame.data, path)?;
        output.paths.push(path.to_path_buf());
    } else {
        let digits = rows.to_string().len();
        for offset in (0..rows).step_by(chunk_size) {
            let chunk = chunk_path(path, offset, digits);
            write_csv(&frame.slice(offset, chunk_size).data, &chunk)?;
            output.paths.push(chunk);
        }
        if path.exists() {
            remove(path, &mut output.removed)?;
        }
    }

    for stale in chunk_files(path)? {
        if !output.paths.contains(&stale) {
            remove(&stale, &mut output.removed)?;
        }
    }

    tracing::info!(
        frame = %frame.name,
        path = %path.display(),
        record_count = rows,
        chunk_count = output.paths.len(),
        removed = output.removed.len(),
        "wrote records"
    );
    Ok(output)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Existing files named like a chunk of `path`, in name order.
fn chunk_files(path: &Path) -> Result<Vec<PathBuf>> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = format!("{}-", file_stem(path));
    let suffix = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let mut found = Vec::new();
    let entries = fs::read_dir(&dir).with_context(|| format!("list {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("list {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_chunk = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&suffix))
            .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()));
        if is_chunk && entry.path().is_file() {
            found.push(path.with_file_name(name));
        }
    }
    found.sort();
    Ok(found)
}

fn remove(path: &Path, removed: &mut Vec<PathBuf>) -> Result<()> {
    fs::remove_file(path).with_context(|| format!("remove stale {}", path.display()))?;
    tracing::debug!(path = %path.display(), "removed stale output");
    removed.push(path.to_path_buf());
    Ok(())
}
