//! File-system helpers shared by the writers.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Create the parent directory of `path` if it has one.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    Ok(())
}

/// Replace `path` with `contents`.
pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    ensure_parent_dir(path)?;
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote text file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("list.txt");
        write_text(&path, "1, x\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1, x\n");
    }

    #[test]
    fn bare_file_name_needs_no_directory() {
        assert!(ensure_parent_dir(Path::new("out.csv")).is_ok());
    }
}
