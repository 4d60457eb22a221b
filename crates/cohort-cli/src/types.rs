use std::path::PathBuf;

use cohort_model::{DiagnosticReport, DriftSummary};

/// What one command did, for the summary table.
#[derive(Debug, Default)]
pub struct CommandSummary {
    pub command: String,
    /// Records written or uploaded.
    pub records: usize,
    pub outputs: Vec<PathBuf>,
    /// Further labelled counts, in display order.
    pub counts: Vec<(String, usize)>,
    pub diagnostics: DiagnosticReport,
    pub drift: Option<DriftSummary<u32>>,
}

impl CommandSummary {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn count(&mut self, label: impl Into<String>, value: usize) {
        self.counts.push((label.into(), value));
    }

    /// Labelled count, if recorded.
    pub fn get(&self, label: &str) -> Option<usize> {
        self.counts
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| *value)
    }
}
