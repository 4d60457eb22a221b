//! Coverage and reference-drift diagnostics.
//!
//! Nothing here is fatal: diagnostics are collected during a run and shown
//! to the operator afterwards.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// One counted finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stage that produced it (e.g. "pivot", "crosswalk").
    pub stage: String,
    pub message: String,
    pub severity: Severity,
    pub count: usize,
}

/// Diagnostics for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding; zero counts are not recorded.
    pub fn push(
        &mut self,
        stage: impl Into<String>,
        severity: Severity,
        count: usize,
        message: impl Into<String>,
    ) {
        if count == 0 {
            return;
        }
        self.diagnostics.push(Diagnostic {
            stage: stage.into(),
            message: message.into(),
            severity,
            count,
        });
    }

    pub fn warn(&mut self, stage: impl Into<String>, count: usize, message: impl Into<String>) {
        self.push(stage, Severity::Warning, count, message);
    }

    pub fn info(&mut self, stage: impl Into<String>, count: usize, message: impl Into<String>) {
        self.push(stage, Severity::Info, count, message);
    }

    pub fn extend(&mut self, other: DiagnosticReport) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }
}

/// Set differences between attributes seen in data and in the dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftSummary<T: Ord> {
    pub data_qty: usize,
    pub dictionary_qty: usize,
    pub both: BTreeSet<T>,
    pub data_only: BTreeSet<T>,
    pub dictionary_only: BTreeSet<T>,
}

impl<T: Ord + Clone> DriftSummary<T> {
    pub fn compare(data: &BTreeSet<T>, dictionary: &BTreeSet<T>) -> Self {
        Self {
            data_qty: data.len(),
            dictionary_qty: dictionary.len(),
            both: data.intersection(dictionary).cloned().collect(),
            data_only: data.difference(dictionary).cloned().collect(),
            dictionary_only: dictionary.difference(data).cloned().collect(),
        }
    }

    pub fn has_drift(&self) -> bool {
        !self.data_only.is_empty() || !self.dictionary_only.is_empty()
    }
}
