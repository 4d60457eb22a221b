//! Concept hierarchy nodes.
//!
//! Concept paths are delimiter-terminated and prefix-ordered
//! (`\i2b2\Medications\[AN000] ANTINEOPLASTICS\RXCUI:123\`); the ancestor
//! relation is the path-prefix relation. Paths are normalised on
//! construction: a path without a trailing delimiter gets one, using the
//! first `\` or `/` it contains, so prefixes always end on a whole segment.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConceptNode {
    pub concept_path: String,
    pub concept_code: String,
    pub display_name: String,
}

impl ConceptNode {
    pub fn new(
        concept_path: impl Into<String>,
        concept_code: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            concept_path: normalize_path(&concept_path.into()),
            concept_code: concept_code.into(),
            display_name: display_name.into(),
        }
    }

    pub fn parent_path(&self) -> String {
        parent_path(&self.concept_path)
    }

    /// True when `self` is `other` or one of its ancestors.
    pub fn is_ancestor_of(&self, other: &ConceptNode) -> bool {
        other.concept_path.starts_with(&self.concept_path)
    }

    /// Number of path segments.
    pub fn depth(&self) -> usize {
        match delimiter(&self.concept_path) {
            Some(delim) => self
                .concept_path
                .split(delim)
                .filter(|segment| !segment.is_empty())
                .count(),
            None => 0,
        }
    }
}

fn is_delimiter(c: char) -> bool {
    c == '\\' || c == '/'
}

fn delimiter(path: &str) -> Option<char> {
    path.chars().last().filter(|c| is_delimiter(*c))
}

/// Trimmed path ending in its delimiter. Paths without any delimiter are
/// returned trimmed.
///
/// ```
/// use cohort_model::normalize_path;
///
/// assert_eq!(normalize_path("/Medications/RXCUI:7"), "/Medications/RXCUI:7/");
/// assert_eq!(normalize_path(r"\a\b\"), r"\a\b\");
/// ```
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if delimiter(path).is_some() {
        return path.to_string();
    }
    match path.chars().find(|c| is_delimiter(*c)) {
        Some(delim) => format!("{path}{delim}"),
        None => path.to_string(),
    }
}

/// Path of the parent node, delimiter-terminated.
///
/// ```
/// use cohort_model::parent_path;
///
/// assert_eq!(parent_path(r"\a\b\c\"), r"\a\b\");
/// assert_eq!(parent_path("/a/b/"), "/a/");
/// ```
pub fn parent_path(path: &str) -> String {
    let Some(delim) = delimiter(path) else {
        return String::new();
    };
    let body = &path[..path.len() - delim.len_utf8()];
    match body.rfind(delim) {
        Some(idx) => body[..=idx].to_string(),
        None => String::new(),
    }
}
