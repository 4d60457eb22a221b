use thiserror::Error;

/// Validation errors raised by the model.
///
/// These abort a run: they indicate inputs that would make downstream joins
/// fan out or produce records the receiving system cannot import.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The same identifier appears more than once where it must be unique.
    #[error("duplicate {kind}: {}", .values.join(", "))]
    DuplicateIdentifier { kind: String, values: Vec<String> },

    /// A wide table key appears more than once.
    #[error("duplicate key '{key}' in {table}")]
    DuplicateKey { table: String, key: String },

    /// Joined tables share a non-key column.
    #[error("column '{column}' present on both sides of join")]
    ColumnConflict { column: String },

    /// Identifier value that cannot be parsed.
    #[error("invalid {kind}: '{value}'")]
    InvalidIdentifier { kind: String, value: String },

    /// Template has no usable columns.
    #[error("import template has no columns")]
    EmptyTemplate,

    /// Template header lists the same column twice.
    #[error("import template repeats column '{column}'")]
    DuplicateTemplateColumn { column: String },

    /// Template does not start with the table key column.
    #[error("import template starts with '{found}', expected key column '{expected}'")]
    TemplateKeyMismatch { expected: String, found: String },

    /// Dictionary maps two attributes to one field, or one attribute twice.
    #[error("field dictionary conflict: {0}")]
    DictionaryConflict(String),

    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_identifier_lists_values() {
        let err = ModelError::DuplicateIdentifier {
            kind: "MRN".to_string(),
            values: vec!["123".to_string(), "456".to_string()],
        };
        assert_eq!(err.to_string(), "duplicate MRN: 123, 456");
    }

    #[test]
    fn template_key_mismatch_message() {
        let err = ModelError::TemplateKeyMismatch {
            expected: "record_id".to_string(),
            found: "v01_studyid".to_string(),
        };
        assert!(err.to_string().contains("expected key column 'record_id'"));
    }
}
