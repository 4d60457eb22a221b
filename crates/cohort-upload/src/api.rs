//! The record endpoint: imports seen from the batch loop, and exports.

use cohort_model::ImportType;
use serde_json::Value;

use crate::error::{Result, UploadError};

/// Outcome of a successful import call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportResult {
    /// Records the API reports as imported.
    pub count: usize,
}

/// A remote record import endpoint.
pub trait ImportApi {
    /// Import one CSV batch.
    fn import_records(&self, csv: &str, import_type: ImportType) -> Result<ImportResult>;
}

/// A remote record export endpoint.
pub trait ExportApi {
    /// Every record of the project as flat CSV with raw codes.
    fn export_records(&self) -> Result<String>;
}

/// Interpret an export response.
///
/// A 2xx body is the CSV itself, unless it is a JSON object with `error`.
pub fn parse_export_response(status: u16, body: String) -> Result<String> {
    if !(200..300).contains(&status) {
        return Err(UploadError::Http { status, body });
    }
    if body.trim_start().starts_with('{')
        && let Ok(value) = serde_json::from_str::<Value>(&body)
        && let Some(error) = value.get("error")
    {
        let message = error
            .as_str()
            .map_or_else(|| error.to_string(), ToString::to_string);
        return Err(UploadError::Rejected(message));
    }
    Ok(body)
}

/// Interpret an import response.
///
/// Success is a 2xx status with a JSON object carrying `count` (a number or
/// a numeric string) and no `error`.
pub fn parse_import_response(status: u16, body: &str) -> Result<ImportResult> {
    if !(200..300).contains(&status) {
        return Err(UploadError::Http {
            status,
            body: body.to_string(),
        });
    }
    let value: Value = serde_json::from_str(body)?;
    if let Some(error) = value.get("error") {
        let message = error
            .as_str()
            .map_or_else(|| error.to_string(), ToString::to_string);
        return Err(UploadError::Rejected(message));
    }
    let count = match value.get("count") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    let count = count.ok_or_else(|| UploadError::Rejected(format!("no count in response: {body}")))?;
    let count = usize::try_from(count)
        .map_err(|_| UploadError::Rejected(format!("count out of range: {count}")))?;
    Ok(ImportResult { count })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_is_read_from_number_or_string() {
        assert_eq!(parse_import_response(200, r#"{"count": 3}"#).unwrap().count, 3);
        assert_eq!(parse_import_response(200, r#"{"count": "12"}"#).unwrap().count, 12);
    }

    #[test]
    fn error_field_and_missing_count_are_rejections() {
        let err = parse_import_response(200, r#"{"error": "bad field"}"#).unwrap_err();
        assert_eq!(err.to_string(), "request rejected: bad field");
        assert!(matches!(
            parse_import_response(200, r#"{"ids": []}"#),
            Err(UploadError::Rejected(_))
        ));
    }

    #[test]
    fn status_and_body_errors() {
        assert!(matches!(
            parse_import_response(403, "forbidden"),
            Err(UploadError::Http { status: 403, .. })
        ));
        assert!(matches!(
            parse_import_response(200, "<html>"),
            Err(UploadError::JsonParse(_))
        ));
    }

    #[test]
    fn export_body_is_csv_unless_it_reports_an_error() {
        let csv = "record_id,institution\n1,3\n".to_string();
        assert_eq!(parse_export_response(200, csv.clone()).unwrap(), csv);
        let err = parse_export_response(200, r#"{"error": "no access"}"#.to_string()).unwrap_err();
        assert_eq!(err.to_string(), "request rejected: no access");
        assert!(matches!(
            parse_export_response(401, "denied".to_string()),
            Err(UploadError::Http { status: 401, .. })
        ));
    }
}
