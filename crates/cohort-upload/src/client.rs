//! Blocking HTTP client for the record endpoint.

use std::time::Duration;

use cohort_model::{ImportType, UploadConfig};

use crate::api::{ExportApi, ImportApi, ImportResult, parse_export_response, parse_import_response};
use crate::error::{Result, UploadError};

/// User agent string for API requests.
const USER_AGENT_VALUE: &str = concat!("cohort-prep/", env!("CARGO_PKG_VERSION"));

/// REDCap-style record import and export client.
pub struct RedcapClient {
    client: reqwest::blocking::Client,
    url: String,
    token: String,
}

impl std::fmt::Debug for RedcapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedcapClient")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl RedcapClient {
    pub fn new(url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        let token = token.into();
        if url.trim().is_empty() {
            return Err(UploadError::Config("API url is empty".to_string()));
        }
        if token.trim().is_empty() {
            return Err(UploadError::Config("API token is empty".to_string()));
        }
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, url, token })
    }

    /// Client for the configured endpoint, with the token taken from the
    /// environment variable named by `token_env`.
    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env).map_err(|_| {
            UploadError::Config(format!("environment variable {} is not set", config.token_env))
        })?;
        Self::new(
            config.url.clone(),
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ImportApi for RedcapClient {
    fn import_records(&self, csv: &str, import_type: ImportType) -> Result<ImportResult> {
        let params = [
            ("token", self.token.as_str()),
            ("content", "record"),
            ("format", "csv"),
            ("type", import_type.as_str()),
            ("data", csv),
            ("returnFormat", "json"),
        ];
        tracing::debug!(url = %self.url, bytes = csv.len(), "posting import batch");
        let response = self.client.post(&self.url).form(&params).send()?;
        let status = response.status();
        let body = response.text()?;
        parse_import_response(status.as_u16(), &body)
    }
}

impl ExportApi for RedcapClient {
    fn export_records(&self) -> Result<String> {
        let params = [
            ("token", self.token.as_str()),
            ("content", "record"),
            ("format", "csv"),
            ("type", "flat"),
            ("rawOrLabel", "raw"),
            ("returnFormat", "json"),
        ];
        tracing::debug!(url = %self.url, "requesting record export");
        let response = self.client.post(&self.url).form(&params).send()?;
        let status = response.status();
        let body = response.text()?;
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "export response");
        parse_export_response(status.as_u16(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_token() {
        let client =
            RedcapClient::new("https://redcap.test/api/", "secret-token", Duration::from_secs(5))
                .unwrap();
        let shown = format!("{client:?}");
        assert!(shown.contains("redcap.test"));
        assert!(!shown.contains("secret-token"));
    }

    #[test]
    fn blank_token_is_a_config_error() {
        let err = RedcapClient::new("https://redcap.test/api/", " ", Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }
}
