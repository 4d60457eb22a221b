//! Run configuration loading: defaults, then a TOML file, then flags.

use std::path::Path;

use anyhow::{Context, Result};
use cohort_model::{ImportType, RunConfig};

/// Values given on the command line; `None` keeps the file or default value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub site_access_group: Option<String>,
    pub chunk_size: Option<usize>,
    pub lookup_batch_size: Option<usize>,
    pub upload_url: Option<String>,
    pub upload_token_env: Option<String>,
    pub upload_batch_size: Option<usize>,
    pub import_type: Option<ImportType>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(site) = &self.site_access_group {
            config.site_access_group.clone_from(site);
        }
        if let Some(size) = self.chunk_size {
            config.chunk_size = size;
        }
        if let Some(size) = self.lookup_batch_size {
            config.lookup_batch_size = size;
        }
        if let Some(url) = &self.upload_url {
            config.upload.url.clone_from(url);
        }
        if let Some(name) = &self.upload_token_env {
            config.upload.token_env.clone_from(name);
        }
        if let Some(size) = self.upload_batch_size {
            config.upload.batch_size = size;
        }
        if let Some(import_type) = self.import_type {
            config.upload.import_type = import_type;
        }
    }
}

/// Parse a TOML run configuration. Missing keys take their defaults.
pub fn parse_run_config(contents: &str) -> Result<RunConfig> {
    toml::from_str(contents).context("parse run configuration")
}

/// Build the run configuration and validate it.
pub fn load_run_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<RunConfig> {
    let mut config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            parse_run_config(&contents).with_context(|| format!("in {}", path.display()))?
        }
        None => RunConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().context("invalid run configuration")?;
    tracing::debug!(
        config_file = ?path.map(Path::display),
        site_access_group = %config.site_access_group,
        chunk_size = config.chunk_size,
        "loaded run configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_run_config(
            r#"
            chunk_size = 50

            [vitals]
            tolerance_days = 180

            [upload]
            import_type = "eav"
            "#,
        )
        .unwrap();
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.vitals.tolerance_days, 180);
        assert_eq!(config.vitals.measure, "bmi");
        assert_eq!(config.upload.import_type, ImportType::Eav);
        assert_eq!(config.site_access_group, "15");
    }

    #[test]
    fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "site_access_group = \"7\"\nchunk_size = 10\n").unwrap();
        let overrides = ConfigOverrides {
            chunk_size: Some(25),
            ..ConfigOverrides::default()
        };
        let config = load_run_config(Some(&path), &overrides).unwrap();
        assert_eq!(config.site_access_group, "7");
        assert_eq!(config.chunk_size, 25);
    }

    #[test]
    fn zero_chunk_size_is_invalid() {
        let overrides = ConfigOverrides {
            chunk_size: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(load_run_config(None, &overrides).is_err());
    }
}
