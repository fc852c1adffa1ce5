//! Source registry: which adapters exist and where they fetch from.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Date to probe. Defaults to the next weekday at check time.
    #[serde(default)]
    pub test_date: Option<NaiveDate>,
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            test_date: None,
            min_rows: default_min_rows(),
        }
    }
}

fn default_min_rows() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

#[derive(Debug, Deserialize)]
pub struct SourcesFile {
    pub sources: Vec<SourceConfig>,
}

/// Load and validate the source registry from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_sources(path: &Path) -> Result<SourcesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SourcesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let sources_file: SourcesFile =
        serde_yaml::from_str(&content).map_err(ConfigError::SourcesFileParse)?;

    validate_sources(&sources_file)?;

    Ok(sources_file)
}

fn validate_sources(sources_file: &SourcesFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for source in &sources_file.sources {
        let name = source.name.trim();
        if name.is_empty() {
            return Err(ConfigError::Validation(
                "source name must be non-empty".to_string(),
            ));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ConfigError::Validation(format!(
                "source name '{name}' must be lowercase ascii, digits, or '_'"
            )));
        }

        if !(source.endpoint.starts_with("http://") || source.endpoint.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "source '{name}' endpoint must be an http(s) URL"
            )));
        }

        if !seen.insert(name.to_string()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source name: '{name}'"
            )));
        }
    }

    Ok(())
}
