//! Configuration for the processing pipeline

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::writer::WriteOptions;

/// Top-level configuration file (`sheetlink.toml`)
///
/// Tables other than `[processor]` are ignored here; the server reads its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub processor: ProcessorConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Filename suffix accepted by the format gate (case-sensitive)
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Prepended to the uploaded filename to name the result
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    #[serde(default)]
    pub recalc: RecalcConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            output_prefix: default_output_prefix(),
            recalc: RecalcConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalcConfig {
    #[serde(default = "default_true")]
    pub force_full_calc: bool,
    #[serde(default = "default_true")]
    pub drop_calc_chain: bool,
}

impl Default for RecalcConfig {
    fn default() -> Self {
        Self {
            force_full_calc: true,
            drop_calc_chain: true,
        }
    }
}

impl From<RecalcConfig> for WriteOptions {
    fn from(config: RecalcConfig) -> Self {
        WriteOptions {
            force_full_calc: config.force_full_calc,
            drop_calc_chain: config.drop_calc_chain,
        }
    }
}

fn default_extension() -> String {
    ".xlsx".to_string()
}

fn default_output_prefix() -> String {
    "processed_".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.processor, ProcessorConfig::default());
        assert_eq!(config.processor.extension, ".xlsx");
        assert_eq!(config.processor.output_prefix, "processed_");
        assert_eq!(WriteOptions::from(config.processor.recalc), WriteOptions::default());
    }

    #[test]
    fn test_partial_config() {
        let config = Config::from_toml(
            r#"
[processor]
output_prefix = "linked_"

[processor.recalc]
drop_calc_chain = false

[server]
addr = "127.0.0.1:9000"
"#,
        )
        .unwrap();

        assert_eq!(config.processor.extension, ".xlsx");
        assert_eq!(config.processor.output_prefix, "linked_");
        assert!(config.processor.recalc.force_full_calc);
        assert!(!config.processor.recalc.drop_calc_chain);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[processor]\nextension = \".xlsm\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.processor.extension, ".xlsm");
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = Config::from_file("/nonexistent/sheetlink.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/sheetlink.toml"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Config::from_toml("[processor\nextension = 1").is_err());
    }
}
