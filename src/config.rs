//! Configuration module for diffarea
//!
//! Loads user configuration from ~/.diffarea/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::diff::{DiffAlgorithm, LineDiffer};
use crate::export::ExportFormat;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Line diff algorithm (myers, patience or lcs)
    pub algorithm: DiffAlgorithm,
    /// Diff deadline in milliseconds; past it the diff gets coarser (0 disables)
    pub timeout_ms: u64,
    /// Undo steps kept per document (default 100, 0 disables history)
    pub history_limit: usize,
    pub output_format: ExportFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: DiffAlgorithm::default(),
            timeout_ms: 0,
            history_limit: 100,
            output_format: ExportFormat::Markdown,
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".diffarea")
            .join("config.toml")
    }

    /// Merge CLI overrides into config
    pub fn with_overrides(mut self, algorithm: Option<DiffAlgorithm>, output_format: Option<ExportFormat>) -> Self {
        if let Some(algorithm) = algorithm {
            self.algorithm = algorithm;
        }
        if let Some(format) = output_format {
            self.output_format = format;
        }
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn differ(&self) -> LineDiffer {
        LineDiffer::new(self.algorithm, self.timeout())
    }

    /// Create a default config file
    pub fn create_default(config_path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(&Config::default())
            .context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "algorithm = \"patience\"\ntimeout_ms = 250\n").unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.algorithm, DiffAlgorithm::Patience);
        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.output_format, ExportFormat::Markdown);
        assert_eq!(config.differ().algorithm(), DiffAlgorithm::Patience);
    }

    #[test]
    fn test_invalid_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "algorithm = \"quantum\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_create_default_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::create_default(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::default().with_overrides(Some(DiffAlgorithm::Lcs), Some(ExportFormat::Json));
        assert_eq!(config.algorithm, DiffAlgorithm::Lcs);
        assert_eq!(config.output_format, ExportFormat::Json);

        let untouched = Config::default().with_overrides(None, None);
        assert_eq!(untouched, Config::default());
    }
}
