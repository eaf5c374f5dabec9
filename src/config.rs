//! Configuration file handling.
//!
//! This module provides loading and saving of sbomscan configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The user configuration file is stored at:
//! - Linux: `~/.config/sbomscan/config.toml`
//! - macOS: `~/Library/Application Support/sbomscan/config.toml`
//! - Windows: `%APPDATA%\sbomscan\config.toml`
//!
//! A project may carry its own `.sbomscan.toml` at the scan root, which
//! takes precedence over the user file (see [`Config::load_for`]).
//!
//! # Example Configuration
//!
//! ```toml
//! min_confidence = 0.9
//! project_name = "billing-service"
//! parallel = true
//! detector_timeout_secs = 30
//! format = "xml"
//! ecosystems = ["npm", "pypi", "golang"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{validate_confidence, ScanError};
use crate::model::Ecosystem;
use crate::output::BomFormat;

/// Name of the project-local configuration file.
pub const PROJECT_CONFIG_FILE: &str = ".sbomscan.toml";

/// Scan configuration.
///
/// # Example
///
/// ```no_run
/// use sbomscan::Config;
///
/// // Load from file (or use defaults if file doesn't exist)
/// let config = Config::load().unwrap();
///
/// println!("Threshold: {}", config.min_confidence);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Observations below this confidence are dropped.
    ///
    /// Must lie in `[0, 1]`. Default: 0.8
    pub min_confidence: f64,

    /// Overrides the project name, which otherwise comes from the scan root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    /// Overrides the project version. Default: "1.0.0"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_version: Option<String>,

    /// Whether detectors run concurrently.
    ///
    /// Default: true
    pub parallel: bool,

    /// Time limit for a single detector, in seconds. No limit when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detector_timeout_secs: Option<u64>,

    /// Default BOM encoding. Anything other than "json" or "xml" fails to load.
    ///
    /// Default: "json"
    pub format: BomFormat,

    /// Which ecosystems to scan.
    ///
    /// Default: every ecosystem that has a detector
    pub ecosystems: Vec<Ecosystem>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_confidence: 0.8,
            project_name: None,
            project_version: None,
            parallel: true,
            detector_timeout_secs: None,
            format: BomFormat::Json,
            ecosystems: Ecosystem::DETECTED.to_vec(),
        }
    }
}

impl Config {
    /// Loads the user configuration.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Loads the configuration that applies to a scan of `root`.
    ///
    /// `root/.sbomscan.toml` wins over the user configuration, which wins over
    /// the defaults.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sbomscan::Config;
    ///
    /// let config = Config::load_for("path/to/project")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn load_for(root: impl AsRef<Path>) -> Result<Self> {
        let local = root.as_ref().join(PROJECT_CONFIG_FILE);
        if local.is_file() {
            return Self::load_from(&local);
        }
        Self::load()
    }

    /// Loads configuration from an explicit file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration to the user config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sbomscan::Config;
    ///
    /// let mut config = Config::default();
    /// config.min_confidence = 0.9;
    /// config.save()?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::config_path())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Returns the path to the user configuration file.
    ///
    /// # Example
    ///
    /// ```
    /// use sbomscan::Config;
    ///
    /// let path = Config::config_path();
    /// assert!(path.ends_with("sbomscan/config.toml"));
    /// ```
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sbomscan")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Checks the confidence threshold.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidConfidence`] when `min_confidence` is
    /// outside `[0, 1]` or NaN.
    pub fn validate(&self) -> Result<(), ScanError> {
        validate_confidence(self.min_confidence).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.min_confidence, 0.8);
        assert_eq!(config.format, BomFormat::Json);
        assert!(config.parallel);
        assert!(config.project_name.is_none());
        assert!(config.detector_timeout_secs.is_none());
        assert_eq!(config.ecosystems.len(), 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "min_confidence = 0.95\necosystems = [\"npm\", \"golang\"]\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.min_confidence, 0.95);
        assert_eq!(config.ecosystems, vec![Ecosystem::Npm, Ecosystem::Go]);
        assert!(config.parallel);
        assert_eq!(config.format, BomFormat::Json);
    }

    #[test]
    fn test_format_is_checked_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "format = \"xml\"\n").unwrap();
        assert_eq!(Config::load_from(&path).unwrap().format, BomFormat::Xml);

        fs::write(&path, "format = \"yaml\"\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid configuration"));
    }

    #[test]
    fn test_load_for_prefers_project_file() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            "project_name = \"local\"\nparallel = false\n",
        )
        .unwrap();

        let config = Config::load_for(dir.path()).unwrap();
        assert_eq!(config.project_name.as_deref(), Some("local"));
        assert!(!config.parallel);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "min_confidence = \"high\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid configuration"));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = Config {
            min_confidence: 1.5,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ScanError::InvalidConfidence { .. })
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let config = Config {
            min_confidence: 0.9,
            detector_timeout_secs: Some(30),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.min_confidence, 0.9);
        assert_eq!(loaded.detector_timeout_secs, Some(30));
        assert_eq!(loaded.ecosystems, Ecosystem::DETECTED.to_vec());
    }

    #[test]
    fn test_generate_default_config() {
        let rendered = Config::generate_default_config();
        assert!(rendered.contains("min_confidence = 0.8"));
        assert!(rendered.contains("\"golang\""));
        assert!(rendered.contains("format = \"json\""));
    }
}
