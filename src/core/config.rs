//! Engine configuration.
//!
//! Loaded from a TOML file. Every section and key is optional:
//!
//! ```toml
//! [pipeline]
//! save_intermediates = true     # write every stage's buffer to scratch_dir
//! scratch_dir = "./tmp"
//! default_font = "fonts/AlibabaPuHuiTi-2-45-Light.otf"
//! font_dirs = ["fonts", "/usr/share/fonts/truetype"]
//!
//! [batch]
//! workers = 4
//! overwrite = false
//!
//! [metadata]
//! exiftool = "exiftool"
//! date_format = "%Y-%m-%d %H:%M:%S%3f%z"
//! ```

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pipeline execution settings.
    pub pipeline: PipelineConfig,
    /// Batch driver settings.
    pub batch: BatchConfig,
    /// Metadata extraction settings.
    pub metadata: MetadataConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Persist every stage's buffer for debugging.
    pub save_intermediates: bool,
    /// Where persisted buffers go.
    pub scratch_dir: PathBuf,
    /// Font used when a text segment names none (or names a missing one).
    pub default_font: Option<PathBuf>,
    /// Directories searched for relative font paths.
    pub font_dirs: Vec<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            save_intermediates: false,
            scratch_dir: PathBuf::from("./tmp"),
            default_font: None,
            font_dirs: Vec::new(),
        }
    }
}

/// `[batch]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Photos processed concurrently.
    pub workers: usize,
    /// Replace outputs that already exist.
    pub overwrite: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            overwrite: false,
        }
    }
}

/// `[metadata]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// exiftool binary.
    pub exiftool: PathBuf,
    /// Value passed to exiftool's `-d` option.
    pub date_format: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            exiftool: PathBuf::from("exiftool"),
            date_format: "%Y-%m-%d %H:%M:%S%3f%z".to_string(),
        }
    }
}

impl EngineConfig {
    /// Read and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.batch.workers, 4);
        assert_eq!(config.pipeline.scratch_dir, PathBuf::from("./tmp"));
        assert_eq!(config.metadata.date_format, "%Y-%m-%d %H:%M:%S%3f%z");
    }

    #[test]
    fn test_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            [pipeline]
            save_intermediates = true
            font_dirs = ["fonts"]

            [batch]
            overwrite = true
            "#,
        )
        .unwrap();
        assert!(config.pipeline.save_intermediates);
        assert_eq!(config.pipeline.font_dirs, vec![PathBuf::from("fonts")]);
        assert!(config.batch.overwrite);
        assert_eq!(config.batch.workers, 4);
        assert_eq!(config.metadata.exiftool, PathBuf::from("exiftool"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passepartout.toml");
        fs::write(&path, "[batch]\nworkers = 2\n").unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().batch.workers, 2);

        let missing = EngineConfig::load(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_invalid_toml() {
        let result = EngineConfig::from_toml_str("[batch]\nworkers = \"many\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
