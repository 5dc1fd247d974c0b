//! Photo metadata providers.
//!
//! Stages read camera, lens and exposure fields from a flat string map that
//! is extracted once per photo, before the pipeline starts, and shared
//! read-only by every stage.

use crate::core::config::MetadataConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Flat `key -> value` photo metadata (e.g. `Model -> "ILCE-7M4"`).
pub type Metadata = BTreeMap<String, String>;

/// Source of photo metadata.
///
/// Absent fields are normal; consumers always supply defaults.
pub trait MetadataProvider: Send + Sync {
    /// Read the metadata of one photo. Never fails: unreadable photos yield
    /// an empty map.
    fn read(&self, path: &Path) -> Metadata;
}

/// Reads metadata by running the `exiftool` binary.
#[derive(Debug, Clone)]
pub struct ExifTool {
    binary: PathBuf,
    date_format: String,
}

impl ExifTool {
    /// Create a provider for the given binary and `-d` date format.
    pub fn new(binary: impl Into<PathBuf>, date_format: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            date_format: date_format.into(),
        }
    }

    /// Create a provider from the `[metadata]` config section.
    pub fn from_config(config: &MetadataConfig) -> Self {
        Self::new(&config.exiftool, &config.date_format)
    }

    fn run(&self, path: &Path) -> Result<String, String> {
        let out = Command::new(&self.binary)
            .arg("-d")
            .arg(&self.date_format)
            .arg(path)
            .output()
            .map_err(|e| format!("failed to run {}: {e}", self.binary.display()))?;
        if !out.status.success() {
            return Err(String::from_utf8_lossy(&out.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::from_config(&MetadataConfig::default())
    }
}

impl MetadataProvider for ExifTool {
    fn read(&self, path: &Path) -> Metadata {
        match self.run(path) {
            Ok(output) => parse_exiftool_output(&output),
            Err(e) => {
                log::warn!("Cannot read metadata of {}: {}", path.display(), e);
                Metadata::new()
            }
        }
    }
}

/// Parse exiftool's `Key Name : value` listing.
///
/// Whitespace and `/` are removed from keys (`"Shutter Speed"` becomes
/// `ShutterSpeed`); values keep only their ASCII characters. Later duplicate
/// keys win.
pub fn parse_exiftool_output(output: &str) -> Metadata {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| {
            let key: String = key
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '/')
                .collect();
            let value: String = value.trim().chars().filter(char::is_ascii).collect();
            (key, value)
        })
        .collect()
}

/// A fixed map, handed out for every photo.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata(pub Metadata);

impl MetadataProvider for StaticMetadata {
    fn read(&self, _path: &Path) -> Metadata {
        self.0.clone()
    }
}

/// Provides no metadata at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataProvider for NoMetadata {
    fn read(&self, _path: &Path) -> Metadata {
        Metadata::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exiftool_output() {
        let output = "\
ExifTool Version Number         : 12.76
Camera Model Name               : ILCE-7M4
Shutter Speed                   : 1/250
Date/Time Original              : 2024-05-01 10:20:30.123+08:00
Lens ID                         : FE 35mm F1.4 GM\u{00a0}
no separator here
";
        let metadata = parse_exiftool_output(output);
        assert_eq!(metadata["CameraModelName"], "ILCE-7M4");
        assert_eq!(metadata["ShutterSpeed"], "1/250");
        assert_eq!(metadata["DateTimeOriginal"], "2024-05-01 10:20:30.123+08:00");
        assert_eq!(metadata["LensID"], "FE 35mm F1.4 GM");
        assert_eq!(metadata.len(), 5);
    }

    #[test]
    fn test_missing_binary_yields_empty_map() {
        let provider = ExifTool::new("/nonexistent/exiftool-binary", "%Y");
        assert!(provider.read(Path::new("photo.jpg")).is_empty());
    }

    #[test]
    fn test_static_provider() {
        let mut map = Metadata::new();
        map.insert("Make".to_string(), "SONY".to_string());
        let provider = StaticMetadata(map);
        assert_eq!(provider.read(Path::new("a.jpg"))["Make"], "SONY");
        assert!(NoMetadata.read(Path::new("a.jpg")).is_empty());
    }
}
