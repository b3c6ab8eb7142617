//! Format-agnostic document loading

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Document format recognised from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
    Yaml,
}

impl Format {
    /// Detect the format of `path` from its extension.
    pub fn detect(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
            Self::Yaml => "YAML",
        }
    }
}

/// Loads structured documents, detecting the format from the file extension.
///
/// - `.toml` -> TOML
/// - `.json` -> JSON
/// - `.yaml`, `.yml` -> YAML
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigStore;

impl ConfigStore {
    pub fn new() -> Self {
        Self
    }

    /// Load and deserialize the document at `path`.
    pub fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let format = Format::detect(path).ok_or_else(|| Error::UnsupportedFormat {
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })?;
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        self.parse(path, format, &content)
    }

    /// Deserialize `content` as `format`; `path` is only used for error context.
    pub fn parse<T: DeserializeOwned>(&self, path: &Path, format: Format, content: &str) -> Result<T> {
        let parse_error = |message: String| Error::ConfigParse {
            path: path.to_path_buf(),
            format: format.label().into(),
            message,
        };
        match format {
            Format::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
            Format::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
            Format::Yaml => serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string())),
        }
    }
}
