//! Layered configuration resolution
//!
//! Sources, later overriding earlier:
//! 1. Built-in defaults
//! 2. System config (`/etc/etch/etch.toml`, or an explicit path)
//! 3. Local overrides (`etch.local.toml` next to the system config)
//! 4. Command-line overrides
//!
//! Missing files are skipped. Invalid TOML in any layer is an error.

use std::fs;
use std::path::{Path, PathBuf};

use super::agent::{AgentConfig, ConfigLayer};
use crate::{Error, Result};

/// Default system configuration path.
pub const SYSTEM_CONFIG: &str = "/etc/etch/etch.toml";
/// File name of the local overrides layer.
pub const LOCAL_CONFIG_NAME: &str = "etch.local.toml";

pub struct ConfigResolver {
    system_path: PathBuf,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new(SYSTEM_CONFIG)
    }
}

impl ConfigResolver {
    pub fn new(system_path: impl Into<PathBuf>) -> Self {
        Self {
            system_path: system_path.into(),
        }
    }

    pub fn system_path(&self) -> &Path {
        &self.system_path
    }

    pub fn local_path(&self) -> PathBuf {
        match self.system_path.parent() {
            Some(dir) => dir.join(LOCAL_CONFIG_NAME),
            None => PathBuf::from(LOCAL_CONFIG_NAME),
        }
    }

    /// Resolve the file layers and apply `overrides` last.
    pub fn resolve(&self, overrides: &ConfigLayer) -> Result<AgentConfig> {
        let mut config = AgentConfig::default();

        let system_path = &self.system_path;
        if let Some(layer) = load_layer(system_path)? {
            tracing::debug!(?system_path, "Loaded system config (layer 2)");
            config.merge(&layer);
        } else {
            tracing::debug!(?system_path, "No system config found (layer 2), skipping");
        }

        let local_path = self.local_path();
        if let Some(layer) = load_layer(&local_path)? {
            tracing::debug!(?local_path, "Loaded local overrides (layer 3)");
            config.merge(&layer);
        }

        config.merge(overrides);
        Ok(config)
    }
}

fn load_layer(path: &Path) -> Result<Option<ConfigLayer>> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    ConfigLayer::parse(&content)
        .map(Some)
        .map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}
