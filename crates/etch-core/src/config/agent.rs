//! Agent configuration and its partial layers

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Destination name that sends results to the authority.
pub const SERVER_DESTINATION: &str = "SERVER";

fn default_base_dir() -> PathBuf {
    PathBuf::from("/var/etch")
}

fn default_detailed_results() -> Vec<String> {
    vec![SERVER_DESTINATION.to_string()]
}

/// Effective configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Authority URL
    pub server: Option<String>,
    /// Directory of local bundles; bypasses the authority when set
    pub local: Option<PathBuf>,
    /// RSA private key used to sign requests
    pub key: Option<PathBuf>,
    pub base_dir: PathBuf,
    /// Prefix under which every managed path is mapped
    pub test_root: Option<PathBuf>,
    pub tag: Option<String>,
    /// `PATH` exported to executed commands
    pub path: Option<String>,
    /// `SERVER` and/or file paths receiving per-resource results
    pub detailed_results: Vec<String>,
    pub lock_attempts: u32,
    pub lock_interval_secs: u64,
    pub stale_lock_secs: u64,
    pub capture_timeout_secs: u64,
    pub max_rounds: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server: None,
            local: None,
            key: None,
            base_dir: default_base_dir(),
            test_root: None,
            tag: None,
            path: None,
            detailed_results: default_detailed_results(),
            lock_attempts: 30,
            lock_interval_secs: 1,
            stale_lock_secs: 2 * 60 * 60,
            capture_timeout_secs: 5 * 60,
            max_rounds: 10,
        }
    }
}

impl AgentConfig {
    pub fn lock_interval(&self) -> Duration {
        Duration::from_secs(self.lock_interval_secs)
    }

    pub fn stale_lock_age(&self) -> Duration {
        Duration::from_secs(self.stale_lock_secs)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    /// Whether results should be posted to the authority.
    pub fn reports_to_server(&self) -> bool {
        self.detailed_results.iter().any(|d| d == SERVER_DESTINATION)
    }

    /// File destinations for JSON-lines results.
    pub fn result_files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.detailed_results
            .iter()
            .filter(|d| d.as_str() != SERVER_DESTINATION)
            .map(PathBuf::from)
    }

    /// Apply a layer on top of this configuration.
    pub fn merge(&mut self, layer: &ConfigLayer) {
        if let Some(v) = &layer.server {
            self.server = Some(v.clone());
        }
        if let Some(v) = &layer.local {
            self.local = Some(v.clone());
        }
        if let Some(v) = &layer.key {
            self.key = Some(v.clone());
        }
        if let Some(v) = &layer.base_dir {
            self.base_dir = v.clone();
        }
        if let Some(v) = &layer.test_root {
            self.test_root = Some(v.clone());
        }
        if let Some(v) = &layer.tag {
            self.tag = Some(v.clone());
        }
        if let Some(v) = &layer.path {
            self.path = Some(v.clone());
        }
        if let Some(v) = &layer.detailed_results {
            self.detailed_results = v.clone();
        }
        if let Some(v) = layer.lock_attempts {
            self.lock_attempts = v;
        }
        if let Some(v) = layer.lock_interval_secs {
            self.lock_interval_secs = v;
        }
        if let Some(v) = layer.stale_lock_secs {
            self.stale_lock_secs = v;
        }
        if let Some(v) = layer.capture_timeout_secs {
            self.capture_timeout_secs = v;
        }
        if let Some(v) = layer.max_rounds {
            self.max_rounds = v;
        }
    }
}

/// One configuration source. Unset keys leave lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub server: Option<String>,
    pub local: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub base_dir: Option<PathBuf>,
    pub test_root: Option<PathBuf>,
    pub tag: Option<String>,
    pub path: Option<String>,
    pub detailed_results: Option<Vec<String>>,
    pub lock_attempts: Option<u32>,
    pub lock_interval_secs: Option<u64>,
    pub stale_lock_secs: Option<u64>,
    pub capture_timeout_secs: Option<u64>,
    pub max_rounds: Option<u32>,
}

impl ConfigLayer {
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
