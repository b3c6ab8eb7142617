//! Host facts sent with every request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Immutable key/value snapshot of host attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facts(BTreeMap<String, String>);

impl Facts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Fully-qualified host name, falling back to the short host name.
    pub fn fqdn(&self) -> &str {
        self.get("fqdn")
            .or_else(|| self.get("hostname"))
            .unwrap_or("localhost")
    }

    /// Facts in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Source of host facts for one run.
pub trait FactSource {
    fn collect(&self) -> Facts;
}

/// Facts gathered from the running host.
#[derive(Debug, Default, Clone)]
pub struct HostFacts {
    fqdn_override: Option<String>,
}

impl HostFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `fqdn` instead of the detected host name.
    pub fn with_fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.fqdn_override = Some(fqdn.into());
        self
    }
}

impl FactSource for HostFacts {
    fn collect(&self) -> Facts {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not determine host name");
                "localhost".to_string()
            });
        let fqdn = self.fqdn_override.clone().unwrap_or_else(|| hostname.clone());
        let short = hostname.split('.').next().unwrap_or(&hostname).to_string();

        let kernel_release = std::fs::read_to_string("/proc/sys/kernel/osrelease")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let facts = Facts::new()
            .with("hostname", short)
            .with("fqdn", fqdn)
            .with("os", std::env::consts::OS)
            .with("arch", std::env::consts::ARCH)
            .with("family", std::env::consts::FAMILY)
            .with("kernel_release", kernel_release)
            .with("etch_version", env!("CARGO_PKG_VERSION"));
        tracing::debug!(fqdn = facts.fqdn(), "Collected host facts");
        facts
    }
}
